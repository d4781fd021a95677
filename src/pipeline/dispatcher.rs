use crate::loki::{DeliveryError, LokiClient, PushRequest};
use crate::pipeline::barrier::PendingBarriers;
use crate::pipeline::channel::{Item, Receiver};
use crate::stream::{DecodeError, Grouper, Watermark};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal outcome of [`Dispatcher::run`].
#[derive(Debug, Error)]
pub enum ShipError {
    #[error("log shipping cancelled")]
    Cancelled,

    #[error("malformed log record: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode push request: {0}")]
    Encode(#[source] serde_json::Error),
}

impl From<DeliveryError> for ShipError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::Cancelled => ShipError::Cancelled,
            DeliveryError::Encode(e) => ShipError::Encode(e),
        }
    }
}

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub batch_size: usize,
    pub max_pending_syncs: usize,
    pub flush_interval: Duration,
}

/// Sole owner of the batch buffer, the pending barriers and the watermark.
///
/// Flushes when the batch is full, when a barrier arrives, and on every tick
/// of the flush interval. After each flush every pending barrier is released:
/// FIFO order of the shared buffer means all records queued ahead of them have
/// been delivered by then.
pub struct Dispatcher {
    rx: Receiver,
    batch: Vec<Vec<u8>>,
    batch_size: usize,
    barriers: PendingBarriers,
    grouper: Grouper,
    client: LokiClient,
    flush_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        rx: Receiver,
        grouper: Grouper,
        client: LokiClient,
        settings: DispatcherSettings,
    ) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            rx,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            barriers: PendingBarriers::new(settings.max_pending_syncs),
            grouper,
            client,
            flush_interval: settings.flush_interval.max(MIN_FLUSH_INTERVAL),
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.grouper.watermark()
    }

    /// Run until cancelled, or until every [`Ingest`](crate::pipeline::Ingest)
    /// handle is dropped, in which case the remaining records are flushed
    /// and `Ok(())` is returned.
    ///
    /// Records still in the batch when `cancel` fires are lost.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ShipError> {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        info!(
            push_url = %self.client.push_url(),
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Log dispatcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if !self.batch.is_empty() {
                        warn!(records = self.batch.len(), "Dispatcher cancelled with unshipped records");
                    }
                    return Err(ShipError::Cancelled);
                }

                item = self.rx.recv() => match item {
                    Some(Item::Data(record)) => {
                        self.batch.push(record);
                        if self.batch.len() < self.batch_size {
                            continue;
                        }
                    }
                    Some(Item::Barrier(barrier)) => {
                        if self.barriers.push(barrier).is_some() {
                            warn!(
                                pending = self.barriers.len(),
                                "Too many pending syncs, abandoning the oldest"
                            );
                        }
                    }
                    None => {
                        info!(records = self.batch.len(), "All log writers gone, flushing remaining records");
                        self.flush(&cancel).await?;
                        return Ok(());
                    }
                },

                _ = ticker.tick() => {}
            }

            self.flush(&cancel).await?;
        }
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), ShipError> {
        if !self.batch.is_empty() {
            let records = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
            let count = records.len();

            let groups = self.grouper.group(records)?;
            let request = PushRequest::from_groups(self.grouper.schema(), groups);
            if !request.is_empty() {
                crate::logging::delivering(self.client.push(&request, cancel)).await?;
            }

            debug!(
                records = count,
                streams = request.streams.len(),
                watermark = self.grouper.watermark().nanos(),
                "Flushed log batch"
            );
        }

        let released = self.barriers.release_all();
        if released > 0 {
            debug!(syncs = released, "Released pending syncs");
        }

        Ok(())
    }
}
