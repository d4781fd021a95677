use crate::pipeline::barrier::Barrier;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing_subscriber::fmt::MakeWriter;

pub type Receiver = mpsc::Receiver<Item>;

/// Entry of the shared buffer. Data and barriers share one FIFO so a barrier
/// is only reached after every record enqueued before it.
#[derive(Debug)]
pub enum Item {
    Data(Vec<u8>),
    Barrier(Barrier),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("no space in buffer")]
    BufferFull,

    #[error("timed out waiting for buffered records to be shipped")]
    SyncTimeout,

    #[error("dispatcher is no longer running")]
    Closed,
}

/// Writer-side handle of the pipeline. Cheap to clone; every clone feeds the
/// same dispatcher.
#[derive(Debug, Clone)]
pub struct Ingest {
    tx: mpsc::Sender<Item>,
    sync_timeout: Duration,
}

/// Create the bounded shared buffer between writers and the dispatcher.
pub fn create_channel(buffer_size: usize, sync_timeout: Duration) -> (Ingest, Receiver) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (Ingest { tx, sync_timeout }, rx)
}

impl Ingest {
    /// Copy `record` into the buffer without waiting. A full buffer drops it.
    pub fn submit(&self, record: &[u8]) -> Result<(), IngestError> {
        self.enqueue(Item::Data(record.to_vec()))
    }

    /// Wait until every record submitted before this call has been accepted
    /// by Loki, or the sync timeout elapses.
    pub async fn sync(&self) -> Result<(), IngestError> {
        let deadline = tokio::time::Instant::now() + self.sync_timeout;
        let (barrier, done) = Barrier::new();
        self.enqueue(Item::Barrier(barrier))?;

        match tokio::time::timeout_at(deadline, done).await {
            Ok(Ok(())) => Ok(()),
            // Barrier evicted or dispatcher gone: not a success, so the caller
            // still waits out its timeout.
            Ok(Err(_)) => {
                tokio::time::sleep_until(deadline).await;
                Err(IngestError::SyncTimeout)
            }
            Err(_) => Err(IngestError::SyncTimeout),
        }
    }

    /// Free slots in the shared buffer.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn enqueue(&self, item: Item) -> Result<(), IngestError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => IngestError::BufferFull,
            TrySendError::Closed(_) => IngestError::Closed,
        })
    }
}

/// `io::Write` adapter: each `write` call submits one record.
#[derive(Debug)]
pub struct IngestWriter<'a> {
    ingest: &'a Ingest,
}

impl io::Write for IngestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ingest.submit(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Ingest {
    type Writer = IngestWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        IngestWriter { ingest: self }
    }
}
