use crate::config::parse::{validate_config, ConfigError};
use crate::config::types::Config;
use crate::loki::{LokiClient, LokiError};
use crate::pipeline::{create_channel, Dispatcher, DispatcherSettings, Ingest};
use crate::stream::{Grouper, LabelSchema, Watermark};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] LokiError),
}

/// Build a shipping pipeline for `config`.
///
/// Returns the writer handle and the dispatcher. The dispatcher does nothing
/// until [`Dispatcher::run`] is spawned; records submitted before that simply
/// wait in the buffer. The watermark starts at the current wall clock, so
/// records stamped before construction are shipped at construction time.
pub fn with_remote(config: &Config) -> Result<(Ingest, Dispatcher), ShipperError> {
    validate_config(config)?;

    let client = LokiClient::new(&config.loki)?;
    let grouper = Grouper::new(
        LabelSchema::from(config.labels.as_slice()),
        config.fields.clone(),
        Watermark::now(),
        config.pipeline.on_decode_error,
    );

    let (ingest, rx) = create_channel(config.pipeline.buffer_size, config.pipeline.sync_timeout);
    let dispatcher = Dispatcher::new(
        rx,
        grouper,
        client,
        DispatcherSettings {
            batch_size: config.pipeline.batch_size,
            max_pending_syncs: config.pipeline.max_pending_syncs,
            flush_interval: config.pipeline.flush_interval,
        },
    );

    Ok((ingest, dispatcher))
}
