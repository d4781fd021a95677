use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::pipeline::ShipError;
use crate::shipper::{with_remote, ShipperError};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("shipper error: {0}")]
    Shipper(#[from] ShipperError),

    #[error("dispatcher error: {0}")]
    Ship(#[from] ShipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipSummary {
    /// Lines accepted into the pipeline.
    pub submitted: u64,
    /// Lines dropped because the buffer was full.
    pub dropped: u64,
    /// Whether the final sync confirmed delivery of every submitted line.
    pub synced: bool,
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/lokitee/config.yml");
            eprintln!("  /etc/lokitee/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'lokitee config init' to generate one.");
            std::process::exit(1);
        }
    };

    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(&config_path)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            on_signal.cancel();
        }
    });

    let summary = ship_stream(&config, tokio::io::stdin(), tokio::io::stderr(), cancel).await?;
    info!(
        submitted = summary.submitted,
        dropped = summary.dropped,
        synced = summary.synced,
        "Shipper stopped"
    );

    Ok(())
}

/// Ship newline-delimited JSON records from `input` until EOF or `cancel`.
///
/// Every line is echoed to `local` before it is submitted, so the local copy
/// does not depend on Loki being reachable. At EOF the pipeline is synced and
/// then drained.
pub async fn ship_stream<R, W>(
    config: &Config,
    input: R,
    mut local: W,
    cancel: CancellationToken,
) -> Result<ShipSummary, RunError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (ingest, dispatcher) = with_remote(config)?;
    let mut dispatcher_handle = tokio::spawn(dispatcher.run(cancel.child_token()));

    // Raw segments: bytes that are not UTF-8 go to the decoder like any
    // other malformed record.
    let mut lines = BufReader::new(input).split(b'\n');
    let mut summary = ShipSummary::default();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = &mut dispatcher_handle => {
                let err = match result? {
                    Ok(()) => ShipError::Cancelled,
                    Err(e) => e,
                };
                error!(error = %err, "Dispatcher stopped before input ended");
                return Err(err.into());
            }

            line = lines.next_segment() => match line? {
                Some(mut line) => {
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    local.write_all(&line).await?;
                    local.write_all(b"\n").await?;

                    match ingest.submit(&line) {
                        Ok(()) => summary.submitted += 1,
                        Err(e) => {
                            summary.dropped += 1;
                            warn!(error = %e, "Dropping log record");
                        }
                    }
                }
                None => break,
            },
        }
    }
    local.flush().await?;

    if !cancel.is_cancelled() {
        match ingest.sync().await {
            Ok(()) => {
                summary.synced = true;
                info!(records = summary.submitted, "All records shipped");
            }
            Err(e) => warn!(error = %e, "Final sync did not complete"),
        }
    }

    // Closing the buffer lets the dispatcher drain and exit.
    drop(ingest);
    match dispatcher_handle.await? {
        Ok(()) | Err(ShipError::Cancelled) => Ok(summary),
        Err(e) => Err(e.into()),
    }
}
