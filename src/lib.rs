//! Ship structured log records to a Loki push endpoint in batches.
//!
//! Writers hand JSON records to an [`Ingest`] handle without ever blocking;
//! a single [`Dispatcher`] task groups them into streams and pushes them,
//! retrying until Loki accepts each batch. [`Ingest::sync`] waits until
//! everything submitted so far has been accepted.

pub mod cli;
pub mod config;
pub mod logging;
pub mod loki;
pub mod pipeline;
pub mod shipper;
pub mod stream;

pub use config::Config;
pub use pipeline::{Dispatcher, Ingest, IngestError, ShipError};
pub use shipper::with_remote;
