pub mod barrier;
pub mod channel;
pub mod dispatcher;

pub use barrier::{Barrier, PendingBarriers};
pub use channel::{create_channel, Ingest, IngestError, IngestWriter, Item, Receiver};
pub use dispatcher::{Dispatcher, DispatcherSettings, ShipError};
