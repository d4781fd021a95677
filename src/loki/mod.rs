pub mod client;
pub mod push;

pub use client::{DeliveryError, LokiClient, LokiError, PUSH_PATH};
pub use push::{PushRequest, PushStream};
