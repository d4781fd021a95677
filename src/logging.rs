//! Bridge from `tracing` to the shipping pipeline.
//!
//! ```rust,ignore
//! use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
//!
//! let (ingest, dispatcher) = lokitee::shipper::with_remote(&config)?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(lokitee::logging::remote_layer(ingest.clone()))
//!     .init();
//! tokio::spawn(dispatcher.run(cancel.clone()));
//! ```
//!
//! The stderr layer keeps working whether or not Loki is reachable.

use crate::pipeline::Ingest;
use std::future::Future;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Targets of this crate and of the HTTP stack a push runs on.
const DELIVERY_TARGETS: &[&str] = &[
    CRATE_TARGET,
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "tower",
    "want",
    "rustls",
    "tokio_rustls",
    "mio",
];

tokio::task_local! {
    static DELIVERING: ();
}

/// Runs `fut` with the remote layer muted for the current task, so events
/// raised while a batch is being pushed do not become the next batch.
pub(crate) async fn delivering<F: Future>(fut: F) -> F::Output {
    DELIVERING.scope((), fut).await
}

/// JSON layer writing every event into the pipeline as one record.
///
/// Events are flattened so their fields sit next to `timestamp`, `level` and
/// `target`, matching the default [`FieldKeys`](crate::config::FieldKeys).
/// Events from this crate and from the HTTP client stack, and any event raised
/// while the dispatcher is pushing, are skipped. Otherwise every push would
/// log events that feed the next push. A record that
/// does not fit in the buffer is dropped and reported on stderr by
/// `tracing_subscriber`.
pub fn remote_layer<S>(ingest: Ingest) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(ingest)
        .with_filter(filter_fn(|metadata| !is_delivery_event(metadata)))
}

fn is_delivery_event(metadata: &Metadata<'_>) -> bool {
    DELIVERING.try_with(|_| ()).is_ok()
        || DELIVERY_TARGETS
            .iter()
            .any(|prefix| target_within(metadata.target(), prefix))
}

fn target_within(target: &str, prefix: &str) -> bool {
    target == prefix
        || target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with("::"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DecodeErrorStrategy, FieldKeys};
    use crate::pipeline::{create_channel, Item};
    use crate::stream::{Grouper, LabelSchema, Watermark};
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_become_groupable_records() {
        let (ingest, mut rx) = create_channel(8, Duration::from_secs(1));
        let subscriber = tracing_subscriber::registry().with(remote_layer(ingest));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app::db", service = "api", rows = 3, "connected");
            tracing::error!(target: "lokitee::loki::client", "Received error from Loki");
        });

        let record = match rx.try_recv().unwrap() {
            Item::Data(record) => record,
            Item::Barrier(_) => panic!("expected data"),
        };
        assert!(rx.try_recv().is_err(), "own events must not be shipped");

        let mut grouper = Grouper::new(
            LabelSchema::from_names(["service"]),
            FieldKeys::default(),
            Watermark::new(0),
            DecodeErrorStrategy::Fail,
        );
        let groups = grouper.group(vec![record]).unwrap();
        let (key, entries) = groups.into_iter().next().unwrap();
        assert_eq!(key.level, "INFO");
        assert_eq!(key.logger, "app::db");
        assert_eq!(key.labels, vec![Some("api".to_string())]);

        let line: serde_json::Value = serde_json::from_str(&entries[0].line).unwrap();
        assert_eq!(line["message"], "connected");
        assert_eq!(line["rows"], 3);
        assert!(line.get("service").is_none());
        assert!(line.get("timestamp").is_none());
    }

    #[test]
    fn test_own_event_detection() {
        let (ingest, mut rx) = create_channel(8, Duration::from_secs(1));
        let subscriber = tracing_subscriber::registry().with(remote_layer(ingest));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "lokitee", "own");
            tracing::info!(target: "lokitee_plugin", "foreign");
        });

        assert!(matches!(rx.try_recv().unwrap(), Item::Data(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_http_stack_events_are_not_shipped() {
        let (ingest, mut rx) = create_channel(8, Duration::from_secs(1));
        let subscriber = tracing_subscriber::registry().with(remote_layer(ingest));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "hyper::proto::h1::io", "flushed 512 bytes");
            tracing::trace!(target: "reqwest::connect", "starting new connection");
            tracing::debug!(target: "h2::codec::framed_write", "send frame");
            tracing::trace!(target: "want", "signal: Want");
            tracing::info!(target: "hyperion", "kept");
        });

        assert!(matches!(rx.try_recv().unwrap(), Item::Data(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_during_delivery_are_not_shipped() {
        let (ingest, mut rx) = create_channel(8, Duration::from_secs(1));
        let subscriber = tracing_subscriber::registry().with(remote_layer(ingest));
        let _guard = tracing::subscriber::set_default(subscriber);

        delivering(async {
            tracing::info!(target: "app", "inside push");
        })
        .await;
        assert!(rx.try_recv().is_err());

        tracing::info!(target: "app", "outside push");
        assert!(matches!(rx.try_recv().unwrap(), Item::Data(_)));
    }
}
