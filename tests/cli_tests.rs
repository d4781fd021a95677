mod common;

use chrono::Utc;
use common::{record, MockLoki};
use lokitee::cli::run::{ship_stream, RunError};
use lokitee::config::load_config;
use lokitee::config::types::DecodeErrorStrategy;
use lokitee::pipeline::ShipError;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

fn write_config(url: &str, on_decode_error: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
loki:
  url: {url}/
  retry_interval: 100ms
labels:
  - name: job
    value: cli-test
pipeline:
  flush_interval: 1s
  sync_timeout: 500ms
  on_decode_error: {on_decode_error}
"#
    )
    .unwrap();
    file.flush().unwrap();
    file
}

fn lines(records: &[Vec<u8>]) -> Vec<u8> {
    let mut input = Vec::new();
    for record in records {
        input.extend_from_slice(record);
        input.push(b'\n');
    }
    input
}

#[tokio::test]
async fn test_ship_stream_echoes_and_ships() {
    let loki = MockLoki::start().await;
    let file = write_config(&loki.url, "fail");
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.pipeline.on_decode_error, DecodeErrorStrategy::Fail);

    let mut input = lines(&[
        record(Utc::now(), "INFO", "app", json!({"message": "one"})),
        record(Utc::now(), "INFO", "app", json!({"message": "two"})),
    ]);
    input.extend_from_slice(b"\n   \n");

    let mut local = Vec::new();
    let summary = ship_stream(&config, input.as_slice(), &mut local, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.dropped, 0);
    assert!(summary.synced);

    let echoed = String::from_utf8(local).unwrap();
    assert_eq!(echoed.lines().count(), 2);
    assert!(echoed.contains("\"one\""));

    let delivered = loki.delivered();
    assert_eq!(delivered.len(), 1);
    let stream = &delivered[0].streams[0];
    assert_eq!(stream.stream["job"], "cli-test");
    assert_eq!(stream.values.len(), 2);
}

#[tokio::test]
async fn test_ship_stream_skips_garbage_with_drop_strategy() {
    let loki = MockLoki::start().await;
    let file = write_config(&loki.url, "drop");
    let config = load_config(file.path()).unwrap();

    let mut input = b"plain text line\n".to_vec();
    input.extend(lines(&[record(Utc::now(), "INFO", "app", json!({"message": "ok"}))]));

    let mut local = Vec::new();
    let summary = ship_stream(&config, input.as_slice(), &mut local, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.submitted, 2);
    assert!(summary.synced);
    // The local sink still sees the line Loki never gets.
    assert!(String::from_utf8(local).unwrap().contains("plain text line"));
    assert_eq!(loki.delivered()[0].streams[0].values.len(), 1);
}

#[tokio::test]
async fn test_ship_stream_fails_on_garbage_by_default() {
    let loki = MockLoki::start().await;
    let file = write_config(&loki.url, "fail");
    let config = load_config(file.path()).unwrap();

    let input = b"plain text line\n".to_vec();
    let mut local = Vec::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        ship_stream(&config, input.as_slice(), &mut local, CancellationToken::new()),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(RunError::Ship(ShipError::Decode(_)))));
    assert_eq!(loki.attempts(), 0);
}

#[tokio::test]
async fn test_ship_stream_stops_on_cancel() {
    let loki = MockLoki::start().await;
    loki.set_default_status(500);
    let file = write_config(&loki.url, "fail");
    let config = load_config(file.path()).unwrap();

    // Never reaches EOF.
    let (_writer, reader) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let mut local = Vec::new();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        ship_stream(&config, reader, &mut local, cancel),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.submitted, 0);
    assert!(!summary.synced);
}

#[tokio::test]
async fn test_ship_stream_cancelled_run_returns_summary() {
    let loki = MockLoki::start().await;
    let file = write_config(&loki.url, "fail");
    let config = load_config(file.path()).unwrap();

    // The dispatcher sees the same cancellation; the run must still end cleanly.
    for _ in 0..20 {
        let (_writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut local = Vec::new();
        let summary = ship_stream(&config, reader, &mut local, cancel)
            .await
            .unwrap();
        assert!(!summary.synced);
    }
}

#[tokio::test]
async fn test_ship_stream_passes_invalid_utf8_to_decoder() {
    let loki = MockLoki::start().await;
    let file = write_config(&loki.url, "drop");
    let config = load_config(file.path()).unwrap();

    let mut input = b"\xff\xfe garbage\r\n".to_vec();
    input.extend(lines(&[record(Utc::now(), "INFO", "app", json!({"message": "after"}))]));

    let mut local = Vec::new();
    let summary = ship_stream(&config, input.as_slice(), &mut local, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.submitted, 2);
    assert!(summary.synced);
    assert!(local.starts_with(b"\xff\xfe garbage\n"));

    let delivered = loki.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].streams[0].values.len(), 1);
    assert!(delivered[0].streams[0].values[0][1].contains("after"));
}
