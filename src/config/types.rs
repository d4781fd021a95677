use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_PENDING_SYNCS: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub loki: LokiConfig,
    #[serde(default)]
    pub labels: Vec<LabelConfig>,
    #[serde(default)]
    pub fields: FieldKeys,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Minimal config pointing at `url` with every other setting defaulted.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            loki: LokiConfig {
                url: url.into(),
                user: None,
                password: None,
                timeout: DEFAULT_REQUEST_TIMEOUT,
                retry_interval: DEFAULT_RETRY_INTERVAL,
                on_bad_request: BadRequestStrategy::Retry,
            },
            labels: Vec::new(),
            fields: FieldKeys::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiConfig {
    /// Base URL, `/loki/api/v1/push` is appended.
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-attempt request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(default)]
    pub on_bad_request: BadRequestStrategy,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_retry_interval() -> Duration {
    DEFAULT_RETRY_INTERVAL
}

/// What to do with a payload Loki rejected with HTTP 400.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadRequestStrategy {
    #[default]
    Retry,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub name: String,
    /// Used when a record does not carry the label itself.
    #[serde(default)]
    pub value: Option<String>,
}

/// Names of the record fields the grouper consumes.
///
/// The defaults match the JSON layout produced by `tracing_subscriber`'s json
/// formatter with flattened events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldKeys {
    pub time: String,
    pub level: String,
    pub logger: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self {
            time: "timestamp".to_string(),
            level: "level".to_string(),
            logger: "target".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub max_pending_syncs: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub sync_timeout: Duration,
    pub on_decode_error: DecodeErrorStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_pending_syncs: DEFAULT_MAX_PENDING_SYNCS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            on_decode_error: DecodeErrorStrategy::Fail,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorStrategy {
    /// Stop the dispatcher with the decode error.
    #[default]
    Fail,
    /// Log and skip the record.
    Drop,
}
