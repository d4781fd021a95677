use crate::config::types::{DecodeErrorStrategy, FieldKeys};
use crate::stream::labels::{LabelSchema, LabelTypeError};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no '{0}' field")]
    MissingField(String),

    #[error("field '{field}' must be a {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("timestamp '{0}' does not fit in nanoseconds since the epoch")]
    TimestampRange(String),

    #[error(transparent)]
    Label(#[from] LabelTypeError),
}

/// Identity of a Loki stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamKey {
    pub level: String,
    pub logger: String,
    /// Values in label-schema order.
    pub labels: Vec<Option<String>>,
}

/// One line of a stream: unix nanoseconds plus the record minus its
/// time, level, logger and label fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: i64,
    pub line: String,
}

pub type StreamGroups = BTreeMap<StreamKey, Vec<Entry>>;

/// Highest timestamp shipped so far, in unix nanoseconds. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(i64);

impl Watermark {
    pub fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    pub fn nanos(&self) -> i64 {
        self.0
    }

    /// Moves `timestamp` up to the watermark if it is older.
    pub fn lift(&self, timestamp: i64) -> i64 {
        timestamp.max(self.0)
    }

    pub fn advance(&mut self, timestamp: i64) {
        if timestamp > self.0 {
            self.0 = timestamp;
        }
    }
}

/// Turns a drained batch of raw records into sorted per-stream sequences.
///
/// Records older than the watermark are moved up to it so that a stream never
/// goes back in time across pushes.
#[derive(Debug)]
pub struct Grouper {
    schema: LabelSchema,
    fields: FieldKeys,
    watermark: Watermark,
    on_decode_error: DecodeErrorStrategy,
}

impl Grouper {
    pub fn new(
        schema: LabelSchema,
        fields: FieldKeys,
        watermark: Watermark,
        on_decode_error: DecodeErrorStrategy,
    ) -> Self {
        Self {
            schema,
            fields,
            watermark,
            on_decode_error,
        }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn group(&mut self, records: Vec<Vec<u8>>) -> Result<StreamGroups, DecodeError> {
        let mut groups = StreamGroups::new();

        for raw in records {
            match self.decode(&raw) {
                Ok((key, entry)) => groups.entry(key).or_default().push(entry),
                Err(e) => match self.on_decode_error {
                    DecodeErrorStrategy::Fail => return Err(e),
                    DecodeErrorStrategy::Drop => {
                        warn!(
                            error = %e,
                            record = %String::from_utf8_lossy(&raw),
                            "Dropping malformed log record"
                        );
                    }
                },
            }
        }

        // Stable sort keeps arrival order for equal timestamps.
        for entries in groups.values_mut() {
            entries.sort_by_key(|entry| entry.timestamp);
            if let Some(last) = entries.last() {
                self.watermark.advance(last.timestamp);
            }
        }

        Ok(groups)
    }

    fn decode(&self, raw: &[u8]) -> Result<(StreamKey, Entry), DecodeError> {
        let mut record = match serde_json::from_slice::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(DecodeError::NotAnObject),
        };

        let time = take_string(&mut record, &self.fields.time)?
            .ok_or_else(|| DecodeError::MissingField(self.fields.time.clone()))?;
        let timestamp = parse_timestamp(&time)?;

        let level = take_string(&mut record, &self.fields.level)?
            .ok_or_else(|| DecodeError::MissingField(self.fields.level.clone()))?;
        let logger = take_string(&mut record, &self.fields.logger)?.unwrap_or_default();
        let labels = self.schema.extract(&mut record)?;

        let key = StreamKey {
            level,
            logger,
            labels,
        };
        let entry = Entry {
            timestamp: self.watermark.lift(timestamp),
            line: Value::Object(record).to_string(),
        };
        Ok((key, entry))
    }
}

fn take_string(record: &mut Map<String, Value>, key: &str) -> Result<Option<String>, DecodeError> {
    match record.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(DecodeError::TypeMismatch {
            field: key.to_string(),
            expected: "string",
        }),
    }
}

fn parse_timestamp(value: &str) -> Result<i64, DecodeError> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|source| DecodeError::Timestamp {
        value: value.to_string(),
        source,
    })?;
    parsed
        .timestamp_nanos_opt()
        .ok_or_else(|| DecodeError::TimestampRange(value.to_string()))
}
