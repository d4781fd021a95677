use crate::stream::{LabelSchema, StreamGroups};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /loki/api/v1/push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushStream {
    pub stream: BTreeMap<String, String>,
    /// `[unix nanoseconds as decimal string, log line]` pairs.
    pub values: Vec<[String; 2]>,
}

impl PushRequest {
    pub fn from_groups(schema: &LabelSchema, groups: StreamGroups) -> Self {
        let streams = groups
            .into_iter()
            .map(|(key, entries)| {
                let mut stream: BTreeMap<String, String> = schema
                    .named(&key.labels)
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect();
                stream.insert("level".to_string(), key.level);
                stream.insert("logger".to_string(), key.logger);

                let values = entries
                    .into_iter()
                    .map(|entry| [entry.timestamp.to_string(), entry.line])
                    .collect();

                PushStream { stream, values }
            })
            .collect();

        Self { streams }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of log lines across all streams.
    pub fn line_count(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }
}
