use crate::config::types::LabelConfig;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("label '{name}' must be a string, number or boolean")]
pub struct LabelTypeError {
    pub name: String,
}

/// One label of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    /// Fallback when a record does not carry the field.
    pub value: Option<String>,
}

/// Ordered description of the record fields that become Loki stream labels.
///
/// Extracted values are positional: index `i` of [`LabelSchema::extract`]'s
/// result belongs to `labels()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSchema {
    labels: Vec<Label>,
}

impl LabelSchema {
    pub fn new(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    /// Schema of labels without static fallbacks.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| Label { name: name.into(), value: None })
                .collect(),
        )
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Remove every schema field from `record` and return the label values.
    pub fn extract(
        &self,
        record: &mut Map<String, Value>,
    ) -> Result<Vec<Option<String>>, LabelTypeError> {
        self.labels
            .iter()
            .map(|label| {
                let value = match record.remove(&label.name) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
                    Some(Value::Array(_) | Value::Object(_)) => {
                        return Err(LabelTypeError { name: label.name.clone() })
                    }
                };
                Ok(value.or_else(|| label.value.clone()))
            })
            .collect()
    }

    /// Pair extracted values with their label names, skipping absent ones.
    pub fn named<'a>(
        &'a self,
        values: &'a [Option<String>],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.labels
            .iter()
            .zip(values)
            .filter_map(|(label, value)| value.as_deref().map(|v| (label.name.as_str(), v)))
    }
}

impl From<&[LabelConfig]> for LabelSchema {
    fn from(labels: &[LabelConfig]) -> Self {
        Self::new(
            labels
                .iter()
                .map(|l| Label { name: l.name.clone(), value: l.value.clone() })
                .collect(),
        )
    }
}
