//! # Typed Record
//!
//! A `Record` is the decoded form of one upload: an ordered mapping from
//! output key to `Value`, created fresh per decode and read-only afterwards.
//! Only the decoder can build one, which guarantees the timestamp is present.

use chrono::{DateTime, Utc};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    /// "No data" for a nullable numeric field.
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, used by range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One decoded observation, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entries: Vec<(&'static str, Value)>,
    timestamp: DateTime<Utc>,
}

impl Record {
    pub(crate) fn new(entries: Vec<(&'static str, Value)>, timestamp: DateTime<Utc>) -> Self {
        Self { entries, timestamp }
    }

    /// The observation time carried by the schema's timestamp field.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The value stored under `output_key`, or `None` if the field was absent.
    pub fn get(&self, output_key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| *key == output_key)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, output_key: &str) -> bool {
        self.get(output_key).is_some()
    }

    /// Entries in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
