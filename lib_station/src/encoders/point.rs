//! # Point Encoder
//!
//! Projects a `Record` onto a time-series point: tag fields become the tag
//! set, every other non-timestamp field with a value becomes a field, and the
//! record's timestamp becomes the point time. Null fields are left out
//! entirely rather than written as zero.
//!
//! Line Protocol format, second precision:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_s
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::registry::SchemaRegistry;
use crate::record::{Record, Value};

/// A value that can be stored in a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// Format this value for Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }

    fn is_writable(&self) -> bool {
        match self {
            FieldValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointError {
    /// The time-series store rejects points without fields.
    #[error("point for measurement '{0}' has no writable fields")]
    EmptyFieldSet(String),

    /// Line breaks would split the line and invalidate the whole batch.
    #[error("'{0}' contains a line break and cannot be written")]
    LineBreak(String),
}

/// A single time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    /// Sorted by key, the canonical tag order.
    pub tags: BTreeMap<&'static str, String>,
    /// In schema order.
    pub fields: Vec<(&'static str, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Renders the point as one Line Protocol line with a seconds timestamp.
    /// Non-finite floats are skipped, since Line Protocol cannot carry them.
    pub fn to_line_protocol(&self) -> Result<String, PointError> {
        let mut line = escape_measurement(&self.measurement)?;

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key)?);
            line.push('=');
            line.push_str(&escape_key(value)?);
        }

        line.push(' ');

        let mut written = 0;
        for (key, value) in self.fields.iter().filter(|(_, v)| v.is_writable()) {
            if written > 0 {
                line.push(',');
            }
            if let FieldValue::String(text) = value {
                reject_line_breaks(text)?;
            }
            line.push_str(&escape_key(key)?);
            line.push('=');
            line.push_str(&value.to_line_protocol());
            written += 1;
        }

        if written == 0 {
            return Err(PointError::EmptyFieldSet(self.measurement.clone()));
        }

        line.push(' ');
        line.push_str(&self.timestamp.timestamp().to_string());

        Ok(line)
    }
}

/// Builds points for one measurement.
#[derive(Debug, Clone)]
pub struct PointEncoder {
    measurement: String,
}

impl PointEncoder {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn encode(&self, record: &Record, registry: &SchemaRegistry) -> Point {
        let mut tags = BTreeMap::new();
        let mut fields = Vec::new();

        for field in registry.fields() {
            let schema = &field.schema;
            if schema.timestamp_role {
                continue;
            }
            let Some(value) = record.get(schema.output_key) else {
                continue;
            };

            if schema.is_tag {
                if let Value::Text(text) = value {
                    tags.insert(schema.output_key, text.clone());
                }
                continue;
            }

            let field_value = match value {
                Value::Text(v) => FieldValue::String(v.clone()),
                Value::Integer(v) => FieldValue::Integer(*v),
                Value::Float(v) => FieldValue::Float(*v),
                Value::Timestamp(_) | Value::Null => continue,
            };
            fields.push((schema.output_key, field_value));
        }

        Point {
            measurement: self.measurement.clone(),
            tags,
            fields,
            timestamp: record.timestamp(),
        }
    }
}

fn reject_line_breaks(s: &str) -> Result<(), PointError> {
    if s.contains(['\n', '\r']) {
        return Err(PointError::LineBreak(s.to_string()));
    }
    Ok(())
}

/// Backslashes, spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> Result<String, PointError> {
    reject_line_breaks(s)?;
    Ok(s.replace('\\', "\\\\").replace(',', "\\,").replace(' ', "\\ "))
}

/// Backslashes, commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> Result<String, PointError> {
    reject_line_breaks(s)?;
    Ok(s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ "))
}
