//! # Record Decoder
//!
//! Turns the flat key-value upload into a typed `Record`, walking the schema
//! registry in order. Per-field problems never fail the call: a missing or
//! malformed field is logged and left out of the record. Only the timestamp is
//! fatal, because every encoder needs it.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::core::registry::{RegisteredField, SchemaRegistry};
use crate::record::value::{Record, Value};
use crate::schema::FieldKind;

/// Literal that means "no data" for nullable numeric fields.
pub const NO_DATA_SENTINEL: &str = "-9999";

/// Layout of the upload timestamp, always interpreted as UTC.
pub const TIMESTAMP_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// The whole upload is rejected; the service keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing query param '{source_key}' for timestamp field '{output_key}'")]
    MissingTimestamp {
        source_key: &'static str,
        output_key: &'static str,
    },

    #[error("failed to parse timestamp field '{output_key}' from {value:?}: {reason}")]
    InvalidTimestamp {
        source_key: &'static str,
        output_key: &'static str,
        value: String,
        reason: String,
    },
}

impl DecodeError {
    /// Output key of the timestamp field the error is about.
    pub fn field(&self) -> &'static str {
        match self {
            DecodeError::MissingTimestamp { output_key, .. } => output_key,
            DecodeError::InvalidTimestamp { output_key, .. } => output_key,
        }
    }
}

/// A single field was dropped from the record; decoding continued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldDecodeWarning {
    #[error("missing query param '{source_key}' for field '{output_key}'")]
    Missing {
        source_key: &'static str,
        output_key: &'static str,
        nullable: bool,
    },

    #[error("failed to parse query param '{source_key}' for field '{output_key}' with value {value:?}: {reason}")]
    Malformed {
        source_key: &'static str,
        output_key: &'static str,
        value: String,
        reason: String,
    },
}

impl FieldDecodeWarning {
    pub fn output_key(&self) -> &'static str {
        match self {
            FieldDecodeWarning::Missing { output_key, .. } => output_key,
            FieldDecodeWarning::Malformed { output_key, .. } => output_key,
        }
    }

    fn log(&self) {
        match self {
            FieldDecodeWarning::Missing {
                source_key,
                output_key,
                nullable: true,
            } => tracing::debug!(source_key, output_key, "{}", self),
            FieldDecodeWarning::Missing {
                source_key,
                output_key,
                nullable: false,
            } => tracing::warn!(source_key, output_key, "{}", self),
            FieldDecodeWarning::Malformed {
                source_key,
                output_key,
                value,
                ..
            } => tracing::error!(source_key, output_key, value = %value, "{}", self),
        }
    }
}

/// Read access to a raw upload. Empty values count as absent, since upload
/// clients send `key=` for sensors they do not have. Pair lists resolve a
/// repeated key to its first occurrence.
pub trait RawObservation {
    fn raw(&self, source_key: &str) -> Option<&str>;
}

impl<S: BuildHasher> RawObservation for HashMap<String, String, S> {
    fn raw(&self, source_key: &str) -> Option<&str> {
        self.get(source_key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

impl RawObservation for BTreeMap<String, String> {
    fn raw(&self, source_key: &str) -> Option<&str> {
        self.get(source_key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

impl RawObservation for [(&str, &str)] {
    fn raw(&self, source_key: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| *key == source_key)
            .map(|(_, value)| *value)
            .filter(|v| !v.is_empty())
    }
}

impl RawObservation for [(String, String)] {
    fn raw(&self, source_key: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key == source_key)
            .map(|(_, value)| value.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Schema-driven decoder. Cheap to clone; shares the registry.
#[derive(Debug, Clone)]
pub struct Decoder {
    registry: Arc<SchemaRegistry>,
}

impl Decoder {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Decodes an upload, logging every dropped field.
    pub fn decode<R: RawObservation + ?Sized>(&self, raw: &R) -> Result<Record, DecodeError> {
        self.decode_with_warnings(raw).map(|(record, _)| record)
    }

    /// Like [`Decoder::decode`], also returning the per-field diagnostics.
    pub fn decode_with_warnings<R: RawObservation + ?Sized>(
        &self,
        raw: &R,
    ) -> Result<(Record, Vec<FieldDecodeWarning>), DecodeError> {
        let mut entries = Vec::with_capacity(self.registry.fields().len());
        let mut warnings = Vec::new();
        let mut timestamp = None;

        for field in self.registry.fields() {
            let schema = &field.schema;

            let Some(literal) = raw.raw(schema.source_key) else {
                if schema.timestamp_role {
                    return Err(DecodeError::MissingTimestamp {
                        source_key: schema.source_key,
                        output_key: schema.output_key,
                    });
                }
                let warning = FieldDecodeWarning::Missing {
                    source_key: schema.source_key,
                    output_key: schema.output_key,
                    nullable: schema.kind.is_nullable(),
                };
                warning.log();
                warnings.push(warning);
                continue;
            };

            let value = match schema.kind {
                FieldKind::Text => Value::Text(literal.to_string()),
                FieldKind::Timestamp => {
                    let parsed = NaiveDateTime::parse_from_str(literal, TIMESTAMP_LAYOUT)
                        .map_err(|e| DecodeError::InvalidTimestamp {
                            source_key: schema.source_key,
                            output_key: schema.output_key,
                            value: literal.to_string(),
                            reason: e.to_string(),
                        })?
                        .and_utc();
                    if schema.timestamp_role {
                        timestamp = Some(parsed);
                    }
                    Value::Timestamp(parsed)
                }
                _ => match parse_numeric(field, literal) {
                    Ok(value) => value,
                    Err(reason) => {
                        let warning = FieldDecodeWarning::Malformed {
                            source_key: schema.source_key,
                            output_key: schema.output_key,
                            value: literal.to_string(),
                            reason,
                        };
                        warning.log();
                        warnings.push(warning);
                        continue;
                    }
                },
            };

            entries.push((schema.output_key, value));
        }

        // The registry guarantees exactly one timestamp field, and the loop
        // returns early when it is absent or unparseable.
        let timestamp_field = self.registry.timestamp_field();
        let timestamp = timestamp.ok_or(DecodeError::MissingTimestamp {
            source_key: timestamp_field.source_key,
            output_key: timestamp_field.output_key,
        })?;

        Ok((Record::new(entries, timestamp), warnings))
    }
}

/// Parses a numeric literal. The sentinel only means "no data" for nullable
/// kinds; a non-nullable field parses it as the number -9999.
fn parse_numeric(field: &RegisteredField, literal: &str) -> Result<Value, String> {
    let kind = field.schema.kind;
    if kind.is_nullable() && literal == NO_DATA_SENTINEL {
        return Ok(Value::Null);
    }

    if kind.is_float() {
        let parsed: f64 = literal.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
        Ok(Value::Float(field.conversion.map_or(parsed, |c| c.apply(parsed))))
    } else {
        let parsed: i64 = literal.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
        Ok(Value::Integer(parsed))
    }
}
