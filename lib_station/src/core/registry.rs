//! # Schema Registry
//!
//! The immutable, startup-validated table of field metadata. Once `new`
//! returns, the registry is never mutated, so it is shared behind an `Arc`
//! and read without locks from every request.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::{FieldKind, FieldSchema, UnitConversion, STATION_FIELDS};

/// A malformed or contradictory field table. The process must not start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema declares no timestamp field")]
    MissingTimestamp,

    #[error("schema declares more than one timestamp field: {0:?}")]
    MultipleTimestamps(Vec<&'static str>),

    #[error("timestamp field '{0}' must have the timestamp kind")]
    TimestampKind(&'static str),

    #[error("duplicate source key '{0}'")]
    DuplicateSourceKey(&'static str),

    #[error("duplicate output key '{0}'")]
    DuplicateOutputKey(&'static str),

    #[error("field '{field}' references unregistered conversion '{conversion}'")]
    UnknownConversion {
        field: &'static str,
        conversion: &'static str,
    },

    #[error("field '{field}' declares conversion '{conversion}' but is not a float kind")]
    ConversionOnNonFloat {
        field: &'static str,
        conversion: &'static str,
    },

    #[error("tag field '{0}' must have the text kind")]
    TagNotText(&'static str),
}

/// A validated field together with its resolved conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisteredField {
    pub schema: FieldSchema,
    pub conversion: Option<UnitConversion>,
}

/// The validated field table.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    fields: Vec<RegisteredField>,
    timestamp_index: usize,
}

impl SchemaRegistry {
    /// Validates a field table and freezes it.
    pub fn new(fields: &[FieldSchema]) -> Result<Self, SchemaError> {
        let mut source_keys = HashSet::new();
        let mut output_keys = HashSet::new();
        let mut timestamps = Vec::new();
        let mut registered = Vec::with_capacity(fields.len());

        for (index, field) in fields.iter().enumerate() {
            if !source_keys.insert(field.source_key) {
                return Err(SchemaError::DuplicateSourceKey(field.source_key));
            }
            if !output_keys.insert(field.output_key) {
                return Err(SchemaError::DuplicateOutputKey(field.output_key));
            }
            if field.is_tag && field.kind != FieldKind::Text {
                return Err(SchemaError::TagNotText(field.output_key));
            }
            if field.timestamp_role {
                if field.kind != FieldKind::Timestamp {
                    return Err(SchemaError::TimestampKind(field.output_key));
                }
                timestamps.push((index, field.output_key));
            }

            let conversion = match field.conversion {
                Some(name) => {
                    let conversion = UnitConversion::from_name(name).ok_or(SchemaError::UnknownConversion {
                        field: field.output_key,
                        conversion: name,
                    })?;
                    if !field.kind.is_float() {
                        return Err(SchemaError::ConversionOnNonFloat {
                            field: field.output_key,
                            conversion: name,
                        });
                    }
                    Some(conversion)
                }
                None => None,
            };

            registered.push(RegisteredField {
                schema: *field,
                conversion,
            });
        }

        let timestamp_index = match timestamps.as_slice() {
            [] => return Err(SchemaError::MissingTimestamp),
            [(index, _)] => *index,
            many => {
                return Err(SchemaError::MultipleTimestamps(
                    many.iter().map(|(_, key)| *key).collect(),
                ))
            }
        };

        tracing::debug!(fields = registered.len(), "Schema registry validated");

        Ok(Self {
            fields: registered,
            timestamp_index,
        })
    }

    /// The registry for the weather-station upload protocol.
    pub fn station() -> Result<Self, SchemaError> {
        Self::new(STATION_FIELDS)
    }

    /// All fields in schema order.
    pub fn fields(&self) -> &[RegisteredField] {
        &self.fields
    }

    /// The single field carrying the observation timestamp.
    pub fn timestamp_field(&self) -> &FieldSchema {
        &self.fields[self.timestamp_index].schema
    }

    /// Looks up a field by its output key.
    pub fn field(&self, output_key: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .map(|f| &f.schema)
            .find(|f| f.output_key == output_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: FieldSchema = FieldSchema::new("dateutc", "observation_time", FieldKind::Timestamp).timestamp();

    #[test]
    fn test_station_schema_is_valid() {
        let registry = SchemaRegistry::station().expect("station schema must validate");
        assert_eq!(registry.fields().len(), STATION_FIELDS.len());
        assert_eq!(registry.timestamp_field().output_key, "observation_time");
        assert_eq!(
            registry.fields()[3].conversion,
            Some(UnitConversion::FahrenheitToCelsius)
        );
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let fields = [FieldSchema::new("ID", "station_id", FieldKind::Text)];
        assert_eq!(SchemaRegistry::new(&fields).unwrap_err(), SchemaError::MissingTimestamp);
    }

    #[test]
    fn test_two_timestamps_rejected() {
        let fields = [
            TS,
            FieldSchema::new("other", "other_time", FieldKind::Timestamp).timestamp(),
        ];
        assert_eq!(
            SchemaRegistry::new(&fields).unwrap_err(),
            SchemaError::MultipleTimestamps(vec!["observation_time", "other_time"])
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let fields = [
            TS,
            FieldSchema::new("tempf", "a", FieldKind::Float),
            FieldSchema::new("tempf", "b", FieldKind::Float),
        ];
        assert_eq!(
            SchemaRegistry::new(&fields).unwrap_err(),
            SchemaError::DuplicateSourceKey("tempf")
        );

        let fields = [
            TS,
            FieldSchema::new("x", "same", FieldKind::Float),
            FieldSchema::new("y", "same", FieldKind::Float),
        ];
        assert_eq!(
            SchemaRegistry::new(&fields).unwrap_err(),
            SchemaError::DuplicateOutputKey("same")
        );
    }

    #[test]
    fn test_unknown_conversion_rejected() {
        let fields = [
            TS,
            FieldSchema::new("tempk", "temp", FieldKind::Float).converted("kelvin_to_celsius"),
        ];
        assert_eq!(
            SchemaRegistry::new(&fields).unwrap_err(),
            SchemaError::UnknownConversion {
                field: "temp",
                conversion: "kelvin_to_celsius"
            }
        );
    }

    #[test]
    fn test_conversion_on_integer_rejected() {
        let fields = [
            TS,
            FieldSchema::new("winddir", "dir", FieldKind::Integer).converted("mph_to_meters_per_second"),
        ];
        assert!(matches!(
            SchemaRegistry::new(&fields),
            Err(SchemaError::ConversionOnNonFloat { field: "dir", .. })
        ));
    }

    #[test]
    fn test_numeric_tag_rejected() {
        let fields = [TS, FieldSchema::new("n", "n", FieldKind::Integer).tag()];
        assert_eq!(SchemaRegistry::new(&fields).unwrap_err(), SchemaError::TagNotText("n"));
    }
}
