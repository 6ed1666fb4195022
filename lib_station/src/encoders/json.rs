//! # JSON Encoder
//!
//! Projects a `Record` onto one JSON object keyed by output key, in schema
//! order. Nullable fields are always present (`null` when there is no data or
//! the station did not send them); non-nullable fields that failed to decode
//! are left out. Timestamps are ISO-8601 strings.

use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::core::registry::SchemaRegistry;
use crate::record::{Record, Value};

/// Serializable view of a record.
pub struct JsonDocument<'a> {
    record: &'a Record,
    registry: &'a SchemaRegistry,
}

impl Serialize for JsonDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for field in self.registry.fields() {
            let schema = &field.schema;
            match self.record.get(schema.output_key) {
                Some(value) => map.serialize_entry(schema.output_key, &JsonValue(value))?,
                None if schema.kind.is_nullable() => map.serialize_entry(schema.output_key, &JsonValue(&Value::Null))?,
                None => {}
            }
        }
        map.end()
    }
}

struct JsonValue<'a>(&'a Value);

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Text(v) => serializer.serialize_str(v),
            Value::Integer(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Timestamp(v) => serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Null => serializer.serialize_none(),
        }
    }
}

/// Stateless JSON projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn document<'a>(record: &'a Record, registry: &'a SchemaRegistry) -> JsonDocument<'a> {
        JsonDocument { record, registry }
    }

    pub fn encode(record: &Record, registry: &SchemaRegistry) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Self::document(record, registry))
    }

    pub fn encode_vec(record: &Record, registry: &SchemaRegistry) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Self::document(record, registry))
    }
}
