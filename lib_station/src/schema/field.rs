//! # Field Descriptors
//!
//! A `FieldSchema` is the single declaration of one telemetry field. The
//! decoder reads it to find and parse the raw value, the point encoder reads
//! it to decide tag vs. field, the JSON encoder reads its output key, and the
//! discovery encoder reads its display and unit metadata.

/// The declared type of a field, driving parsing and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Copied verbatim from the raw input.
    Text,
    /// Parsed with the fixed upload layout in UTC.
    Timestamp,
    /// 64-bit float, never null.
    Float,
    /// 64-bit signed integer, never null.
    Integer,
    /// 64-bit float; the no-data sentinel decodes to null.
    NullableFloat,
    /// 64-bit signed integer; the no-data sentinel decodes to null.
    NullableInteger,
}

impl FieldKind {
    /// Whether this kind may decode to `Value::Null`.
    pub fn is_nullable(self) -> bool {
        matches!(self, FieldKind::NullableFloat | FieldKind::NullableInteger)
    }

    /// Whether the raw literal is parsed as a number.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldKind::Float | FieldKind::Integer | FieldKind::NullableFloat | FieldKind::NullableInteger
        )
    }

    /// Whether the parsed number is a float (and so may carry a unit conversion).
    pub fn is_float(self) -> bool {
        matches!(self, FieldKind::Float | FieldKind::NullableFloat)
    }
}

/// Home-automation sensor metadata. Every part is optional; a sensor without
/// a device class (UV index, for instance) still has a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitMetadata {
    pub device_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub state_class: Option<&'static str>,
}

/// Declarative description of one telemetry field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    /// Key in the raw upload (query parameter name).
    pub source_key: &'static str,
    /// Key in the decoded record and in every downstream format.
    pub output_key: &'static str,
    pub kind: FieldKind,
    /// Name of a unit conversion applied after parsing.
    pub conversion: Option<&'static str>,
    /// Indexing dimension on the time-series point.
    pub is_tag: bool,
    /// The record's observation timestamp.
    pub timestamp_role: bool,
    /// Human readable sensor name for discovery.
    pub display_name: Option<&'static str>,
    pub unit_metadata: Option<UnitMetadata>,
}

impl FieldSchema {
    /// Starts a plain, untagged field with no conversion or metadata.
    pub const fn new(source_key: &'static str, output_key: &'static str, kind: FieldKind) -> Self {
        Self {
            source_key,
            output_key,
            kind,
            conversion: None,
            is_tag: false,
            timestamp_role: false,
            display_name: None,
            unit_metadata: None,
        }
    }

    pub const fn converted(mut self, conversion: &'static str) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub const fn tag(mut self) -> Self {
        self.is_tag = true;
        self
    }

    pub const fn timestamp(mut self) -> Self {
        self.timestamp_role = true;
        self
    }

    pub const fn display(mut self, name: &'static str) -> Self {
        self.display_name = Some(name);
        self
    }

    pub const fn unit(mut self, metadata: UnitMetadata) -> Self {
        self.unit_metadata = Some(metadata);
        self
    }

    /// True when the field should be announced to discovery consumers.
    pub fn has_discovery_metadata(&self) -> bool {
        self.display_name.is_some() || self.unit_metadata.is_some()
    }
}
