//! # Field Schema Module
//!
//! The declarative field model shared by the decoder and every encoder:
//!
//! - **`field`**: `FieldSchema`, `FieldKind` and `UnitMetadata`.
//! - **`conversion`**: the fixed table of named unit conversions.
//! - **`station`**: the weather-station upload field table.
//!
//! Validation of a field table lives in `core::registry`.

#![forbid(unsafe_code)]

/// Field descriptors and kinds.
pub mod field;
/// Named, pure unit conversions.
pub mod conversion;
/// The station upload field table.
pub mod station;

pub use conversion::UnitConversion;
pub use field::{FieldKind, FieldSchema, UnitMetadata};
pub use station::STATION_FIELDS;
