//! # Record Module
//!
//! - **`value`**: the `Value` tagged union and the ordered `Record`.
//! - **`decoder`**: the schema-driven decoder from raw uploads to records.

#![forbid(unsafe_code)]

/// Decoded values and records.
pub mod value;
/// Raw upload to `Record` decoding.
pub mod decoder;

pub use decoder::{DecodeError, Decoder, FieldDecodeWarning, RawObservation, NO_DATA_SENTINEL};
pub use value::{Record, Value};
