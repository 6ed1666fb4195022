//! # Record Encoders
//!
//! Three independent, stateless projections driven by the same schema:
//!
//! - **`point`**: time-series point and its Line Protocol rendering.
//! - **`json`**: JSON document mirroring the record.
//! - **`discovery`**: retained sensor configuration messages for broker discovery.
//!
//! None of them mutate the record.

#![forbid(unsafe_code)]

/// Time-series point encoder.
pub mod point;
/// JSON document encoder.
pub mod json;
/// Broker discovery encoder.
pub mod discovery;

pub use discovery::{DeviceInfo, DiscoveryConfig, DiscoveryEncoder, DiscoveryMessage};
pub use json::JsonEncoder;
pub use point::{FieldValue, Point, PointEncoder, PointError};
