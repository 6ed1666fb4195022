// Declare the modules to re-export
pub mod schema;
pub mod core;
pub mod record;
pub mod encoders;
pub mod publishers;

// Re-export the everyday API
pub use crate::core::*;
pub use encoders::{DeviceInfo, DiscoveryConfig, DiscoveryEncoder, DiscoveryMessage, JsonEncoder, Point, PointEncoder};
pub use publishers::{CloseError, PublishError, Publisher};
pub use record::{DecodeError, Decoder, FieldDecodeWarning, RawObservation, Record, Value};
pub use schema::{FieldKind, FieldSchema, UnitConversion, UnitMetadata, STATION_FIELDS};
