//! # Publishers
//!
//! Every downstream sink implements [`Publisher`]. A publisher receives each
//! decoded `Record` from the dispatcher and projects it with one of the
//! encoders. `publish` must never block on the network: sinks with remote
//! endpoints hand the encoded payload to a background task and report only
//! local failures synchronously.
//!
//! ## Available Publishers:
//!
//! - **`json_debug`**: prints the JSON document of every record.
//! - **`influx_debug`**: prints the Line Protocol line of every record.
//! - **`influx`**: batches Line Protocol lines to an InfluxDB v2 write endpoint.
//! - **`mqtt`**: publishes the JSON document to the broker state topic.
//! - **`mqtt_transport`** (feature `mqtt`): the `rumqttc` transport behind the broker manager.

#![forbid(unsafe_code)]

use thiserror::Error;

use crate::core::broker_manager::TransportError;
use crate::encoders::PointError;
use crate::record::Record;

/// Stdout JSON debug sink.
pub mod json_debug;
/// Stdout Line Protocol debug sink.
pub mod influx_debug;
/// Batched InfluxDB writer.
pub mod influx;
/// Broker state-topic publisher.
pub mod mqtt;

#[cfg(feature = "mqtt")]
/// `rumqttc` implementation of the broker transport traits.
pub mod mqtt_transport;

pub use influx::{InfluxPublisher, LineWriter, WriteError, WriterSettings};
pub use influx_debug::InfluxDebugPublisher;
pub use json_debug::JsonDebugPublisher;
pub use mqtt::MqttPublisher;

#[cfg(feature = "influx")]
pub use influx::{HttpLineWriter, InfluxConnection};
#[cfg(feature = "mqtt")]
pub use mqtt_transport::{MqttConnectOptions, RumqttClient, RumqttEvents};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Point(#[from] PointError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("writer backlog is full, record dropped")]
    Backlog,

    #[error("publisher is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("failed to flush output: {0}")]
    Io(#[from] std::io::Error),

    #[error("background writer failed: {0}")]
    Writer(String),
}

/// A downstream sink in the fan-out.
pub trait Publisher: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    fn publish(&self, record: &Record) -> Result<(), PublishError>;

    /// Flushes and releases the sink. Called once at shutdown.
    fn close(&self) -> Result<(), CloseError>;
}
