//! # Core Engine Module
//!
//! The moving parts between the decoder and the outside world.
//!
//! ## Core Components:
//!
//! - **`registry`**: the startup-validated field table every other component reads.
//!
//! - **`dispatcher`**: the fan-out that hands each record to every publisher
//!   and keeps one failing sink from affecting the others.
//!
//! - **`pipeline`**: decode, plausibility checks and dispatch for one upload.
//!
//! - **`broker_manager`**: the state machine owning the broker connection,
//!   including discovery publishing on connect and on a timer.

#![forbid(unsafe_code)]

/// The validated, immutable field table.
pub mod registry;
/// Fan-out of records to publishers.
pub mod dispatcher;
/// Upload ingest: decode, check, dispatch.
pub mod pipeline;
/// Broker connection lifecycle.
pub mod broker_manager;

// --- Public API Re-exports ---
pub use broker_manager::{
    clear_discovery, BrokerClient, BrokerEvent, BrokerEvents, BrokerHandle, BrokerManager, BrokerSettings, BrokerState, QoS,
    QosError, TransportError,
};
pub use dispatcher::{CloseAllError, Dispatcher};
pub use pipeline::{IngestOutcome, Implausible, Pipeline, PlausibilityRule};
pub use registry::{RegisteredField, SchemaError, SchemaRegistry};
