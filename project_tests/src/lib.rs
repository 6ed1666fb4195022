//! # Shared Test Fixtures
//!
//! Sample uploads and in-memory sinks/transports used by the end-to-end tests
//! under `tests/`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use lib_station::{
    BrokerClient, BrokerEvent, BrokerEvents, CloseError, DeviceInfo, DiscoveryConfig, PublishError, Publisher, QoS,
    Record, TransportError,
};

/// A complete upload as the station sends it (minus `PASSWORD` and `action`).
pub const FULL_UPLOAD: &[(&str, &str)] = &[
    ("ID", "ST1"),
    ("softwaretype", "EasyWeatherV1.6.4"),
    ("dateutc", "2024-06-01 12:30:15"),
    ("tempf", "71.6"),
    ("indoortempf", "73.2"),
    ("dewptf", "55.4"),
    ("windchillf", "71.6"),
    ("humidity", "57"),
    ("indoorhumidity", "49"),
    ("baromin", "29.92"),
    ("absbaromin", "29.81"),
    ("UV", "3"),
    ("solarradiation", "412.5"),
    ("winddir", "225"),
    ("windspeedmph", "4.5"),
    ("windgustmph", "8.1"),
    ("rainin", "0.01"),
    ("dailyrainin", "0.12"),
    ("weeklyrainin", "0.5"),
    ("monthlyrainin", "1.75"),
];

/// Records every record it sees; fails every publish when `fail` is set.
pub struct RecordingSink {
    pub name: &'static str,
    pub fail: bool,
    pub seen: Arc<Mutex<Vec<Record>>>,
    pub closed: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new(name: &'static str, fail: bool) -> Self {
        Self {
            name,
            fail,
            seen: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Publisher for RecordingSink {
    fn name(&self) -> &str {
        self.name
    }

    fn publish(&self, record: &Record) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Closed);
        }
        self.seen.lock().map_err(|_| PublishError::Closed)?.push(record.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CloseError::Writer(format!("{} refused to close", self.name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

/// Broker client that keeps every packet in memory.
#[derive(Clone, Default)]
pub struct MemoryClient {
    pub sent: Arc<Mutex<Vec<SentPacket>>>,
    pub disconnects: Arc<AtomicUsize>,
}

impl MemoryClient {
    pub fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl BrokerClient for MemoryClient {
    fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), TransportError> {
        self.sent
            .lock()
            .map_err(|_| TransportError::Request("poisoned".into()))?
            .push(SentPacket {
                topic: topic.to_string(),
                qos,
                retain,
                payload,
            });
        Ok(())
    }

    fn try_disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Event stream fed by the test through the paired sender.
pub struct ScriptedEvents {
    rx: mpsc::UnboundedReceiver<Result<BrokerEvent, TransportError>>,
}

impl ScriptedEvents {
    pub fn channel() -> (mpsc::UnboundedSender<Result<BrokerEvent, TransportError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl BrokerEvents for ScriptedEvents {
    async fn poll(&mut self) -> Result<BrokerEvent, TransportError> {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

pub fn discovery_config() -> DiscoveryConfig {
    DiscoveryConfig {
        discovery_prefix: "homeassistant".into(),
        device_prefix: "weatherstation_".into(),
        state_topic: "homeassistant/sensor/sensorWeatherStation/state".into(),
        device: DeviceInfo {
            identifiers: vec!["weatherstation".into()],
            manufacturer: "ws-upload".into(),
            model: "Station upload".into(),
            name: "Weather station".into(),
        },
    }
}
