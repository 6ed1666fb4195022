//! # Broker Lifecycle Manager
//!
//! Owns the long-lived publish/subscribe connection: it drives the transport's
//! event loop, republishes the discovery configuration every time the broker
//! (re)accepts the session and on a timer while connected, and disconnects
//! gracefully once the shutdown token fires.
//!
//! The transport is abstracted behind [`BrokerClient`] (the cloneable handle
//! used to enqueue packets) and [`BrokerEvents`] (the event stream that must be
//! polled for the connection to make progress), so the state machine runs
//! against a fake in tests and against `rumqttc` in production.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> ShuttingDown -> Disconnected
//!                     ^             |
//!                     +-------------+  (connection lost, auto-reconnect)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::registry::SchemaRegistry;
use crate::encoders::DiscoveryEncoder;

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid QoS level {0}, expected 0, 1 or 2")]
pub struct QosError(pub u8);

impl TryFrom<u8> for QoS {
    type Error = QosError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(QosError(other)),
        }
    }
}

/// A broker-level failure. Recoverable: the transport reconnects on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid broker address '{0}'")]
    InvalidAddress(String),

    #[error("request queue rejected packet: {0}")]
    Request(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// What the event loop reported, reduced to what the lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker accepted the session (first connect or reconnect).
    Connected,
    /// The broker acknowledged a QoS > 0 publish.
    Acknowledged(u16),
    /// A disconnect packet went out or came in.
    Disconnected,
    /// Anything else (pings, outgoing publishes, ...).
    Other,
}

/// Cloneable handle that enqueues packets without waiting for the broker.
pub trait BrokerClient: Clone + Send + Sync + 'static {
    fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), TransportError>;

    fn try_disconnect(&self) -> Result<(), TransportError>;
}

/// The transport's event loop. Polling it is what actually moves packets.
/// After an error the next poll reconnects.
pub trait BrokerEvents: Send + 'static {
    fn poll(&mut self) -> impl Future<Output = Result<BrokerEvent, TransportError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

/// Tunables of the lifecycle task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub discovery_enabled: bool,
    pub discovery_qos: QoS,
    /// Period of the discovery republish while connected.
    pub discovery_interval: Duration,
    /// Pause after a connection error before polling again.
    pub reconnect_delay: Duration,
    /// Upper bound on the graceful disconnect at shutdown.
    pub disconnect_grace: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            discovery_qos: QoS::AtLeastOnce,
            discovery_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

/// Handle to a running lifecycle task.
pub struct BrokerHandle {
    state: watch::Receiver<BrokerState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BrokerHandle {
    pub fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<BrokerState> {
        self.state.clone()
    }

    /// Signals shutdown without waiting for it.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for the task to disconnect and exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Broker lifecycle task failed");
        }
    }
}

pub struct BrokerManager<C, E> {
    client: C,
    events: E,
    discovery: DiscoveryEncoder,
    registry: Arc<SchemaRegistry>,
    settings: BrokerSettings,
    state: watch::Sender<BrokerState>,
    cancel: CancellationToken,
}

impl<C: BrokerClient, E: BrokerEvents> BrokerManager<C, E> {
    pub fn new(
        client: C,
        events: E,
        discovery: DiscoveryEncoder,
        registry: Arc<SchemaRegistry>,
        settings: BrokerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(BrokerState::Disconnected);
        Self {
            client,
            events,
            discovery,
            registry,
            settings,
            state,
            cancel,
        }
    }

    /// Starts the lifecycle task on the current runtime.
    pub fn spawn(self) -> BrokerHandle {
        let state = self.state.subscribe();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        BrokerHandle { state, cancel, task }
    }

    /// The lifecycle loop. Returns once shutdown completed.
    pub async fn run(mut self) {
        self.set_state(BrokerState::Connecting);

        let interval = self.settings.discovery_interval;
        let mut republish = tokio::time::interval_at(Instant::now() + interval, interval);
        republish.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let connected = *self.state.borrow() == BrokerState::Connected;
            let timer_armed = connected && self.settings.discovery_enabled;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                event = self.events.poll() => match event {
                    Ok(BrokerEvent::Connected) => {
                        info!("Connected to broker");
                        self.set_state(BrokerState::Connected);
                        republish.reset();
                        self.publish_discovery("connect");
                    }
                    Ok(BrokerEvent::Acknowledged(pkid)) => debug!(pkid, "Broker acknowledged publish"),
                    Ok(BrokerEvent::Disconnected) => {
                        warn!("Broker closed the session");
                        self.set_state(BrokerState::Connecting);
                    }
                    Ok(BrokerEvent::Other) => {}
                    Err(e) => {
                        warn!(error = %e, delay = ?self.settings.reconnect_delay, "Broker connection lost, reconnecting");
                        self.set_state(BrokerState::Connecting);
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                        }
                    }
                },

                _ = republish.tick(), if timer_armed => self.publish_discovery("timer"),
            }
        }

        self.shutdown().await;
    }

    fn set_state(&self, next: BrokerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = ?*current, to = ?next, "Broker state transition");
            *current = next;
            true
        });
    }

    /// Enqueues every discovery message, retained. Failures are logged per topic.
    fn publish_discovery(&self, trigger: &str) {
        if !self.settings.discovery_enabled {
            return;
        }

        let messages = match self.discovery.encode(&self.registry) {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to encode discovery messages");
                return;
            }
        };

        let total = messages.len();
        let mut queued = 0;
        for message in messages {
            match self
                .client
                .try_publish(&message.topic, self.settings.discovery_qos, true, message.payload)
            {
                Ok(()) => queued += 1,
                Err(e) => warn!(topic = %message.topic, error = %e, "Failed to queue discovery message"),
            }
        }
        info!(trigger, queued, total, "Published discovery configuration");
    }

    async fn shutdown(&mut self) {
        self.set_state(BrokerState::ShuttingDown);

        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "Failed to queue broker disconnect");
        }

        // Keep polling so the disconnect packet is actually written.
        let events = &mut self.events;
        let drained = tokio::time::timeout(self.settings.disconnect_grace, async {
            loop {
                match events.poll().await {
                    Ok(BrokerEvent::Disconnected) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(grace = ?self.settings.disconnect_grace, "Broker disconnect did not complete in time");
        }

        self.set_state(BrokerState::Disconnected);
        info!("Broker lifecycle stopped");
    }
}

/// Publishes an empty retained payload to every field's discovery topic,
/// removing the sensors from the consumer. Returns how many were queued.
pub fn clear_discovery<C: BrokerClient>(
    client: &C,
    discovery: &DiscoveryEncoder,
    registry: &SchemaRegistry,
    qos: QoS,
) -> Result<usize, TransportError> {
    let messages = discovery.clear(registry);
    let total = messages.len();
    for message in messages {
        client.try_publish(&message.topic, qos, true, message.payload)?;
    }
    info!(total, "Cleared discovery configuration");
    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoders::{DeviceInfo, DiscoveryConfig};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Published {
        pub topic: String,
        pub qos: QoS,
        pub retain: bool,
        pub payload: Vec<u8>,
    }

    /// Records every packet it is asked to send.
    #[derive(Clone, Default)]
    pub(crate) struct FakeClient {
        pub published: Arc<Mutex<Vec<Published>>>,
        pub disconnects: Arc<Mutex<usize>>,
        pub fail_publish: bool,
    }

    impl FakeClient {
        pub fn published(&self) -> Vec<Published> {
            self.published.lock().unwrap().clone()
        }
    }

    impl BrokerClient for FakeClient {
        fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), TransportError> {
            if self.fail_publish {
                return Err(TransportError::Request("queue full".into()));
            }
            self.published.lock().unwrap().push(Published {
                topic: topic.to_string(),
                qos,
                retain,
                payload,
            });
            Ok(())
        }

        fn try_disconnect(&self) -> Result<(), TransportError> {
            *self.disconnects.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Replays events pushed by the test; pends forever when there are none.
    struct FakeEvents {
        rx: mpsc::UnboundedReceiver<Result<BrokerEvent, TransportError>>,
    }

    impl BrokerEvents for FakeEvents {
        async fn poll(&mut self) -> Result<BrokerEvent, TransportError> {
            match self.rx.recv().await {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }
    }

    fn encoder() -> DiscoveryEncoder {
        DiscoveryEncoder::new(DiscoveryConfig {
            discovery_prefix: "homeassistant".into(),
            device_prefix: "ws_".into(),
            state_topic: "ws/state".into(),
            device: DeviceInfo {
                identifiers: vec!["ws".into()],
                manufacturer: "Test".into(),
                model: "Fake".into(),
                name: "Fake station".into(),
            },
        })
    }

    fn discovery_count() -> usize {
        let registry = SchemaRegistry::station().unwrap();
        encoder().encode(&registry).unwrap().len()
    }

    fn start(
        client: FakeClient,
        settings: BrokerSettings,
    ) -> (BrokerHandle, mpsc::UnboundedSender<Result<BrokerEvent, TransportError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = BrokerManager::new(
            client,
            FakeEvents { rx },
            encoder(),
            Arc::new(SchemaRegistry::station().unwrap()),
            settings,
            CancellationToken::new(),
        );
        (manager.spawn(), tx)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_qos_from_level() {
        assert_eq!(QoS::try_from(0), Ok(QoS::AtMostOnce));
        assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
        assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
        assert_eq!(QoS::try_from(3), Err(QosError(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_published_retained_on_connect() {
        let client = FakeClient::default();
        let (handle, events) = start(client.clone(), BrokerSettings::default());
        settle().await;
        assert_eq!(handle.state(), BrokerState::Connecting);
        assert!(client.published().is_empty());

        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;

        assert_eq!(handle.state(), BrokerState::Connected);
        let published = client.published();
        assert_eq!(published.len(), discovery_count());
        assert!(published.iter().all(|p| p.retain && p.qos == QoS::AtLeastOnce));
        assert!(published[0].topic.starts_with("homeassistant/sensor/ws_"));

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_republished_periodically() {
        let client = FakeClient::default();
        let (handle, events) = start(client.clone(), BrokerSettings::default());
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        let per_round = discovery_count();
        assert_eq!(client.published().len(), per_round);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(client.published().len(), per_round * 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(client.published().len(), per_round * 3);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timer_publish_while_disconnected() {
        let client = FakeClient::default();
        let (handle, events) = start(client.clone(), BrokerSettings::default());
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        let per_round = discovery_count();

        events.send(Err(TransportError::Connection("reset by peer".into()))).unwrap();
        settle().await;
        assert_eq!(handle.state(), BrokerState::Connecting);

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(client.published().len(), per_round);

        // Reconnect triggers a fresh round.
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        assert_eq!(handle.state(), BrokerState::Connected);
        assert_eq!(client.published().len(), per_round * 2);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_disabled_keeps_connection() {
        let client = FakeClient::default();
        let settings = BrokerSettings {
            discovery_enabled: false,
            ..BrokerSettings::default()
        };
        let (handle, events) = start(client.clone(), settings);
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_secs(90)).await;
        settle().await;

        assert_eq!(handle.state(), BrokerState::Connected);
        assert!(client.published().is_empty());

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disconnects_and_stops_timer() {
        let client = FakeClient::default();
        let (handle, events) = start(client.clone(), BrokerSettings::default());
        let mut states = handle.subscribe();
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        let published = client.published().len();

        handle.shutdown();
        events.send(Ok(BrokerEvent::Disconnected)).unwrap();
        states.wait_for(|s| *s == BrokerState::Disconnected).await.unwrap();
        handle.join().await;

        assert_eq!(*client.disconnects.lock().unwrap(), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(client.published().len(), published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_bounded_by_grace_period() {
        let client = FakeClient::default();
        let (handle, _events) = start(client.clone(), BrokerSettings::default());
        settle().await;

        let started = Instant::now();
        handle.shutdown();
        handle.join().await;

        assert!(started.elapsed() <= Duration::from_secs(3));
        assert_eq!(*client.disconnects.lock().unwrap(), 1);
    }

    #[test]
    fn test_clear_discovery_sends_empty_retained_payloads() {
        let client = FakeClient::default();
        let registry = SchemaRegistry::station().unwrap();
        let cleared = clear_discovery(&client, &encoder(), &registry, QoS::AtLeastOnce).unwrap();

        let published = client.published();
        assert_eq!(cleared, registry.fields().len());
        assert_eq!(published.len(), cleared);
        assert!(published.iter().all(|p| p.retain && p.payload.is_empty()));
        assert_eq!(published[0].topic, "homeassistant/sensor/ws_station_id/config");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_enqueue_does_not_stop_lifecycle() {
        let client = FakeClient {
            fail_publish: true,
            ..FakeClient::default()
        };
        let (handle, events) = start(client.clone(), BrokerSettings::default());
        events.send(Ok(BrokerEvent::Connected)).unwrap();
        settle().await;
        assert_eq!(handle.state(), BrokerState::Connected);

        handle.shutdown();
        handle.join().await;
    }
}
