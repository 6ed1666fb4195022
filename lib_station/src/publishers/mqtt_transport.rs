use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use url::Url;

use crate::core::broker_manager::{BrokerClient, BrokerEvent, BrokerEvents, QoS, TransportError};

const DEFAULT_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConnectOptions {
    /// `tcp://host:port` (the `mqtt://` scheme is accepted too).
    pub broker: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Packets that may be queued on the client before `try_publish` fails.
    pub request_capacity: usize,
}

impl MqttConnectOptions {
    /// Host and port from the broker address.
    pub fn endpoint(&self) -> Result<(String, u16), TransportError> {
        let invalid = || TransportError::InvalidAddress(self.broker.clone());
        let url = Url::parse(&self.broker).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(invalid());
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        Ok((host.to_string(), url.port().unwrap_or(DEFAULT_PORT)))
    }
}

#[derive(Clone)]
pub struct RumqttClient(AsyncClient);

pub struct RumqttEvents(EventLoop);

/// Builds the client and its event loop. Nothing touches the network until
/// the event loop is first polled, and it reconnects on the next poll after
/// every error.
pub fn connect(options: &MqttConnectOptions) -> Result<(RumqttClient, RumqttEvents), TransportError> {
    let (host, port) = options.endpoint()?;

    let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);
    mqtt_options.set_keep_alive(options.keep_alive);
    if let Some(username) = &options.username {
        mqtt_options.set_credentials(username.clone(), options.password.clone().unwrap_or_default());
    }

    let (client, eventloop) = AsyncClient::new(mqtt_options, options.request_capacity.max(1));
    Ok((RumqttClient(client), RumqttEvents(eventloop)))
}

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

impl BrokerClient for RumqttClient {
    fn try_publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), TransportError> {
        self.0
            .try_publish(topic, to_rumqttc(qos), retain, payload)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn try_disconnect(&self) -> Result<(), TransportError> {
        self.0
            .try_disconnect()
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

impl BrokerEvents for RumqttEvents {
    async fn poll(&mut self) -> Result<BrokerEvent, TransportError> {
        let event = self
            .0
            .poll()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(match event {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => BrokerEvent::Connected,
            Event::Incoming(Packet::ConnAck(ack)) => {
                return Err(TransportError::Connection(format!("connection refused: {:?}", ack.code)))
            }
            Event::Incoming(Packet::PubAck(ack)) => BrokerEvent::Acknowledged(ack.pkid),
            Event::Incoming(Packet::PubComp(comp)) => BrokerEvent::Acknowledged(comp.pkid),
            Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => BrokerEvent::Disconnected,
            _ => BrokerEvent::Other,
        })
    }
}
