use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::broker_manager::{BrokerClient, QoS};
use crate::core::registry::SchemaRegistry;
use crate::encoders::JsonEncoder;
use crate::publishers::{CloseError, PublishError, Publisher};
use crate::record::Record;

/// Publishes the JSON document of every record, retained, to the state topic.
///
/// The packet is only queued on the transport; the broker manager's event loop
/// sends it and logs the acknowledgement. Closing the publisher cancels the
/// lifecycle token, which makes the manager disconnect.
pub struct MqttPublisher<C> {
    registry: Arc<SchemaRegistry>,
    client: C,
    state_topic: String,
    qos: QoS,
    cancel: CancellationToken,
}

impl<C: BrokerClient> MqttPublisher<C> {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        client: C,
        state_topic: impl Into<String>,
        qos: QoS,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            client,
            state_topic: state_topic.into(),
            qos,
            cancel,
        }
    }
}

impl<C: BrokerClient> Publisher for MqttPublisher<C> {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn publish(&self, record: &Record) -> Result<(), PublishError> {
        if self.cancel.is_cancelled() {
            return Err(PublishError::Closed);
        }
        let payload = JsonEncoder::encode_vec(record, &self.registry)?;
        self.client.try_publish(&self.state_topic, self.qos, true, payload)?;
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        self.cancel.cancel();
        Ok(())
    }
}
