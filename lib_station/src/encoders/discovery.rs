//! # Discovery Encoder
//!
//! Builds the retained sensor configuration messages that let a broker-based
//! home-automation consumer discover every field of the station. Driven only
//! by the schema registry and static broker configuration, never by a live
//! record, so two runs over the same inputs produce identical bytes.

use serde::Serialize;

use crate::core::registry::SchemaRegistry;

/// The device every sensor is grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

/// Static configuration of the discovery messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Topic root the consumer listens on (`homeassistant`).
    pub discovery_prefix: String,
    /// Prepended to every output key in topics and unique ids.
    pub device_prefix: String,
    /// Topic the JSON state documents are published to.
    pub state_topic: String,
    pub device: DeviceInfo,
}

/// One message to publish, retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Serialize)]
struct SensorConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
    name: &'a str,
    state_topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    value_template: String,
    unique_id: String,
    device: &'a DeviceInfo,
}

#[derive(Debug, Clone)]
pub struct DiscoveryEncoder {
    config: DiscoveryConfig,
}

impl DiscoveryEncoder {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// `{discovery_prefix}/sensor/{device_prefix}{output_key}/config`
    pub fn topic(&self, output_key: &str) -> String {
        format!(
            "{}/sensor/{}{}/config",
            self.config.discovery_prefix, self.config.device_prefix, output_key
        )
    }

    /// One configuration message per field with display or unit metadata,
    /// skipping tag fields, in schema order.
    pub fn encode(&self, registry: &SchemaRegistry) -> Result<Vec<DiscoveryMessage>, serde_json::Error> {
        registry
            .fields()
            .iter()
            .map(|f| &f.schema)
            .filter(|schema| !schema.is_tag && schema.has_discovery_metadata())
            .map(|schema| {
                let unit = schema.unit_metadata.unwrap_or_default();
                let config = SensorConfig {
                    device_class: unit.device_class,
                    name: schema.display_name.unwrap_or(schema.output_key),
                    state_topic: &self.config.state_topic,
                    state_class: unit.state_class,
                    unit_of_measurement: unit.unit,
                    value_template: format!("{{{{ value_json.{} }}}}", schema.output_key),
                    unique_id: format!("{}{}", self.config.device_prefix, schema.output_key),
                    device: &self.config.device,
                };
                Ok(DiscoveryMessage {
                    topic: self.topic(schema.output_key),
                    payload: serde_json::to_vec(&config)?,
                })
            })
            .collect()
    }

    /// Empty retained payloads for every field's topic, which removes the
    /// sensors from the consumer.
    pub fn clear(&self, registry: &SchemaRegistry) -> Vec<DiscoveryMessage> {
        registry
            .fields()
            .iter()
            .map(|f| DiscoveryMessage {
                topic: self.topic(f.schema.output_key),
                payload: Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoder() -> DiscoveryEncoder {
        DiscoveryEncoder::new(DiscoveryConfig {
            discovery_prefix: "homeassistant".into(),
            device_prefix: "weatherstation_".into(),
            state_topic: "homeassistant/sensor/sensorWeatherStation/state".into(),
            device: DeviceInfo {
                identifiers: vec!["weatherstation".into()],
                manufacturer: "Generic".into(),
                model: "Station".into(),
                name: "Weather station".into(),
            },
        })
    }

    #[test]
    fn test_one_message_per_sensor_without_tag() {
        let registry = SchemaRegistry::station().unwrap();
        let messages = encoder().encode(&registry).unwrap();

        assert_eq!(messages.len(), registry.fields().len() - 1);
        assert!(messages.iter().all(|m| !m.topic.contains("station_id")));
        assert_eq!(
            messages[0].topic,
            "homeassistant/sensor/weatherstation_software_type/config"
        );
    }

    #[test]
    fn test_temperature_payload() {
        let registry = SchemaRegistry::station().unwrap();
        let messages = encoder().encode(&registry).unwrap();
        let message = messages
            .iter()
            .find(|m| m.topic == "homeassistant/sensor/weatherstation_outside_temperature_celsius/config")
            .unwrap();

        let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(
            payload,
            json!({
                "device_class": "temperature",
                "name": "Outside temperature",
                "state_topic": "homeassistant/sensor/sensorWeatherStation/state",
                "state_class": "measurement",
                "unit_of_measurement": "°C",
                "value_template": "{{ value_json.outside_temperature_celsius }}",
                "unique_id": "weatherstation_outside_temperature_celsius",
                "device": {
                    "identifiers": ["weatherstation"],
                    "manufacturer": "Generic",
                    "model": "Station",
                    "name": "Weather station"
                }
            })
        );
    }

    #[test]
    fn test_optional_metadata_is_omitted() {
        let registry = SchemaRegistry::station().unwrap();
        let messages = encoder().encode(&registry).unwrap();
        let uv = messages.iter().find(|m| m.topic.contains("uv_index")).unwrap();
        let text = String::from_utf8(uv.payload.clone()).unwrap();
        assert!(!text.contains("device_class"));
        assert!(text.contains(r#""unit_of_measurement":"UV""#));
    }

    #[test]
    fn test_output_is_deterministic() {
        let registry = SchemaRegistry::station().unwrap();
        assert_eq!(encoder().encode(&registry).unwrap(), encoder().encode(&registry).unwrap());
    }

    #[test]
    fn test_clear_covers_every_field() {
        let registry = SchemaRegistry::station().unwrap();
        let cleared = encoder().clear(&registry);
        assert_eq!(cleared.len(), registry.fields().len());
        assert!(cleared.iter().all(|m| m.payload.is_empty()));
    }
}
