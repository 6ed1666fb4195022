use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

use lib_station::publishers::{InfluxConnection, MqttConnectOptions, WriterSettings};
use lib_station::{BrokerSettings, DeviceInfo, DiscoveryConfig, QoS};

const DEFAULT_CONFIG_FILE: &str = "server_wsupload.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Weather station upload receiver", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "WSUPLOAD_LISTEN_ADDR", help = "Address the HTTP server listens on.")]
    pub listen_addr: Option<String>,

    #[clap(long, env = "WSUPLOAD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "WSUPLOAD_LOG_DIR", help = "Directory for log files. No file logging when unset.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "WSUPLOAD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "WSUPLOAD_LOG_JSON", help = "Log to stdout as JSON.")]
    pub log_json: Option<bool>,

    #[clap(long, env = "WSUPLOAD_PASSWORD", help = "Password the station sends. Random when unset.")]
    pub station_password: Option<String>,

    #[clap(long, env = "WSUPLOAD_PLAUSIBILITY_CHECK", help = "Drop observations with implausible indoor temperature.")]
    pub plausibility_check: Option<bool>,

    #[clap(long, env = "WSUPLOAD_JSON_DEBUG", help = "Print every observation as JSON.")]
    pub json_debug: Option<bool>,

    #[clap(long, env = "WSUPLOAD_INFLUX_DEBUG", help = "Print every observation as Line Protocol.")]
    pub influx_debug: Option<bool>,

    #[clap(long, env = "INFLUX_ADDR", help = "InfluxDB address. Empty disables InfluxDB.")]
    pub influx_addr: Option<String>,

    #[clap(long, env = "INFLUX_TOKEN", help = "InfluxDB token, or user:password for 1.8.")]
    pub influx_token: Option<String>,

    #[clap(long, env = "INFLUX_ORG", help = "InfluxDB organization.")]
    pub influx_org: Option<String>,

    #[clap(long, env = "INFLUX_BUCKET", help = "InfluxDB bucket.")]
    pub influx_bucket: Option<String>,

    #[clap(long, env = "INFLUX_MEASUREMENT", help = "InfluxDB measurement name.")]
    pub influx_measurement: Option<String>,

    #[clap(long, env = "INFLUX_BATCH_SIZE", help = "Lines per InfluxDB write request.")]
    pub influx_batch_size: Option<usize>,

    #[clap(long, env = "INFLUX_FLUSH_INTERVAL_MS", help = "Maximum delay before pending lines are written.")]
    pub influx_flush_interval_ms: Option<u64>,

    #[clap(long, env = "MQTT_BROKERS", help = "MQTT broker, tcp://host:port. Empty disables MQTT.")]
    pub mqtt_broker: Option<String>,

    #[clap(long, env = "MQTT_CLIENT_ID", help = "MQTT client ID. Generated when unset.")]
    pub mqtt_client_id: Option<String>,

    #[clap(long, env = "MQTT_USERNAME", help = "MQTT username.")]
    pub mqtt_username: Option<String>,

    #[clap(long, env = "MQTT_PASSWORD", help = "MQTT password.")]
    pub mqtt_password: Option<String>,

    #[clap(long, env = "MQTT_TOPIC", help = "Topic the observation JSON is published to.")]
    pub mqtt_state_topic: Option<String>,

    #[clap(long, env = "MQTT_QOS", help = "QoS of observation publishes (0, 1, 2).")]
    pub mqtt_qos: Option<u8>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_ENABLED", help = "Publish Home Assistant discovery messages.")]
    pub discovery_enabled: Option<bool>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DISCOVERY_PREFIX", help = "Home Assistant discovery prefix.")]
    pub discovery_prefix: Option<String>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DEVICE_PREFIX", help = "Prefix of sensor ids and topics.")]
    pub device_prefix: Option<String>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DISCOVERY_QOS", help = "QoS of discovery publishes (0, 1, 2).")]
    pub discovery_qos: Option<u8>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DISCOVERY_INTERVAL", help = "Seconds between discovery republishes.")]
    pub discovery_interval_secs: Option<u64>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DEVICE_NAME", help = "Device name shown in Home Assistant.")]
    pub device_name: Option<String>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DEVICE_MANUFACTURER", help = "Device manufacturer.")]
    pub device_manufacturer: Option<String>,

    #[clap(long, env = "MQTT_HOMEASSISTANT_DEVICE_MODEL", help = "Device model.")]
    pub device_model: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            listen_addr: other.listen_addr.or(self.listen_addr),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_json: other.log_json.or(self.log_json),
            station_password: other.station_password.or(self.station_password),
            plausibility_check: other.plausibility_check.or(self.plausibility_check),
            json_debug: other.json_debug.or(self.json_debug),
            influx_debug: other.influx_debug.or(self.influx_debug),
            influx_addr: other.influx_addr.or(self.influx_addr),
            influx_token: other.influx_token.or(self.influx_token),
            influx_org: other.influx_org.or(self.influx_org),
            influx_bucket: other.influx_bucket.or(self.influx_bucket),
            influx_measurement: other.influx_measurement.or(self.influx_measurement),
            influx_batch_size: other.influx_batch_size.or(self.influx_batch_size),
            influx_flush_interval_ms: other.influx_flush_interval_ms.or(self.influx_flush_interval_ms),
            mqtt_broker: other.mqtt_broker.or(self.mqtt_broker),
            mqtt_client_id: other.mqtt_client_id.or(self.mqtt_client_id),
            mqtt_username: other.mqtt_username.or(self.mqtt_username),
            mqtt_password: other.mqtt_password.or(self.mqtt_password),
            mqtt_state_topic: other.mqtt_state_topic.or(self.mqtt_state_topic),
            mqtt_qos: other.mqtt_qos.or(self.mqtt_qos),
            discovery_enabled: other.discovery_enabled.or(self.discovery_enabled),
            discovery_prefix: other.discovery_prefix.or(self.discovery_prefix),
            device_prefix: other.device_prefix.or(self.device_prefix),
            discovery_qos: other.discovery_qos.or(self.discovery_qos),
            discovery_interval_secs: other.discovery_interval_secs.or(self.discovery_interval_secs),
            device_name: other.device_name.or(self.device_name),
            device_manufacturer: other.device_manufacturer.or(self.device_manufacturer),
            device_model: other.device_model.or(self.device_model),
        }
    }

    pub fn defaults() -> Config {
        Config {
            listen_addr: Some("0.0.0.0:9108".to_string()),
            log_level: Some("info".to_string()),
            log_json: Some(false),
            plausibility_check: Some(true),
            json_debug: Some(false),
            influx_debug: Some(false),
            influx_addr: Some("http://localhost:8086".to_string()),
            influx_token: Some(String::new()),
            influx_org: Some(String::new()),
            influx_bucket: Some("weather".to_string()),
            influx_measurement: Some("weather".to_string()),
            influx_batch_size: Some(5000),
            influx_flush_interval_ms: Some(1000),
            mqtt_broker: Some("tcp://127.0.0.1:1883".to_string()),
            mqtt_state_topic: Some("homeassistant/sensor/sensorWeatherStation/state".to_string()),
            mqtt_qos: Some(0),
            discovery_enabled: Some(true),
            discovery_prefix: Some("homeassistant".to_string()),
            device_prefix: Some("weatherstation_".to_string()),
            discovery_qos: Some(1),
            discovery_interval_secs: Some(30),
            device_name: Some("Weather station".to_string()),
            device_manufacturer: Some("ws-upload".to_string()),
            device_model: Some("Station upload".to_string()),
            ..Default::default()
        }
    }

    /// Reads a JSON config file. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Option<Config>> {
        if !path.exists() {
            return Ok(None);
        }
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str::<Config>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(Some(config))
    }
}

/// Defaults, then the config file, then environment and CLI.
pub fn load_config() -> Result<Config> {
    load_config_with(Config::parse())
}

pub fn load_config_with(cli: Config) -> Result<Config> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = Config::from_file(&config_file_path)? {
        current_config = current_config.merge(file_config);
    }

    Ok(current_config.merge(cli))
}

/// MQTT side of the resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub connect: MqttConnectOptions,
    pub state_topic: String,
    pub qos: QoS,
    pub broker: BrokerSettings,
    pub discovery: DiscoveryConfig,
}

/// Validated settings the server runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
    pub station_password: String,
    pub password_generated: bool,
    pub plausibility_check: bool,
    pub json_debug: bool,
    pub influx_debug: bool,
    pub influx_measurement: String,
    pub influx: Option<InfluxConnection>,
    pub writer: WriterSettings,
    pub mqtt: Option<MqttSettings>,
}

fn qos(level: Option<u8>, name: &str) -> Result<QoS> {
    QoS::try_from(level.unwrap_or(0)).with_context(|| format!("Invalid {name}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Settings {
    pub fn resolve(config: Config) -> Result<Settings> {
        let listen = config.listen_addr.unwrap_or_default();
        let listen_addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid listen address '{listen}'"))?;

        let (station_password, password_generated) = match non_empty(config.station_password) {
            Some(password) => (password, false),
            None => (hex::encode(rand::random::<[u8; 8]>()), true),
        };

        let influx = non_empty(config.influx_addr).map(|addr| InfluxConnection {
            addr,
            token: config.influx_token.unwrap_or_default(),
            org: config.influx_org.unwrap_or_default(),
            bucket: config.influx_bucket.unwrap_or_default(),
        });

        let batch_size = config.influx_batch_size.unwrap_or(5000);
        if batch_size == 0 {
            bail!("influx batch size must be positive");
        }
        let writer = WriterSettings {
            batch_size,
            flush_interval: Duration::from_millis(config.influx_flush_interval_ms.unwrap_or(1000)),
            ..WriterSettings::default()
        };

        let mqtt = match non_empty(config.mqtt_broker) {
            None => None,
            Some(broker) => {
                let device_prefix = config.device_prefix.unwrap_or_default();
                let client_id = non_empty(config.mqtt_client_id)
                    .unwrap_or_else(|| format!("ws-upload-{}", chrono::Utc::now().timestamp()));
                let connect = MqttConnectOptions {
                    broker,
                    client_id,
                    username: non_empty(config.mqtt_username),
                    password: config.mqtt_password,
                    keep_alive: Duration::from_secs(30),
                    request_capacity: 256,
                };
                connect.endpoint()?;
                let state_topic = config.mqtt_state_topic.unwrap_or_default();

                Some(MqttSettings {
                    connect,
                    state_topic: state_topic.clone(),
                    qos: qos(config.mqtt_qos, "MQTT QoS")?,
                    broker: BrokerSettings {
                        discovery_enabled: config.discovery_enabled.unwrap_or(true),
                        discovery_qos: qos(config.discovery_qos, "discovery QoS")?,
                        discovery_interval: Duration::from_secs(config.discovery_interval_secs.unwrap_or(30).max(1)),
                        ..BrokerSettings::default()
                    },
                    discovery: DiscoveryConfig {
                        discovery_prefix: config.discovery_prefix.unwrap_or_default(),
                        device: DeviceInfo {
                            identifiers: vec![device_prefix.trim_end_matches('_').to_string()],
                            manufacturer: config.device_manufacturer.unwrap_or_default(),
                            model: config.device_model.unwrap_or_default(),
                            name: config.device_name.unwrap_or_default(),
                        },
                        device_prefix,
                        state_topic,
                    },
                })
            }
        };

        Ok(Settings {
            listen_addr,
            log_dir: config.log_dir,
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            log_json: config.log_json.unwrap_or(false),
            station_password,
            password_generated,
            plausibility_check: config.plausibility_check.unwrap_or(true),
            json_debug: config.json_debug.unwrap_or(false),
            influx_debug: config.influx_debug.unwrap_or(false),
            influx_measurement: config.influx_measurement.unwrap_or_else(|| "weather".to_string()),
            influx,
            writer,
            mqtt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"listenAddr": "127.0.0.1:8000", "influxBucket": "garden", "mqttQos": 1}}"#).unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            influx_bucket: Some("roof".to_string()),
            ..Default::default()
        };
        let config = load_config_with(cli).unwrap();

        assert_eq!(config.listen_addr.as_deref(), Some("127.0.0.1:8000"));
        assert_eq!(config.influx_bucket.as_deref(), Some("roof"));
        assert_eq!(config.mqtt_qos, Some(1));
        assert_eq!(config.device_prefix.as_deref(), Some("weatherstation_"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Config {
            config_path: Some(dir.path().join("absent.conf")),
            ..Default::default()
        };
        let config = load_config_with(cli).unwrap();
        assert_eq!(
            Config {
                config_path: None,
                ..config
            },
            Config::defaults()
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(load_config_with(cli).is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Settings::resolve(Config::defaults()).unwrap();

        assert_eq!(settings.listen_addr, "0.0.0.0:9108".parse().unwrap());
        assert!(settings.password_generated);
        assert_eq!(settings.station_password.len(), 16);
        assert_eq!(settings.influx.as_ref().unwrap().bucket, "weather");
        assert_eq!(settings.writer.batch_size, 5000);

        let mqtt = settings.mqtt.unwrap();
        assert_eq!(mqtt.qos, QoS::AtMostOnce);
        assert_eq!(mqtt.broker.discovery_qos, QoS::AtLeastOnce);
        assert_eq!(mqtt.broker.discovery_interval, Duration::from_secs(30));
        assert_eq!(mqtt.discovery.device.identifiers, vec!["weatherstation".to_string()]);
        assert_eq!(mqtt.discovery.state_topic, "homeassistant/sensor/sensorWeatherStation/state");
    }

    #[test]
    fn test_empty_addresses_disable_sinks() {
        let config = Config {
            influx_addr: Some(String::new()),
            mqtt_broker: Some(String::new()),
            station_password: Some("hunter2".to_string()),
            ..Config::defaults()
        };
        let settings = Settings::resolve(config).unwrap();
        assert!(settings.influx.is_none());
        assert!(settings.mqtt.is_none());
        assert_eq!(settings.station_password, "hunter2");
        assert!(!settings.password_generated);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_qos = Config {
            mqtt_qos: Some(3),
            ..Config::defaults()
        };
        assert!(Settings::resolve(bad_qos).is_err());

        let bad_broker = Config {
            mqtt_broker: Some("http://broker".to_string()),
            ..Config::defaults()
        };
        assert!(Settings::resolve(bad_broker).is_err());

        let bad_listen = Config {
            listen_addr: Some("nowhere".to_string()),
            ..Config::defaults()
        };
        assert!(Settings::resolve(bad_listen).is_err());
    }
}
