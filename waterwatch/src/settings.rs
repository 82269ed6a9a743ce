use crate::telemetry::ConversionFactor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse settings file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn default_baud() -> u32 {
    115_200
}
fn default_poll_ms() -> u64 {
    200
}
fn default_sim_ms() -> u64 {
    500
}
fn default_channel_size() -> usize {
    64
}
fn default_history_capacity() -> usize {
    crate::telemetry::DEFAULT_CAPACITY
}
fn default_usage_capacity() -> usize {
    crate::telemetry::DEFAULT_USAGE_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`. None means pick via
    /// CLI or enumeration.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            port: None,
            baud: default_baud(),
        }
    }
}

fn default_broker_host() -> String {
    "broker.emqx.io".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_topic_data() -> String {
    "smartwater/data".to_string()
}
fn default_topic_control() -> String {
    "smartwater/control".to_string()
}
fn default_topic_status() -> String {
    "smartwater/status".to_string()
}
fn default_max_retries() -> usize {
    5
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_keep_alive_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_topic_data")]
    pub topic_data: String,
    #[serde(default = "default_topic_control")]
    pub topic_control: String,
    #[serde(default = "default_topic_status")]
    pub topic_status: String,
    /// Connection attempts before the feed gives up and requires an
    /// operator-initiated reconnect.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        MqttSettings {
            host: default_broker_host(),
            port: default_broker_port(),
            topic_data: default_topic_data(),
            topic_control: default_topic_control(),
            topic_status: default_topic_status(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl MqttSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Tunables for the whole pipeline, loadable from a YAML file. Every
/// field has a working default so a missing file or an empty document
/// is valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub mqtt: MqttSettings,
    /// How often the consumer drains the feed channel.
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,
    /// Simulator emission interval.
    #[serde(default = "default_sim_ms")]
    pub sim_interval_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_usage_capacity")]
    pub usage_capacity: usize,
    #[serde(default)]
    pub conversion_factor: ConversionFactor,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            serial: SerialSettings::default(),
            mqtt: MqttSettings::default(),
            poll_interval_ms: default_poll_ms(),
            sim_interval_ms: default_sim_ms(),
            history_capacity: default_history_capacity(),
            usage_capacity: default_usage_capacity(),
            conversion_factor: ConversionFactor::default(),
            channel_size: default_channel_size(),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Settings, SettingsError> {
        match path {
            Some(p) => Settings::load(p),
            None => Ok(Settings::default()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sim_interval(&self) -> Duration {
        Duration::from_millis(self.sim_interval_ms)
    }
}
