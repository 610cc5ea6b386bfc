//! Endpoint and connect configuration, loadable from TOML.

use rumqttc::QoS;
use serde::Deserialize;

use crate::error::{SessionError, SessionResult};

/// Broker endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Broker hostname (e.g., an IoT endpoint).
    pub broker_host: String,
    /// Broker port (default 8883 for TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Enable TLS (mutual X.509). When false, connects plaintext (local dev).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Path to CA certificate (PEM).
    #[serde(default)]
    pub ca_cert_path: String,
    /// Path to device X.509 certificate (PEM).
    #[serde(default)]
    pub client_cert_path: String,
    /// Path to device private key (PEM).
    #[serde(default)]
    pub client_key_path: String,
}

impl EndpointConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

fn default_port() -> u16 {
    8883
}

fn default_use_tls() -> bool {
    true
}

/// MQTT protocol version. The packet layer speaks 3.1.1 only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    #[serde(rename = "3.1.1")]
    V311,
}

/// A last-will message registered with the broker at connect time.
#[derive(Debug, Clone, Deserialize)]
pub struct WillMessage {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retained: bool,
}

impl WillMessage {
    /// Map the configured QoS level, rejecting anything above 1.
    pub fn qos(&self) -> SessionResult<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            _ => Err(SessionError::UnsupportedQos),
        }
    }
}

/// Per-connect session parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectOptions {
    /// MQTT client identifier (unique per device).
    pub client_id: String,
    /// Discard previous session state on connect.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    #[serde(default)]
    pub protocol: ProtocolVersion,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub will: Option<WillMessage>,
}

impl ConnectOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: default_clean_session(),
            protocol: ProtocolVersion::default(),
            keep_alive_secs: default_keep_alive(),
            username: None,
            password: None,
            will: None,
        }
    }
}

fn default_clean_session() -> bool {
    true
}

fn default_keep_alive() -> u16 {
    30
}
