//! TLS configuration for mutual-TLS connections to the broker.
//!
//! Loads X.509 device certificate, private key, and CA certificate
//! from PEM files and configures rumqttc's TLS transport.

use rumqttc::Transport;

use crate::config::EndpointConfig;
use crate::error::{SessionError, SessionResult};

/// Build a TLS transport from certificate file paths in the config.
pub fn load_tls_transport(config: &EndpointConfig) -> SessionResult<Transport> {
    let ca = std::fs::read(&config.ca_cert_path).map_err(|e| {
        SessionError::Transport(format!(
            "failed to read CA cert '{}': {e}",
            config.ca_cert_path
        ))
    })?;

    let client_cert = std::fs::read(&config.client_cert_path).map_err(|e| {
        SessionError::Transport(format!(
            "failed to read client cert '{}': {e}",
            config.client_cert_path
        ))
    })?;

    let client_key = std::fs::read(&config.client_key_path).map_err(|e| {
        SessionError::Transport(format!(
            "failed to read client key '{}': {e}",
            config.client_key_path
        ))
    })?;

    Ok(Transport::tls_with_config(
        rumqttc::TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((client_cert, client_key)),
        },
    ))
}
