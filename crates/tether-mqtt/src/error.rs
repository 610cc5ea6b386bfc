//! MQTT session error types.

use std::fmt;

use thiserror::Error;

use crate::state::SessionState;

/// Broker-level reasons a CONNECT can be refused.
///
/// Kept distinct from transport failures: a refusal is not retried by
/// the reconnect loop since credentials and client identity do not
/// self-correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRefusal {
    ProtocolVersion,
    ClientIdentifier,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
}

impl fmt::Display for ConnectRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ProtocolVersion => "unacceptable protocol version",
            Self::ClientIdentifier => "client identifier rejected",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad user name or password",
            Self::NotAuthorized => "not authorized",
        };
        f.write_str(reason)
    }
}

/// Errors that can occur during MQTT session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation timed out")]
    Timeout,

    #[error("connection refused by broker: {0}")]
    ConnectionRejected(ConnectRefusal),

    #[error("already subscribed to topic filter '{0}'")]
    DuplicateSubscription(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("QoS 2 is not supported")]
    UnsupportedQos,

    #[error("session is not connected (state: {0})")]
    NotConnected(SessionState),

    #[error("connect already in progress (state: {0})")]
    Busy(SessionState),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
