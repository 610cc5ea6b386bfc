//! MQTT session for device-to-cloud communication.
//!
//! Provides the connection-facing half of Tether:
//! - `MqttSession` — connection lifecycle state machine with automatic
//!   reconnect and bounded exponential backoff
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `SubscriptionRegistry` — topic-filter → handler bookkeeping,
//!   restored wholesale after a reconnect
//! - `MockChannel` for testing without a broker

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod registry;
pub mod session;
pub mod state;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, Subscription};
pub use config::{ConnectOptions, EndpointConfig, ProtocolVersion, WillMessage};
pub use error::{ConnectRefusal, SessionError, SessionResult};
pub use handler::{FnHandler, MessageHandler};
pub use mock::MockChannel;
pub use rumqttc::QoS;
pub use session::MqttSession;
pub use state::SessionState;
