//! Channel trait — the seam between the shadow synchronizer and the
//! MQTT session.
//!
//! Enables mocking in tests without a real broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::QoS;

use crate::error::SessionResult;
use crate::handler::MessageHandler;

/// One entry of a subscribe batch: a topic filter, the maximum QoS to
/// request, and the handler to invoke for matching publishes.
#[derive(Clone)]
pub struct Subscription {
    pub filter: String,
    pub max_qos: QoS,
    pub handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    pub fn new(filter: impl Into<String>, max_qos: QoS, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            filter: filter.into(),
            max_qos,
            handler,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("filter", &self.filter)
            .field("max_qos", &self.max_qos)
            .finish_non_exhaustive()
    }
}

/// Abstraction for MQTT message publishing and subscribing.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a payload to a topic, waiting for the broker
    /// acknowledgment when `qos` is at-least-once.
    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        qos: QoS,
        payload: &[u8],
        timeout: Duration,
    ) -> SessionResult<()>;

    /// Subscribe to a batch of topic filters. The whole batch is
    /// rejected if any filter is already registered, and rolled back if
    /// the broker refuses it.
    async fn subscribe(&self, batch: Vec<Subscription>, timeout: Duration) -> SessionResult<()>;

    /// Unsubscribe from topic filters. Registry entries are removed
    /// only on success.
    async fn unsubscribe(&self, topics: &[String], timeout: Duration) -> SessionResult<()>;

    fn is_connected(&self) -> bool;
}
