//! Mock channel for testing without a real broker.
//!
//! Records published messages, keeps registered subscription handlers,
//! and can deliver inbound messages to them for end-to-end tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::QoS;

use tether_protocol::topics::topic_matches;

use crate::channel::{Channel, Subscription};
use crate::error::{SessionError, SessionResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock implementation of the `Channel` trait.
///
/// Mirrors the session's duplicate-subscription rejection so lazy
/// subscribe logic can be exercised against it. Thread-safe via `Mutex`
/// (fine for test contexts).
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<Subscription>>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Get all registered subscription filters.
    pub fn subscription_filters(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.filter.clone())
            .collect()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.filter == filter)
    }

    /// Make subsequent publishes fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent subscribes fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// Deliver an inbound message to every handler whose filter matches
    /// the topic. Returns the number of handlers invoked.
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        let handlers: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| topic_matches(&s.filter, topic))
            .map(|s| s.handler.clone())
            .collect();

        for handler in &handlers {
            if let Err(e) = handler.on_message(topic, payload).await {
                tracing::error!(topic = %topic, error = %e, "mock delivery handler failed");
            }
        }
        handlers.len()
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        qos: QoS,
        payload: &[u8],
        _timeout: Duration,
    ) -> SessionResult<()> {
        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(SessionError::PublishFailed("mock publish failure".into()));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, batch: Vec<Subscription>, _timeout: Duration) -> SessionResult<()> {
        if self.fail_subscribe.load(Ordering::Relaxed) {
            return Err(SessionError::SubscribeFailed("mock subscribe failure".into()));
        }
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for subscription in &batch {
            if subscriptions.iter().any(|s| s.filter == subscription.filter) {
                return Err(SessionError::DuplicateSubscription(
                    subscription.filter.clone(),
                ));
            }
        }
        subscriptions.extend(batch);
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String], _timeout: Duration) -> SessionResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|s| !topics.contains(&s.filter));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
