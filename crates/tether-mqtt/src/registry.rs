//! Subscription registry — the source of truth for what must be
//! restored after a reconnect.
//!
//! Entries are staged before the network subscribe and rolled back as a
//! batch if the broker or transport refuses, so no partial registration
//! survives a failed subscribe.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use rumqttc::QoS;

use tether_protocol::topics::topic_matches;

use crate::channel::Subscription;
use crate::error::{SessionError, SessionResult};
use crate::handler::MessageHandler;

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.read().contains_key(filter)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Validate a batch against the registry and stage its entries.
    ///
    /// Fails without touching the registry if any filter is already
    /// registered or repeated within the batch.
    pub fn stage(&self, batch: &[Subscription]) -> SessionResult<()> {
        let mut entries = self.write();
        for (index, subscription) in batch.iter().enumerate() {
            let duplicate_in_batch = batch[..index]
                .iter()
                .any(|other| other.filter == subscription.filter);
            if duplicate_in_batch || entries.contains_key(&subscription.filter) {
                return Err(SessionError::DuplicateSubscription(
                    subscription.filter.clone(),
                ));
            }
        }
        for subscription in batch {
            entries.insert(subscription.filter.clone(), subscription.clone());
        }
        Ok(())
    }

    /// Discard staged entries after a failed subscribe.
    pub fn rollback(&self, filters: &[String]) {
        let mut entries = self.write();
        for filter in filters {
            entries.remove(filter);
        }
    }

    /// Remove entries after a successful unsubscribe.
    pub fn remove(&self, filters: &[String]) {
        self.rollback(filters);
    }

    /// Snapshot of `(filter, qos)` pairs for the reconnect re-subscribe
    /// pass.
    pub fn filters(&self) -> Vec<(String, QoS)> {
        self.read()
            .values()
            .map(|s| (s.filter.clone(), s.max_qos))
            .collect()
    }

    /// Handlers whose filter matches the given concrete topic.
    pub fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.read()
            .values()
            .filter(|s| topic_matches(&s.filter, topic))
            .map(|s| s.handler.clone())
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Subscription>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Subscription>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;

    fn subscription(filter: &str) -> Subscription {
        Subscription::new(
            filter,
            QoS::AtLeastOnce,
            Arc::new(FnHandler::new(|_: &str, _: &[u8]| Ok(()))),
        )
    }

    #[test]
    fn stage_registers_all_entries() {
        let registry = SubscriptionRegistry::new();
        registry
            .stage(&[subscription("a/b"), subscription("c/d")])
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a/b"));
        assert!(registry.contains("c/d"));
    }

    #[test]
    fn duplicate_against_registry_rejects_whole_batch() {
        let registry = SubscriptionRegistry::new();
        registry.stage(&[subscription("a/b")]).unwrap();

        let err = registry
            .stage(&[subscription("x/y"), subscription("a/b")])
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateSubscription(f) if f == "a/b"));

        // Nothing from the failed batch may remain.
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("x/y"));
    }

    #[test]
    fn duplicate_within_batch_rejects_whole_batch() {
        let registry = SubscriptionRegistry::new();
        let err = registry
            .stage(&[subscription("a/b"), subscription("a/b")])
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateSubscription(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn rollback_restores_prior_state() {
        let registry = SubscriptionRegistry::new();
        registry.stage(&[subscription("keep/me")]).unwrap();

        let staged = vec![subscription("a/b"), subscription("c/d")];
        registry.stage(&staged).unwrap();
        registry.rollback(&["a/b".to_string(), "c/d".to_string()]);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("keep/me"));
    }

    #[test]
    fn handlers_match_exact_and_wildcard_filters() {
        let registry = SubscriptionRegistry::new();
        registry
            .stage(&[subscription("devices/+/status"), subscription("a/b")])
            .unwrap();

        assert_eq!(registry.handlers_for("devices/t1/status").len(), 1);
        assert_eq!(registry.handlers_for("a/b").len(), 1);
        assert!(registry.handlers_for("devices/t1/other").is_empty());
    }

    #[test]
    fn filters_snapshot_for_resubscribe() {
        let registry = SubscriptionRegistry::new();
        registry
            .stage(&[subscription("a/b"), subscription("c/d")])
            .unwrap();

        let mut filters: Vec<String> = registry.filters().into_iter().map(|(f, _)| f).collect();
        filters.sort();
        assert_eq!(filters, vec!["a/b", "c/d"]);
    }
}
