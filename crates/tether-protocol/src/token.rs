//! Client token generation for shadow request/response correlation.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Generates client tokens of the form `{prefix}-{counter}-{suffix}`.
///
/// The counter increments per token; the suffix is regenerated on
/// [`reset_suffix`](Self::reset_suffix) so tokens from a restarted
/// counter never collide with ones issued before the reset.
#[derive(Debug)]
pub struct ClientTokenFactory {
    prefix: String,
    counter: AtomicU64,
    suffix: RwLock<String>,
}

impl ClientTokenFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
            suffix: RwLock::new(fresh_suffix()),
        }
    }

    /// Produce the next token.
    pub fn next_token(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix = self.suffix.read().unwrap_or_else(|e| e.into_inner());
        format!("{}-{}-{}", self.prefix, count, suffix)
    }

    /// Regenerate the token suffix.
    pub fn reset_suffix(&self) {
        let mut suffix = self.suffix.write().unwrap_or_else(|e| e.into_inner());
        *suffix = fresh_suffix();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn fresh_suffix() -> String {
    Uuid::now_v7().simple().to_string()
}
