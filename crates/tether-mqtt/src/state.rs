//! Session lifecycle states and the reconnect backoff schedule.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lifecycle state of an MQTT session.
///
/// `Reconnecting` is entered from `Connected` when the transport drops
/// unexpectedly and auto-reconnect is enabled; every other transition
/// is driven by an explicit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Exponential backoff schedule for reconnect attempts.
///
/// Starts at the configured minimum, doubles after each failed attempt,
/// caps at the configured maximum, and resets to the minimum after a
/// successful reconnect. The bounds are shared atomics so they can be
/// adjusted at runtime while a reconnect loop is in flight.
#[derive(Debug)]
pub struct BackoffSchedule {
    min_secs: Arc<AtomicU64>,
    max_secs: Arc<AtomicU64>,
    current_secs: u64,
}

impl BackoffSchedule {
    pub fn new(min_secs: Arc<AtomicU64>, max_secs: Arc<AtomicU64>) -> Self {
        let current_secs = min_secs.load(Ordering::Relaxed);
        Self {
            min_secs,
            max_secs,
            current_secs,
        }
    }

    /// The delay to apply before the next reconnect attempt. Doubles the
    /// stored value for the attempt after, bounded by the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let min = self.min_secs.load(Ordering::Relaxed).max(1);
        let max = self.max_secs.load(Ordering::Relaxed).max(min);
        let delay = self.current_secs.clamp(min, max);
        self.current_secs = (delay.saturating_mul(2)).min(max);
        Duration::from_secs(delay)
    }

    /// Reset to the configured minimum after a successful reconnect.
    pub fn reset(&mut self) {
        self.current_secs = self.min_secs.load(Ordering::Relaxed);
    }
}
