//! Inbound message handler trait.

use async_trait::async_trait;

/// Handler invoked for each publish received on a subscribed topic.
///
/// A handler error is logged by the dispatch loop and never tears the
/// session down.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, topic: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// Adapter wrapping a plain closure as a [`MessageHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&str, &[u8]) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&str, &[u8]) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_message(&self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        (self.0)(topic, payload)
    }
}
