//! The shadow synchronizer.
//!
//! One `Shadow` exists per (thing name, client-token prefix) pair and
//! owns one channel reference. Outbound requests carry a fresh client
//! token; inbound accepted/rejected responses must echo the pending
//! token before they are treated as genuine. Delta pushes carry no
//! token and are applied unconditionally (modulo version staleness).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, RwLock};

use tether_mqtt::{Channel, MessageHandler, QoS, Subscription};
use tether_protocol::document::{DeltaDocument, ShadowDocument, object_is_empty};
use tether_protocol::token::ClientTokenFactory;
use tether_protocol::topics;
use tether_protocol::{ShadowRequestKind, ShadowResponseKind};

use crate::documents::DocumentStore;
use crate::error::ShadowResult;
use crate::handler::ResponseHandler;

struct PendingRequest {
    token: String,
    issued_at: Instant,
}

struct ShadowInner {
    channel: Arc<dyn Channel>,
    thing_name: String,
    command_timeout: Duration,
    tokens: ClientTokenFactory,
    store: RwLock<DocumentStore>,
    handlers: RwLock<HashMap<ShadowRequestKind, Arc<dyn ResponseHandler>>>,
    subscribed: Mutex<HashSet<ShadowRequestKind>>,
    pending: Mutex<HashMap<ShadowRequestKind, PendingRequest>>,
}

/// Device shadow bound to one channel, thing name, and client-token
/// prefix. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Shadow {
    inner: Arc<ShadowInner>,
}

impl Shadow {
    pub fn new(
        channel: Arc<dyn Channel>,
        command_timeout: Duration,
        thing_name: impl Into<String>,
        client_token_prefix: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ShadowInner {
                channel,
                thing_name: thing_name.into(),
                command_timeout,
                tokens: ClientTokenFactory::new(client_token_prefix),
                store: RwLock::new(DocumentStore::new()),
                handlers: RwLock::new(HashMap::new()),
                subscribed: Mutex::new(HashSet::new()),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn thing_name(&self) -> &str {
        &self.inner.thing_name
    }

    /// An empty shadow document skeleton, the starting point for
    /// [`update_device_shadow`](Self::update_device_shadow) callers.
    pub fn empty_shadow_document() -> Value {
        json!({"state": {"reported": {}, "desired": {}}})
    }

    // ── Outbound requests ─────────────────────────────────────

    /// Publish a get request carrying a fresh client token. Lazily
    /// subscribes to the get accepted/rejected topics on first use.
    pub async fn perform_get_async(&self) -> ShadowResult<()> {
        self.ensure_subscribed(ShadowRequestKind::Get).await?;
        let token = self.inner.tokens.next_token();
        let payload = serde_json::to_vec(&json!({"clientToken": &token}))?;
        self.send_request(
            ShadowRequestKind::Get,
            token,
            topics::get(&self.inner.thing_name),
            payload,
        )
        .await
    }

    /// Diff the device document against the last known server state and
    /// publish the result as an update request. Lazily subscribes to
    /// the update accepted/rejected topics — not to delta, which is
    /// opt-in via [`add_subscription`](Self::add_subscription).
    pub async fn perform_update_async(&self) -> ShadowResult<()> {
        self.ensure_subscribed(ShadowRequestKind::Update).await?;
        let token = self.inner.tokens.next_token();

        let payload = {
            let store = self.inner.store.read().await;
            let (reported, desired) = store.update_diff();
            let mut state = Map::new();
            if !object_is_empty(&reported) {
                state.insert("reported".into(), reported);
            }
            if !object_is_empty(&desired) {
                state.insert("desired".into(), desired);
            }
            serde_json::to_vec(&json!({"state": state, "clientToken": &token}))?
        };

        self.send_request(
            ShadowRequestKind::Update,
            token,
            topics::update(&self.inner.thing_name),
            payload,
        )
        .await
    }

    /// Publish a delete request carrying a fresh client token. Lazily
    /// subscribes to the delete accepted/rejected topics.
    pub async fn perform_delete_async(&self) -> ShadowResult<()> {
        self.ensure_subscribed(ShadowRequestKind::Delete).await?;
        let token = self.inner.tokens.next_token();
        let payload = serde_json::to_vec(&json!({"clientToken": &token}))?;
        self.send_request(
            ShadowRequestKind::Delete,
            token,
            topics::delete(&self.inner.thing_name),
            payload,
        )
        .await
    }

    async fn send_request(
        &self,
        kind: ShadowRequestKind,
        token: String,
        topic: String,
        payload: Vec<u8>,
    ) -> ShadowResult<()> {
        self.inner.pending.lock().await.insert(
            kind,
            PendingRequest {
                token,
                issued_at: Instant::now(),
            },
        );
        let published = self
            .inner
            .channel
            .publish(
                &topic,
                false,
                QoS::AtLeastOnce,
                &payload,
                self.inner.command_timeout,
            )
            .await;
        if let Err(e) = published {
            self.inner.pending.lock().await.remove(&kind);
            return Err(e.into());
        }
        tracing::debug!(thing = %self.inner.thing_name, request = %kind, "shadow request published");
        Ok(())
    }

    // ── Registration ──────────────────────────────────────────

    /// Register application callbacks per request kind.
    ///
    /// Does not create MQTT subscriptions for get/update/delete — those
    /// happen lazily on the first corresponding request. Delta is
    /// subscribed immediately since there is no outbound delta request.
    pub async fn add_subscription(
        &self,
        mapping: HashMap<ShadowRequestKind, Arc<dyn ResponseHandler>>,
    ) -> ShadowResult<()> {
        let wants_delta = mapping.contains_key(&ShadowRequestKind::Delta);
        {
            let mut handlers = self.inner.handlers.write().await;
            handlers.extend(mapping);
        }
        if wants_delta {
            self.ensure_subscribed(ShadowRequestKind::Delta).await?;
        }
        Ok(())
    }

    async fn ensure_subscribed(&self, kind: ShadowRequestKind) -> ShadowResult<()> {
        let mut subscribed = self.inner.subscribed.lock().await;
        if subscribed.contains(&kind) {
            return Ok(());
        }

        let thing = &self.inner.thing_name;
        let filters = match kind {
            ShadowRequestKind::Get => {
                vec![topics::get_accepted(thing), topics::get_rejected(thing)]
            }
            ShadowRequestKind::Update => {
                vec![topics::update_accepted(thing), topics::update_rejected(thing)]
            }
            ShadowRequestKind::Delete => {
                vec![topics::delete_accepted(thing), topics::delete_rejected(thing)]
            }
            ShadowRequestKind::Delta => vec![topics::update_delta(thing)],
        };

        let router: Arc<dyn MessageHandler> = Arc::new(ShadowRouter {
            shadow: self.clone(),
        });
        let batch = filters
            .into_iter()
            .map(|filter| Subscription::new(filter, QoS::AtLeastOnce, router.clone()))
            .collect();

        self.inner
            .channel
            .subscribe(batch, self.inner.command_timeout)
            .await?;
        subscribed.insert(kind);
        Ok(())
    }

    // ── Device-side state ─────────────────────────────────────

    /// Merge a document into the device shadow, field by field: a key
    /// in both takes the supplied value, a key only in the current
    /// document is kept, a key only in the supplied document is added.
    /// Recursive on nested objects.
    pub async fn update_device_shadow(&self, document: &Value) -> ShadowResult<()> {
        let parsed: ShadowDocument = serde_json::from_value(document.clone())?;
        let mut store = self.inner.store.write().await;
        store.merge_device(&parsed.state.reported, &parsed.state.desired);
        Ok(())
    }

    /// Regenerate the client-token suffix so future tokens cannot
    /// collide with ones from a prior run.
    pub fn reset_client_token_suffix(&self) {
        self.inner.tokens.reset_suffix();
    }

    // ── Snapshots ─────────────────────────────────────────────
    //
    // Point-in-time copies; callers must not assume they stay current.

    pub async fn current_version(&self) -> u64 {
        self.inner.store.read().await.version()
    }

    /// Whether the last comparison between device-desired and
    /// server-reported shows no outstanding delta.
    pub async fn is_in_sync(&self) -> bool {
        self.inner.store.read().await.in_sync()
    }

    pub async fn device_reported(&self) -> Value {
        self.inner.store.read().await.device_reported()
    }

    pub async fn device_desired(&self) -> Value {
        self.inner.store.read().await.device_desired()
    }

    pub async fn device_document(&self) -> Value {
        self.inner.store.read().await.device_document()
    }

    pub async fn server_reported(&self) -> Value {
        self.inner.store.read().await.server_reported()
    }

    pub async fn server_desired(&self) -> Value {
        self.inner.store.read().await.server_desired()
    }

    pub async fn server_document(&self) -> Value {
        self.inner.store.read().await.server_document()
    }

    // ── Inbound response handling ─────────────────────────────

    /// Handle a response for a get request.
    pub async fn handle_get_response(
        &self,
        response: ShadowResponseKind,
        payload: &Value,
    ) -> ShadowResult<()> {
        match response {
            ShadowResponseKind::Accepted => {
                if !self.consume_pending(ShadowRequestKind::Get, payload).await {
                    return Ok(());
                }
                let document: ShadowDocument = serde_json::from_value(payload.clone())?;
                let applied = self.inner.store.write().await.apply_get_accepted(&document);
                if !applied {
                    tracing::warn!(thing = %self.inner.thing_name, "discarding stale get response");
                    return Ok(());
                }
                self.notify(ShadowRequestKind::Get, response, payload).await;
            }
            ShadowResponseKind::Rejected => {
                if !self.consume_pending(ShadowRequestKind::Get, payload).await {
                    return Ok(());
                }
                self.notify(ShadowRequestKind::Get, response, payload).await;
            }
            ShadowResponseKind::Delta => {
                tracing::debug!("ignoring delta response kind on get request");
            }
        }
        Ok(())
    }

    /// Handle a response for an update request.
    pub async fn handle_update_response(
        &self,
        response: ShadowResponseKind,
        payload: &Value,
    ) -> ShadowResult<()> {
        match response {
            ShadowResponseKind::Accepted => {
                if !self
                    .consume_pending(ShadowRequestKind::Update, payload)
                    .await
                {
                    return Ok(());
                }
                let document: ShadowDocument = serde_json::from_value(payload.clone())?;
                let applied = self
                    .inner
                    .store
                    .write()
                    .await
                    .apply_update_accepted(&document);
                if !applied {
                    tracing::warn!(
                        thing = %self.inner.thing_name,
                        "discarding stale update response"
                    );
                    return Ok(());
                }
                self.notify(ShadowRequestKind::Update, response, payload)
                    .await;
            }
            ShadowResponseKind::Rejected => {
                if !self
                    .consume_pending(ShadowRequestKind::Update, payload)
                    .await
                {
                    return Ok(());
                }
                self.notify(ShadowRequestKind::Update, response, payload)
                    .await;
            }
            ShadowResponseKind::Delta => return self.handle_delta(payload).await,
        }
        Ok(())
    }

    /// Handle a response for a delete request.
    pub async fn handle_delete_response(
        &self,
        response: ShadowResponseKind,
        payload: &Value,
    ) -> ShadowResult<()> {
        match response {
            ShadowResponseKind::Accepted => {
                if !self
                    .consume_pending(ShadowRequestKind::Delete, payload)
                    .await
                {
                    return Ok(());
                }
                self.inner.store.write().await.apply_delete_accepted();
                self.notify(ShadowRequestKind::Delete, response, payload)
                    .await;
            }
            ShadowResponseKind::Rejected => {
                if !self
                    .consume_pending(ShadowRequestKind::Delete, payload)
                    .await
                {
                    return Ok(());
                }
                self.notify(ShadowRequestKind::Delete, response, payload)
                    .await;
            }
            ShadowResponseKind::Delta => {
                tracing::debug!("ignoring delta response kind on delete request");
            }
        }
        Ok(())
    }

    /// Handle a delta push. Deltas carry no client token.
    pub async fn handle_delta(&self, payload: &Value) -> ShadowResult<()> {
        let delta: DeltaDocument = serde_json::from_value(payload.clone())?;
        let applied = self.inner.store.write().await.apply_delta(&delta);
        if !applied {
            tracing::warn!(thing = %self.inner.thing_name, "discarding stale delta");
            return Ok(());
        }
        self.notify(ShadowRequestKind::Delta, ShadowResponseKind::Delta, payload)
            .await;
        Ok(())
    }

    /// Match a response payload's client token against the pending
    /// request of the given kind, consuming the pending entry on a
    /// match. Stray or late responses leave state untouched.
    async fn consume_pending(&self, kind: ShadowRequestKind, payload: &Value) -> bool {
        let token = payload.get("clientToken").and_then(Value::as_str);
        let mut pending = self.inner.pending.lock().await;
        match pending.get(&kind) {
            None => {
                tracing::debug!(request = %kind, "response with no pending request, ignoring");
                false
            }
            Some(request) if request.issued_at.elapsed() > self.inner.command_timeout => {
                tracing::warn!(request = %kind, "pending request expired, dropping late response");
                pending.remove(&kind);
                false
            }
            Some(request) if token == Some(request.token.as_str()) => {
                pending.remove(&kind);
                true
            }
            Some(_) => {
                tracing::debug!(
                    request = %kind,
                    token = ?token,
                    "client token mismatch, ignoring stray response"
                );
                false
            }
        }
    }

    async fn notify(
        &self,
        request: ShadowRequestKind,
        response: ShadowResponseKind,
        payload: &Value,
    ) {
        let handler = self.inner.handlers.read().await.get(&request).cloned();
        if let Some(handler) = handler {
            handler
                .on_response(&self.inner.thing_name, request, response, payload)
                .await;
        }
    }
}

/// Message handler registered on the shadow topics; routes each inbound
/// publish to the matching response path.
struct ShadowRouter {
    shadow: Shadow,
}

#[async_trait]
impl MessageHandler for ShadowRouter {
    async fn on_message(&self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        let Some(parsed) = topics::parse_shadow_topic(topic) else {
            tracing::debug!(topic = %topic, "not a shadow response topic, ignoring");
            return Ok(());
        };
        if parsed.thing_name != self.shadow.inner.thing_name {
            return Ok(());
        }

        let value: Value =
            serde_json::from_slice(payload).map_err(crate::error::ShadowError::MalformedPayload)?;

        match parsed.request {
            ShadowRequestKind::Get => {
                self.shadow
                    .handle_get_response(parsed.response, &value)
                    .await?
            }
            ShadowRequestKind::Update => {
                self.shadow
                    .handle_update_response(parsed.response, &value)
                    .await?
            }
            ShadowRequestKind::Delete => {
                self.shadow
                    .handle_delete_response(parsed.response, &value)
                    .await?
            }
            ShadowRequestKind::Delta => self.shadow.handle_delta(&value).await?,
        }
        Ok(())
    }
}
