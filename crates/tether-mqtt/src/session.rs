//! MQTT session — connection lifecycle, acknowledgment waiting, and the
//! driver task that polls the event loop.
//!
//! The session owns one `rumqttc` client/event-loop pair per connect.
//! A spawned driver task is the single inbound-processing point: it
//! dispatches publishes to registered handlers, surfaces broker
//! acknowledgments to blocked callers, and runs the reconnect loop with
//! bounded exponential backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{Channel, Subscription};
use crate::config::{ConnectOptions, EndpointConfig, ProtocolVersion};
use crate::error::{ConnectRefusal, SessionError, SessionResult};
use crate::registry::SubscriptionRegistry;
use crate::state::{BackoffSchedule, SessionState};
use crate::tls;

/// Default reconnect backoff bounds in seconds.
const DEFAULT_MIN_BACKOFF_SECS: u64 = 1;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 128;

/// Events surfaced from the driver task to callers blocked on an
/// acknowledgment.
#[derive(Debug, Clone)]
enum LinkEvent {
    /// CONNACK received; `None` means accepted.
    ConnAck(Option<ConnectRefusal>),
    /// SUBACK received, one success flag per requested filter.
    SubAck(Vec<bool>),
    UnsubAck,
    PubAck,
    /// Transport dropped with the given error.
    Dropped(String),
    /// Driver task wound down; the session is disconnected.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

/// MQTT session bound to one broker endpoint.
pub struct MqttSession {
    endpoint: EndpointConfig,
    registry: Arc<SubscriptionRegistry>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<LinkEvent>,
    client: tokio::sync::RwLock<Option<AsyncClient>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    /// Serializes acknowledgment-waiting operations so each waiter can
    /// match the next ack of its kind.
    ack_gate: Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    auto_reconnect: Arc<AtomicBool>,
    min_backoff_secs: Arc<AtomicU64>,
    max_backoff_secs: Arc<AtomicU64>,
}

impl MqttSession {
    pub fn new(endpoint: EndpointConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (events, _) = broadcast::channel(64);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            endpoint,
            registry: Arc::new(SubscriptionRegistry::new()),
            state_tx,
            events,
            client: tokio::sync::RwLock::new(None),
            driver: Mutex::new(None),
            ack_gate: Mutex::new(()),
            shutdown_tx,
            auto_reconnect: Arc::new(AtomicBool::new(true)),
            min_backoff_secs: Arc::new(AtomicU64::new(DEFAULT_MIN_BACKOFF_SECS)),
            max_backoff_secs: Arc::new(AtomicU64::new(DEFAULT_MAX_BACKOFF_SECS)),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Establish a session with the broker.
    ///
    /// Returns only after the broker accepts the CONNECT. A broker-level
    /// refusal surfaces as `ConnectionRejected`, distinct from transport
    /// failures, and is never retried by the reconnect loop.
    pub async fn connect(&self, options: ConnectOptions, timeout: Duration) -> SessionResult<()> {
        match self.state() {
            SessionState::Connected => return Ok(()),
            SessionState::Disconnected => {}
            other => return Err(SessionError::Busy(other)),
        }

        let mqtt_options = build_mqtt_options(&self.endpoint, &options)?;
        let _ = self.shutdown_tx.send(false);
        self.state_tx.send_replace(SessionState::Connecting);

        let (client, eventloop) = AsyncClient::new(mqtt_options, 64);
        *self.client.write().await = Some(client.clone());

        let mut events_rx = self.events.subscribe();
        let ctx = DriverCtx {
            registry: self.registry.clone(),
            state_tx: self.state_tx.clone(),
            events: self.events.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            auto_reconnect: self.auto_reconnect.clone(),
            backoff: BackoffSchedule::new(
                self.min_backoff_secs.clone(),
                self.max_backoff_secs.clone(),
            ),
            client,
        };
        *self.driver.lock().await = Some(tokio::spawn(drive(eventloop, ctx)));

        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, events_rx.recv()).await {
                Err(_) => {
                    self.teardown().await;
                    return Err(SessionError::Timeout);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    self.teardown().await;
                    return Err(SessionError::Transport("event stream closed".into()));
                }
                Ok(Ok(LinkEvent::ConnAck(None))) => return Ok(()),
                Ok(Ok(LinkEvent::ConnAck(Some(refusal)))) => {
                    self.teardown().await;
                    return Err(SessionError::ConnectionRejected(refusal));
                }
                Ok(Ok(LinkEvent::Dropped(reason))) => {
                    self.teardown().await;
                    return Err(SessionError::Transport(reason));
                }
                Ok(Ok(LinkEvent::Closed)) => {
                    self.teardown().await;
                    return Err(SessionError::Transport("session closed before CONNACK".into()));
                }
                Ok(Ok(_)) => continue,
            }
        }
    }

    /// Send a graceful disconnect and tear down the transport.
    ///
    /// Cancels any in-flight reconnect attempt and wakes callers blocked
    /// on an acknowledgment. Idempotent if already disconnected.
    pub async fn disconnect(&self, timeout: Duration) -> SessionResult<()> {
        if self.state() == SessionState::Disconnected {
            return Ok(());
        }
        self.state_tx.send_replace(SessionState::Disconnecting);
        let _ = self.shutdown_tx.send(true);

        if let Some(client) = self.client.read().await.clone() {
            let _ = client.disconnect().await;
        }

        let mut state_rx = self.state_tx.subscribe();
        let wound_down = tokio::time::timeout(timeout, async {
            while *state_rx.borrow() != SessionState::Disconnected {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if let Some(handle) = self.driver.lock().await.take() {
            if !wound_down {
                tracing::warn!("driver did not wind down in time, aborting it");
                handle.abort();
                self.state_tx.send_replace(SessionState::Disconnected);
                let _ = self.events.send(LinkEvent::Closed);
            }
        }
        *self.client.write().await = None;
        Ok(())
    }

    // ── Outbound operations ───────────────────────────────────

    /// Publish a payload, waiting for the PUBACK when `qos` is
    /// at-least-once.
    pub async fn publish(
        &self,
        topic: &str,
        retain: bool,
        qos: QoS,
        payload: &[u8],
        timeout: Duration,
    ) -> SessionResult<()> {
        if qos == QoS::ExactlyOnce {
            return Err(SessionError::UnsupportedQos);
        }
        let client = self.connected_client().await?;

        if qos == QoS::AtMostOnce {
            return client
                .publish(topic, qos, retain, payload)
                .await
                .map_err(|e| SessionError::PublishFailed(e.to_string()));
        }

        let _gate = self.ack_gate.lock().await;
        let mut events_rx = self.events.subscribe();
        client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| SessionError::PublishFailed(e.to_string()))?;
        self.await_ack(&mut events_rx, Instant::now() + timeout, AckKind::Publish)
            .await
    }

    /// Subscribe to a batch of topic filters.
    ///
    /// The batch is validated against the registry before any network
    /// call; on any failure afterwards, every entry staged for this
    /// batch is removed again.
    pub async fn subscribe(
        &self,
        batch: Vec<Subscription>,
        timeout: Duration,
    ) -> SessionResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if batch.iter().any(|s| s.max_qos == QoS::ExactlyOnce) {
            return Err(SessionError::UnsupportedQos);
        }
        let client = self.connected_client().await?;

        self.registry.stage(&batch)?;
        let filters: Vec<String> = batch.iter().map(|s| s.filter.clone()).collect();

        let _gate = self.ack_gate.lock().await;
        let mut events_rx = self.events.subscribe();
        let requests: Vec<SubscribeFilter> = batch
            .iter()
            .map(|s| SubscribeFilter::new(s.filter.clone(), s.max_qos))
            .collect();

        if let Err(e) = client.subscribe_many(requests).await {
            self.registry.rollback(&filters);
            return Err(SessionError::SubscribeFailed(e.to_string()));
        }

        match self
            .await_ack(&mut events_rx, Instant::now() + timeout, AckKind::Subscribe)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.registry.rollback(&filters);
                Err(e)
            }
        }
    }

    /// Unsubscribe from topic filters. The registry is updated only if
    /// every unsubscribe is acknowledged.
    pub async fn unsubscribe(&self, topics: &[String], timeout: Duration) -> SessionResult<()> {
        if topics.is_empty() {
            return Ok(());
        }
        let client = self.connected_client().await?;
        let deadline = Instant::now() + timeout;

        let _gate = self.ack_gate.lock().await;
        for topic in topics {
            let mut events_rx = self.events.subscribe();
            client
                .unsubscribe(topic)
                .await
                .map_err(|e| SessionError::UnsubscribeFailed(e.to_string()))?;
            self.await_ack(&mut events_rx, deadline, AckKind::Unsubscribe)
                .await?;
        }
        self.registry.remove(topics);
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::Relaxed);
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect.load(Ordering::Relaxed)
    }

    pub fn min_reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.min_backoff_secs.load(Ordering::Relaxed))
    }

    pub fn set_min_reconnect_backoff(&self, backoff: Duration) {
        self.min_backoff_secs
            .store(backoff.as_secs().max(1), Ordering::Relaxed);
    }

    pub fn max_reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.load(Ordering::Relaxed))
    }

    pub fn set_max_reconnect_backoff(&self, backoff: Duration) {
        self.max_backoff_secs
            .store(backoff.as_secs().max(1), Ordering::Relaxed);
    }

    /// The subscription registry (exposed for inspection in tests).
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // ── Internal helpers ──────────────────────────────────────

    async fn connected_client(&self) -> SessionResult<AsyncClient> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(SessionError::NotConnected(state));
        }
        self.client
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotConnected(SessionState::Disconnected))
    }

    async fn await_ack(
        &self,
        events_rx: &mut broadcast::Receiver<LinkEvent>,
        deadline: Instant,
        kind: AckKind,
    ) -> SessionResult<()> {
        loop {
            match tokio::time::timeout_at(deadline, events_rx.recv()).await {
                Err(_) => return Err(SessionError::Timeout),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(SessionError::NotConnected(SessionState::Disconnected));
                }
                Ok(Ok(LinkEvent::PubAck)) if kind == AckKind::Publish => return Ok(()),
                Ok(Ok(LinkEvent::SubAck(oks))) if kind == AckKind::Subscribe => {
                    if oks.iter().all(|ok| *ok) {
                        return Ok(());
                    }
                    return Err(SessionError::SubscribeFailed(
                        "broker rejected one or more filters".into(),
                    ));
                }
                Ok(Ok(LinkEvent::UnsubAck)) if kind == AckKind::Unsubscribe => return Ok(()),
                Ok(Ok(LinkEvent::Dropped(reason))) => return Err(SessionError::Transport(reason)),
                Ok(Ok(LinkEvent::Closed)) => {
                    return Err(SessionError::NotConnected(SessionState::Disconnected));
                }
                Ok(Ok(_)) => continue,
            }
        }
    }

    async fn teardown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
        }
        *self.client.write().await = None;
        self.state_tx.send_replace(SessionState::Disconnected);
    }
}

#[async_trait]
impl Channel for MqttSession {
    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        qos: QoS,
        payload: &[u8],
        timeout: Duration,
    ) -> SessionResult<()> {
        MqttSession::publish(self, topic, retain, qos, payload, timeout).await
    }

    async fn subscribe(&self, batch: Vec<Subscription>, timeout: Duration) -> SessionResult<()> {
        MqttSession::subscribe(self, batch, timeout).await
    }

    async fn unsubscribe(&self, topics: &[String], timeout: Duration) -> SessionResult<()> {
        MqttSession::unsubscribe(self, topics, timeout).await
    }

    fn is_connected(&self) -> bool {
        MqttSession::is_connected(self)
    }
}

// ── Driver ────────────────────────────────────────────────────

struct DriverCtx {
    registry: Arc<SubscriptionRegistry>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<LinkEvent>,
    shutdown_rx: watch::Receiver<bool>,
    auto_reconnect: Arc<AtomicBool>,
    backoff: BackoffSchedule,
    client: AsyncClient,
}

async fn drive(mut eventloop: EventLoop, mut ctx: DriverCtx) {
    let mut session_established = false;
    loop {
        if *ctx.shutdown_rx.borrow() {
            break;
        }
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    let reconnected = session_established;
                    session_established = true;
                    ctx.backoff.reset();
                    ctx.state_tx.send_replace(SessionState::Connected);
                    let _ = ctx.events.send(LinkEvent::ConnAck(None));
                    if reconnected {
                        tracing::info!("reconnected to broker, restoring subscriptions");
                        restore_subscriptions(&ctx).await;
                    }
                } else {
                    let refusal = refusal_from_code(ack.code);
                    tracing::error!(reason = %refusal, "broker refused connection");
                    let _ = ctx.events.send(LinkEvent::ConnAck(Some(refusal)));
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&ctx, &publish.topic, &publish.payload).await;
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let oks = ack
                    .return_codes
                    .iter()
                    .map(|code| !matches!(code, SubscribeReasonCode::Failure))
                    .collect();
                let _ = ctx.events.send(LinkEvent::SubAck(oks));
            }
            Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                let _ = ctx.events.send(LinkEvent::UnsubAck);
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => {
                let _ = ctx.events.send(LinkEvent::PubAck);
            }
            Ok(_) => {}
            Err(e) => {
                let _ = ctx.events.send(LinkEvent::Dropped(e.to_string()));
                if *ctx.shutdown_rx.borrow()
                    || !session_established
                    || !ctx.auto_reconnect.load(Ordering::Relaxed)
                {
                    tracing::warn!(error = %e, "connection lost, not reconnecting");
                    break;
                }
                ctx.state_tx.send_replace(SessionState::Reconnecting);
                let delay = ctx.backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    delay_secs = delay.as_secs(),
                    "connection lost, retrying"
                );
                let mut shutdown_rx = ctx.shutdown_rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }
    ctx.state_tx.send_replace(SessionState::Disconnected);
    let _ = ctx.events.send(LinkEvent::Closed);
}

/// Re-subscribe every registry entry after a reconnect. The registry is
/// the source of truth for what must be restored; entries survive a
/// transport drop until explicitly unsubscribed.
async fn restore_subscriptions(ctx: &DriverCtx) {
    for (filter, qos) in ctx.registry.filters() {
        if let Err(e) = ctx.client.subscribe(filter.clone(), qos).await {
            tracing::error!(filter = %filter, error = %e, "failed to restore subscription");
        }
    }
}

async fn dispatch(ctx: &DriverCtx, topic: &str, payload: &[u8]) {
    let handlers = ctx.registry.handlers_for(topic);
    if handlers.is_empty() {
        tracing::debug!(topic = %topic, "no handler registered for incoming publish");
        return;
    }
    for handler in handlers {
        if let Err(e) = handler.on_message(topic, payload).await {
            tracing::error!(topic = %topic, error = %e, "message handler failed");
        }
    }
}

fn refusal_from_code(code: ConnectReturnCode) -> ConnectRefusal {
    match code {
        ConnectReturnCode::RefusedProtocolVersion => ConnectRefusal::ProtocolVersion,
        ConnectReturnCode::BadClientId => ConnectRefusal::ClientIdentifier,
        ConnectReturnCode::ServiceUnavailable => ConnectRefusal::ServerUnavailable,
        ConnectReturnCode::BadUserNamePassword => ConnectRefusal::BadCredentials,
        ConnectReturnCode::NotAuthorized => ConnectRefusal::NotAuthorized,
        ConnectReturnCode::Success => ConnectRefusal::ServerUnavailable,
    }
}

fn build_mqtt_options(
    endpoint: &EndpointConfig,
    options: &ConnectOptions,
) -> SessionResult<MqttOptions> {
    // rumqttc's v4 client speaks 3.1.1 only.
    match options.protocol {
        ProtocolVersion::V311 => {}
    }

    let mut mqtt_options = MqttOptions::new(
        &options.client_id,
        &endpoint.broker_host,
        endpoint.broker_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(options.keep_alive_secs.into()));
    mqtt_options.set_clean_session(options.clean_session);

    if endpoint.use_tls {
        let transport = tls::load_tls_transport(endpoint)?;
        mqtt_options.set_transport(transport);
    }

    if let Some(username) = &options.username {
        mqtt_options.set_credentials(username, options.password.as_deref().unwrap_or(""));
    }

    if let Some(will) = &options.will {
        let qos = will.qos()?;
        mqtt_options.set_last_will(LastWill::new(
            &will.topic,
            will.message.clone(),
            qos,
            will.retained,
        ));
    }

    Ok(mqtt_options)
}
