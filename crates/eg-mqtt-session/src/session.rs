//! The broker session.
//!
//! A [`Session`] owns one rumqttc client. `connect()` spawns a driver task
//! that polls the event loop, applies state transitions, forwards
//! acknowledgements and hands inbound messages to the observer. The caller
//! waits on a one-shot outcome bounded by the connect timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ConnectionError, EventLoop, MqttOptions};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use eg_protocol::{endpoint, topics};

use crate::config::{Credentials, SessionConfig};
use crate::error::{SessionError, SessionResult, ValidationError};
use crate::handler::{self, AckEvent, AckKind, RequestKind, Route};
use crate::jwt;
use crate::observer::{SessionObserver, TracingObserver};
use crate::state::{ConnectionState, StateEvent, next_state};
use crate::tls;

/// Request channel capacity between client handle and event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long `disconnect()` lets the driver flush DISCONNECT before aborting it.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// A live (or recently live) client and its driver.
struct Link {
    client: AsyncClient,
    acks: Mutex<mpsc::UnboundedReceiver<AckEvent>>,
    task: JoinHandle<()>,
}

/// MQTT v5 session with an Event Grid namespace.
pub struct Session {
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    state: Arc<watch::Sender<ConnectionState>>,
    link: Option<Link>,
}

impl Session {
    /// Validate the config and build a disconnected session that reports
    /// through [`TracingObserver`]. No network I/O happens here.
    pub fn new(config: SessionConfig) -> Result<Self, ValidationError> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Like [`Session::new`] with a caller-supplied observer.
    pub fn with_observer(
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;

        tracing::info!(
            namespace = %config.namespace,
            region = %config.region,
            client_id = %config.client_id,
            username = %config.username,
            auth = config.credentials.mode(),
            broker = %config.broker_url(),
            tls = config.use_tls,
            "session configured"
        );

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            config,
            observer,
            state: Arc::new(state),
            link: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn broker_url(&self) -> String {
        self.config.broker_url()
    }

    /// `{topic_space}/{client_id}/messages/events`
    pub fn events_topic(&self) -> String {
        topics::client_events(&self.config.topic_space, &self.config.client_id)
    }

    // ── Connection lifecycle ──────────────────────────────────

    /// Connect and wait for CONNACK. Returns `true` only when the broker
    /// accepted the connection (reason code 0).
    pub async fn connect(&mut self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                self.report("connect", &e);
                false
            }
        }
    }

    /// [`Session::connect`], returning the failure.
    pub async fn try_connect(&mut self) -> SessionResult<()> {
        if self.state().is_connected() {
            tracing::debug!("already connected");
            return Ok(());
        }
        self.teardown();
        self.transition(StateEvent::ConnectRequested);

        tracing::info!(
            broker = %self.broker_url(),
            client_id = %self.config.client_id,
            auth = self.config.credentials.mode(),
            "connecting"
        );

        let options = match self.mqtt_options() {
            Ok(options) => options,
            Err(e) => {
                self.transition(StateEvent::TransportError);
                return Err(e);
            }
        };

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            eventloop,
            self.config.connect_timeout_ms,
            Arc::clone(&self.state),
            Arc::clone(&self.observer),
            outcome_tx,
            ack_tx,
        ));
        self.link = Some(Link {
            client,
            acks: Mutex::new(ack_rx),
            task,
        });

        match tokio::time::timeout(self.config.connect_timeout(), outcome_rx).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(broker = %self.broker_url(), "connected");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.teardown();
                Err(e)
            }
            Ok(Err(_)) => {
                self.teardown();
                self.transition(StateEvent::TransportError);
                Err(SessionError::Connection(
                    "event loop stopped before the broker answered".into(),
                ))
            }
            Err(_) => {
                self.teardown();
                self.transition(StateEvent::TimedOut);
                Err(SessionError::Timeout(self.config.connect_timeout_ms))
            }
        }
    }

    /// Send DISCONNECT and stop the driver. No-op without a link.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            tracing::debug!("disconnect requested with no active link");
            return;
        };

        self.transition(StateEvent::DisconnectRequested);
        if let Err(e) = link.client.disconnect().await {
            tracing::debug!(error = %e, "DISCONNECT not sent; event loop already gone");
        }

        let mut task = link.task;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            tracing::debug!("driver still running after grace period; aborting");
            task.abort();
        }
        tracing::info!("disconnected");
    }

    // ── Subscribe / publish ───────────────────────────────────

    /// Subscribe and wait for a successful SUBACK. Returns `false` without
    /// any I/O when not connected.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> bool {
        match self.try_subscribe(topic, qos).await {
            Ok(()) => true,
            Err(e) => {
                self.report("subscribe", &e);
                false
            }
        }
    }

    pub async fn try_subscribe(&self, topic: &str, qos: QoS) -> SessionResult<()> {
        let link = self.connected_link()?;
        let mut acks = link.acks.lock().await;
        drain_stale(&mut acks);

        link.client
            .subscribe(topic.to_string(), qos)
            .await
            .map_err(|e| SessionError::Subscribe(e.to_string()))?;

        let mut waiter = AckWaiter::new(&mut acks, self.config.ack_timeout_ms);
        let pkid = waiter.sent(RequestKind::Subscribe).await?;
        waiter
            .acked(AckKind::SubAck, pkid)
            .await?
            .map_err(|reason| SessionError::Rejected {
                operation: "subscribe",
                reason,
            })?;

        tracing::info!(topic, ?qos, "subscribed");
        Ok(())
    }

    /// Serialize `envelope` as JSON and publish it. QoS 0 succeeds once the
    /// packet is written, QoS 1 on PUBACK, QoS 2 on PUBCOMP.
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, envelope: &T, qos: QoS) -> bool {
        match self.try_publish(topic, envelope, qos).await {
            Ok(()) => true,
            Err(e) => {
                self.report("publish", &e);
                false
            }
        }
    }

    pub async fn try_publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        envelope: &T,
        qos: QoS,
    ) -> SessionResult<()> {
        self.connected_link()?;
        let payload =
            serde_json::to_vec(envelope).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.try_publish_bytes(topic, payload, qos).await
    }

    /// Publish a pre-encoded payload.
    pub async fn publish_bytes(&self, topic: &str, payload: impl Into<Bytes>, qos: QoS) -> bool {
        match self.try_publish_bytes(topic, payload, qos).await {
            Ok(()) => true,
            Err(e) => {
                self.report("publish", &e);
                false
            }
        }
    }

    pub async fn try_publish_bytes(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> SessionResult<()> {
        let link = self.connected_link()?;
        if !topics::is_publish_topic(topic) {
            return Err(SessionError::Publish(format!(
                "'{topic}' is not a valid publish topic"
            )));
        }
        let payload: Bytes = payload.into();
        let size = payload.len();
        let mut acks = link.acks.lock().await;
        drain_stale(&mut acks);

        link.client
            .publish(topic.to_string(), qos, false, payload)
            .await
            .map_err(|e| SessionError::Publish(e.to_string()))?;

        let mut waiter = AckWaiter::new(&mut acks, self.config.ack_timeout_ms);
        let pkid = waiter.sent(RequestKind::Publish).await?;
        let rejected = |reason: String| SessionError::Rejected {
            operation: "publish",
            reason,
        };
        match qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => waiter.acked(AckKind::PubAck, pkid).await?.map_err(rejected)?,
            QoS::ExactlyOnce => {
                waiter.acked(AckKind::PubRec, pkid).await?.map_err(rejected)?;
                waiter.acked(AckKind::PubComp, pkid).await?.map_err(rejected)?;
            }
        }

        tracing::debug!(topic, ?qos, bytes = size, "published");
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────

    fn connected_link(&self) -> SessionResult<&Link> {
        let state = self.state();
        match &self.link {
            Some(link) if state.is_connected() => Ok(link),
            _ => Err(SessionError::NotConnected { state }),
        }
    }

    fn mqtt_options(&self) -> SessionResult<MqttOptions> {
        let config = &self.config;
        let mut options = MqttOptions::new(&config.client_id, config.host(), config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
        options.set_connection_timeout(connect_timeout_secs(config.connect_timeout_ms));
        options.set_clean_start(true);
        // rumqttc has no username-only setter. An empty password leaves the
        // CONNECT password flag clear.
        options.set_credentials(&config.username, "");
        options.set_transport(tls::build_transport(config)?);

        if let Credentials::Jwt {
            signing_key_path,
            token_ttl_secs,
        } = &config.credentials
        {
            let token = jwt::mint_token(
                &config.namespace,
                &config.region,
                &config.client_id,
                *token_ttl_secs,
                signing_key_path,
            )?;
            options.set_authentication_method(Some(endpoint::JWT_AUTH_METHOD.to_string()));
            options.set_authentication_data(Some(Bytes::from(token)));
        }

        Ok(options)
    }

    fn transition(&self, event: StateEvent) -> ConnectionState {
        apply(&self.state, self.observer.as_ref(), event)
    }

    fn report(&self, operation: &'static str, error: &SessionError) {
        tracing::warn!(operation, state = %self.state(), error = %error, "operation failed");
        self.observer.on_error(error);
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Apply one state event atomically and notify the observer on change.
fn apply(
    state: &watch::Sender<ConnectionState>,
    observer: &dyn SessionObserver,
    event: StateEvent,
) -> ConnectionState {
    let mut change = None;
    state.send_if_modified(|current| {
        let next = next_state(*current, event);
        if next == *current {
            return false;
        }
        change = Some((*current, next));
        *current = next;
        true
    });

    match change {
        Some((from, to)) => {
            tracing::debug!(%from, %to, ?event, "state transition");
            observer.on_state_change(from, to);
            to
        }
        None => *state.borrow(),
    }
}

/// rumqttc bounds TCP, TLS and CONNACK in whole seconds. Rounding up keeps
/// the caller's millisecond deadline the one that fires.
fn connect_timeout_secs(timeout_ms: u64) -> u64 {
    timeout_ms.div_ceil(1000).max(1)
}

fn drain_stale(acks: &mut mpsc::UnboundedReceiver<AckEvent>) {
    while let Ok(stale) = acks.try_recv() {
        tracing::debug!(?stale, "discarding stale acknowledgement");
    }
}

/// Waits for acknowledgement events under one shared deadline.
struct AckWaiter<'a> {
    acks: &'a mut mpsc::UnboundedReceiver<AckEvent>,
    deadline: Instant,
    timeout_ms: u64,
}

impl<'a> AckWaiter<'a> {
    fn new(acks: &'a mut mpsc::UnboundedReceiver<AckEvent>, timeout_ms: u64) -> Self {
        Self {
            acks,
            deadline: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
        }
    }

    async fn next(&mut self) -> SessionResult<AckEvent> {
        match tokio::time::timeout_at(self.deadline, self.acks.recv()).await {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => Err(SessionError::Connection(
                "connection closed while waiting for acknowledgement".into(),
            )),
            Err(_) => Err(SessionError::Timeout(self.timeout_ms)),
        }
    }

    /// Packet id assigned when the request hit the network.
    async fn sent(&mut self, kind: RequestKind) -> SessionResult<u16> {
        loop {
            match self.next().await? {
                AckEvent::Sent { kind: k, pkid } if k == kind => return Ok(pkid),
                other => tracing::debug!(?other, "skipping unrelated acknowledgement"),
            }
        }
    }

    /// Outcome of the broker's `kind` acknowledgement for `pkid`.
    async fn acked(&mut self, kind: AckKind, pkid: u16) -> SessionResult<Result<(), String>> {
        loop {
            match self.next().await? {
                AckEvent::Acked {
                    kind: k,
                    pkid: p,
                    outcome,
                } if k == kind && p == pkid => return Ok(outcome),
                AckEvent::Rejected { kind: k, reason } if k == kind => return Ok(Err(reason)),
                other => tracing::debug!(?other, "skipping unrelated acknowledgement"),
            }
        }
    }
}

/// Event-loop driver. Resolves `outcome` exactly once, on the first CONNACK
/// or error. A rejected acknowledgement goes to the waiting operation and
/// polling continues, which re-establishes the link. Exits on any other
/// error or a broker DISCONNECT.
async fn drive(
    mut eventloop: EventLoop,
    connect_timeout_ms: u64,
    state: Arc<watch::Sender<ConnectionState>>,
    observer: Arc<dyn SessionObserver>,
    outcome: oneshot::Sender<SessionResult<()>>,
    acks: mpsc::UnboundedSender<AckEvent>,
) {
    let mut outcome = Some(outcome);
    let observer = observer.as_ref();

    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(e) => {
                if let Some(ack) = handler::ack_failure(&e) {
                    tracing::warn!(error = %e, "broker rejected request; re-establishing link");
                    let _ = acks.send(ack);
                    continue;
                }
                if *state.borrow() == ConnectionState::Disconnected {
                    tracing::debug!(error = %e, "event loop closed after disconnect");
                    break;
                }
                let (event, err) = match e {
                    ConnectionError::ConnectionRefused(code) => (
                        StateEvent::ConnAckRefused,
                        SessionError::Refused(format!("{code:?}")),
                    ),
                    ConnectionError::Timeout(_) => (
                        StateEvent::TimedOut,
                        SessionError::Timeout(connect_timeout_ms),
                    ),
                    other => (
                        StateEvent::TransportError,
                        SessionError::Connection(other.to_string()),
                    ),
                };
                if outcome.is_some() {
                    apply(&state, observer, event);
                    resolve(&mut outcome, Err(err));
                } else {
                    // Lost while re-establishing after a rejected acknowledgement.
                    apply(&state, observer, StateEvent::TransportError);
                    tracing::error!(error = %err, "connection lost");
                    observer.on_error(&err);
                }
                break;
            }
        };

        match handler::route(&event) {
            Route::ConnAck(Ok(())) => {
                apply(&state, observer, StateEvent::ConnAckAccepted);
                resolve(&mut outcome, Ok(()));
            }
            Route::ConnAck(Err(reason)) => {
                let err = SessionError::Refused(reason);
                if outcome.is_some() {
                    apply(&state, observer, StateEvent::ConnAckRefused);
                    resolve(&mut outcome, Err(err));
                } else {
                    apply(&state, observer, StateEvent::TransportError);
                    observer.on_error(&err);
                }
                break;
            }
            Route::Ack(ack) => {
                // Nobody waiting is fine.
                let _ = acks.send(ack);
            }
            Route::Message(message) => observer.on_message(&message),
            Route::Disconnected(reason) => {
                tracing::warn!(%reason, "broker closed the connection");
                apply(&state, observer, StateEvent::BrokerClosed);
                resolve(
                    &mut outcome,
                    Err(SessionError::Connection(format!(
                        "broker sent DISCONNECT: {reason}"
                    ))),
                );
                break;
            }
            Route::Other => {}
        }
    }
}

fn resolve(
    outcome: &mut Option<oneshot::Sender<SessionResult<()>>>,
    result: SessionResult<()>,
) {
    if let Some(tx) = outcome.take() {
        // Caller may have timed out already.
        let _ = tx.send(result);
    }
}
