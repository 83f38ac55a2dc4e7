//! Session observer hooks.
//!
//! The session reports state changes, inbound messages and operation errors
//! through a [`SessionObserver`] instead of printing them. Callbacks run on
//! the event-loop task or the caller's task and must not block.

use crate::error::SessionError;
use crate::handler::InboundMessage;
use crate::state::ConnectionState;

/// Receives session notifications. Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, _from: ConnectionState, _to: ConnectionState) {}

    fn on_message(&self, _message: &InboundMessage) {}

    fn on_error(&self, _error: &SessionError) {}
}

/// Default observer: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        tracing::info!(%from, %to, "connection state changed");
    }

    fn on_message(&self, message: &InboundMessage) {
        match message.json() {
            Some(body) => tracing::info!(
                topic = %message.topic,
                qos = ?message.qos,
                %body,
                "received message"
            ),
            None => tracing::info!(
                topic = %message.topic,
                qos = ?message.qos,
                bytes = message.payload.len(),
                "received non-JSON message"
            ),
        }
    }

    fn on_error(&self, error: &SessionError) {
        tracing::error!(error = %error, "session error");
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
