//! Connection state machine.
//!
//! Transitions are computed by [`next_state`], a pure function, so the
//! event-loop driver and the session's own connect/disconnect requests apply
//! exactly the same rules.

use std::fmt;

/// Lifecycle state of a session's broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Last connection attempt failed. Not terminal: `connect()` may be retried.
    Failed,
}

impl ConnectionState {
    /// Subscribe and publish are only issued in this state.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that can move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Caller issued `connect()`.
    ConnectRequested,
    /// CONNACK with reason code 0.
    ConnAckAccepted,
    /// CONNACK with a non-zero reason code.
    ConnAckRefused,
    /// Network, TLS or protocol failure reported by the event loop.
    TransportError,
    /// No CONNACK before the connect timeout.
    TimedOut,
    /// Broker sent DISCONNECT.
    BrokerClosed,
    /// Caller issued `disconnect()`.
    DisconnectRequested,
}

/// Compute the state that follows `current` when `event` occurs.
///
/// Events that are meaningless in the current state leave it unchanged,
/// e.g. a late transport error after a requested disconnect.
pub fn next_state(current: ConnectionState, event: StateEvent) -> ConnectionState {
    use ConnectionState::*;
    use StateEvent::*;

    match (current, event) {
        (Connected, ConnectRequested) => Connected,
        (_, ConnectRequested) => Connecting,
        (Connecting, ConnAckAccepted) => Connected,
        (Connecting, ConnAckRefused | TransportError | TimedOut) => Failed,
        (Connected, BrokerClosed | TransportError) => Disconnected,
        (_, DisconnectRequested) => Disconnected,
        (state, _) => state,
    }
}
