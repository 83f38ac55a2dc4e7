//! Recording observer for tests.
//!
//! Captures every notification so tests can assert on state transitions,
//! delivered messages and reported errors.

use std::sync::Mutex;

use crate::error::SessionError;
use crate::handler::InboundMessage;
use crate::observer::SessionObserver;
use crate::state::ConnectionState;

/// In-memory [`SessionObserver`]. Thread-safe via `Mutex` (fine for tests).
pub struct RecordingObserver {
    transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    messages: Mutex<Vec<InboundMessage>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self {
            transitions: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// All `(from, to)` state changes, oldest first.
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions.lock().unwrap().clone()
    }

    /// The sequence of states entered.
    pub fn states(&self) -> Vec<ConnectionState> {
        self.transitions().into_iter().map(|(_, to)| to).collect()
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Messages received on a specific topic.
    pub fn messages_on(&self, topic: &str) -> Vec<InboundMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Rendered error messages.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.transitions.lock().unwrap().clear();
        self.messages.lock().unwrap().clear();
        self.errors.lock().unwrap().clear();
    }
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_message(&self, message: &InboundMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }

    fn on_error(&self, error: &SessionError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
