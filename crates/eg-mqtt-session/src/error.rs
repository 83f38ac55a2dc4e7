//! Session error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::ConnectionState;

/// Configuration problems detected before any network I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(
        "client ID '{client_id}' is {len} characters long; MQTT client IDs must be at most {max} characters"
    )]
    ClientIdTooLong {
        client_id: String,
        len: usize,
        max: usize,
    },

    #[error(
        "client ID '{client_id}' contains invalid characters: {}; only alphanumerics, hyphens and underscores are allowed",
        format_chars(.invalid)
    )]
    ClientIdInvalidChars { client_id: String, invalid: Vec<char> },

    #[error("{kind} file not found: {}", .path.display())]
    FileNotFound { kind: &'static str, path: PathBuf },
}

fn format_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| format!("'{c}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connection refused by broker: {0}")]
    Refused(String),

    #[error("broker did not answer within {0} ms")]
    Timeout(u64),

    #[error("not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("broker rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
