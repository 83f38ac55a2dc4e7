//! MQTT v5 session for Azure Event Grid namespaces.
//!
//! - `SessionConfig` with validation that runs before any network I/O
//! - mTLS (client certificate) or JWT (OAUTH2-JWT enhanced auth) credentials
//! - `Session` with connect/disconnect/subscribe/publish gated on state
//! - `SessionObserver` hooks, with `RecordingObserver` for tests

pub mod config;
pub mod error;
pub mod handler;
pub mod jwt;
pub mod mock;
pub mod observer;
pub mod session;
pub mod state;
pub mod tls;

pub use config::{Credentials, MAX_CLIENT_ID_LEN, SessionConfig, validate_client_id};
pub use error::{SessionError, SessionResult, ValidationError};
pub use handler::InboundMessage;
pub use mock::RecordingObserver;
pub use observer::{NoopObserver, SessionObserver, TracingObserver};
pub use rumqttc::v5::mqttbytes::QoS;
pub use session::Session;
pub use state::ConnectionState;
