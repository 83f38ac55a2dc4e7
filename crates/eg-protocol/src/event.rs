//! CloudEvents 1.0 envelope for publishes to a client's events topic.
//!
//! Serialized in JSON structured mode, the form Event Grid routes on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CloudEvents spec version stamped on every event built here.
pub const SPEC_VERSION: &str = "1.0";

/// CloudEvents-shaped envelope published over MQTT.
///
/// Field names follow the CloudEvents JSON format. No schema validation is
/// applied beyond serde; `data` is any JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Event identifier, unique per source (UUIDv7 when generated).
    pub id: String,
    /// Producer of the event, e.g. a device or service name.
    pub source: String,
    pub specversion: String,
    /// Event type, e.g. `motion-detected`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Content type of `data`, normally `application/json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl CloudEvent {
    /// Build an event with a fresh id and the current time.
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            source: source.into(),
            specversion: SPEC_VERSION.to_string(),
            event_type: event_type.into(),
            time: Some(Utc::now()),
            datacontenttype: Some("application/json".to_string()),
            data,
        }
    }

    /// Replace the generated id, for producers with their own id scheme.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
