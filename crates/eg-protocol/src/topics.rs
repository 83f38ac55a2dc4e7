//! MQTT topic builders and parsers for Event Grid topic spaces.
//!
//! Topic structure:
//! ```text
//! {topic_space}/{client_id}/messages/events
//! {topic_space}/{client_id}/{category}/{action}
//! ```

// ─── Client topics ───

/// Default telemetry topic for a client.
pub fn client_events(topic_space: &str, client_id: &str) -> String {
    format!("{topic_space}/{client_id}/messages/events")
}

/// Arbitrary two-level topic under a client, e.g. `reservation/update`.
pub fn client_topic(topic_space: &str, client_id: &str, category: &str, action: &str) -> String {
    format!("{topic_space}/{client_id}/{category}/{action}")
}

// ─── Subscription patterns (with MQTT wildcards) ───

/// Subscribe to everything published under one client.
pub fn client_subscribe_all(topic_space: &str, client_id: &str) -> String {
    format!("{topic_space}/{client_id}/#")
}

/// Subscribe to the events topic of every client in a topic space.
pub fn space_events(topic_space: &str) -> String {
    format!("{topic_space}/+/messages/events")
}

// ─── Topic parsing ───

/// Parsed MQTT topic components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub topic_space: String,
    pub client_id: String,
    pub category: String,
    pub action: String,
}

/// Parse a topic string into its components.
/// Returns `None` if the topic doesn't have exactly four non-empty levels.
pub fn parse_topic(topic: &str) -> Option<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    Some(ParsedTopic {
        topic_space: parts[0].to_string(),
        client_id: parts[1].to_string(),
        category: parts[2].to_string(),
        action: parts[3].to_string(),
    })
}

/// Whether a topic may be used for PUBLISH (no wildcards, non-empty).
pub fn is_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_topic() {
        assert_eq!(
            client_events("default", "client1"),
            "default/client1/messages/events"
        );
    }

    #[test]
    fn custom_client_topic() {
        assert_eq!(
            client_topic("tcu", "client1", "reservation", "update"),
            "tcu/client1/reservation/update"
        );
    }

    #[test]
    fn wildcard_subscriptions() {
        assert_eq!(client_subscribe_all("tcu", "client1"), "tcu/client1/#");
        assert_eq!(space_events("tcu"), "tcu/+/messages/events");
    }

    #[test]
    fn parse_events_topic() {
        let parsed = parse_topic("default/client1/messages/events").unwrap();
        assert_eq!(parsed.topic_space, "default");
        assert_eq!(parsed.client_id, "client1");
        assert_eq!(parsed.category, "messages");
        assert_eq!(parsed.action, "events");
    }

    #[test]
    fn parse_invalid_topic() {
        assert!(parse_topic("invalid/topic").is_none());
        assert!(parse_topic("a/b/c/d/e").is_none());
        assert!(parse_topic("a//c/d").is_none());
        assert!(parse_topic("").is_none());
    }

    #[test]
    fn publish_topics_reject_wildcards() {
        assert!(is_publish_topic("tcu/camera/report"));
        assert!(!is_publish_topic("tcu/+/report"));
        assert!(!is_publish_topic("tcu/#"));
        assert!(!is_publish_topic(""));
    }
}
