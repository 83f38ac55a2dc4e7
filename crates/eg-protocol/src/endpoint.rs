//! Broker endpoint and token audience derivation for Event Grid namespaces.
//!
//! Hostname structure:
//! ```text
//! {namespace}.{region}-1.ts.eventgrid.azure.net
//! ```

/// DNS suffix of the Event Grid MQTT broker.
pub const BROKER_DOMAIN: &str = "ts.eventgrid.azure.net";

/// TLS port for MQTT over TLS.
pub const MQTTS_PORT: u16 = 8883;

/// MQTT v5 authentication method for JWT bearer tokens.
pub const JWT_AUTH_METHOD: &str = "OAUTH2-JWT";

/// Broker hostname for a namespace in a region.
pub fn broker_host(namespace: &str, region: &str) -> String {
    format!("{namespace}.{region}-1.{BROKER_DOMAIN}")
}

/// Full broker URL, used for logging and diagnostics. `mqtts://` over TLS,
/// `mqtt://` otherwise.
pub fn broker_url(host: &str, port: u16, tls: bool) -> String {
    let scheme = if tls { "mqtts" } else { "mqtt" };
    format!("{scheme}://{host}:{port}")
}

/// JWT `aud` claim. The broker rejects tokens without the trailing slash.
pub fn jwt_audience(namespace: &str, region: &str) -> String {
    format!("{}/", broker_host(namespace, region))
}
