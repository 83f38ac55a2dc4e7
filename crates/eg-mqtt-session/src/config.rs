//! Session configuration and front-loaded validation.
//!
//! Brokers reject malformed client IDs with opaque protocol-level reason
//! codes, so every check here runs before the first network round-trip.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use eg_protocol::endpoint;

use crate::error::ValidationError;

/// Longest client ID every MQTT broker is required to accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// MQTT session configuration, loadable from TOML or built in code.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Event Grid namespace name.
    pub namespace: String,
    /// Azure region of the namespace (e.g., "eastus").
    pub region: String,
    /// MQTT client ID; must match the client registered in the namespace.
    pub client_id: String,
    /// Authentication name sent as the MQTT username.
    pub username: String,
    /// How the client proves its identity.
    pub credentials: Credentials,
    /// CA bundle (PEM) to trust instead of the platform roots.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    /// Topic space used by the topic helpers.
    #[serde(default = "default_topic_space")]
    pub topic_space: String,
    /// Override for the derived broker host (private endpoints, local brokers).
    #[serde(default)]
    pub broker_host: Option<String>,
    /// Broker port (default 8883 for TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Enable TLS. When false, connects plaintext (local dev only).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Upper bound on waiting for CONNACK.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for a SUBACK, PUBACK or PUBCOMP.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

/// Credential material; exactly one mode per session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Credentials {
    /// X.509 client certificate presented during the TLS handshake.
    Mtls {
        /// Client certificate chain (PEM).
        cert_path: PathBuf,
        /// Client private key (PEM).
        key_path: PathBuf,
    },
    /// RS256 JWT sent via MQTT v5 enhanced authentication.
    Jwt {
        /// RSA private key (PEM) used to sign the token.
        signing_key_path: PathBuf,
        /// Token lifetime in seconds.
        #[serde(default = "default_token_ttl")]
        token_ttl_secs: u64,
    },
}

impl Credentials {
    pub fn mtls(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Credentials::Mtls {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn jwt(signing_key_path: impl Into<PathBuf>) -> Self {
        Credentials::Jwt {
            signing_key_path: signing_key_path.into(),
            token_ttl_secs: default_token_ttl(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::Mtls { .. } => "mtls",
            Credentials::Jwt { .. } => "jwt",
        }
    }
}

fn default_topic_space() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    endpoint::MQTTS_PORT
}

fn default_use_tls() -> bool {
    true
}

fn default_keepalive() -> u16 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_token_ttl() -> u64 {
    3600
}

impl SessionConfig {
    /// Config with defaults for everything but identity and credentials.
    pub fn new(
        namespace: impl Into<String>,
        region: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            region: region.into(),
            client_id: client_id.into(),
            username: username.into(),
            credentials,
            ca_cert_path: None,
            topic_space: default_topic_space(),
            broker_host: None,
            broker_port: default_port(),
            use_tls: default_use_tls(),
            keepalive_secs: default_keepalive(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }

    /// Load config from a TOML file path.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Host to connect to: the override, or the namespace endpoint.
    pub fn host(&self) -> String {
        self.broker_host
            .clone()
            .unwrap_or_else(|| endpoint::broker_host(&self.namespace, &self.region))
    }

    pub fn broker_url(&self) -> String {
        endpoint::broker_url(&self.host(), self.broker_port, self.use_tls)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Check every invariant that can be checked without the network.
    ///
    /// Order: required fields, client ID length, client ID charset,
    /// credential files, CA file.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("namespace", &self.namespace)?;
        require("region", &self.region)?;
        require("client_id", &self.client_id)?;
        require("username", &self.username)?;
        match &self.credentials {
            Credentials::Mtls {
                cert_path,
                key_path,
            } => {
                require_path("client certificate file", cert_path)?;
                require_path("client private key file", key_path)?;
            }
            Credentials::Jwt {
                signing_key_path, ..
            } => require_path("JWT signing key file", signing_key_path)?,
        }

        validate_client_id(&self.client_id)?;

        match &self.credentials {
            Credentials::Mtls {
                cert_path,
                key_path,
            } => {
                require_file("client certificate", cert_path)?;
                require_file("client key", key_path)?;
            }
            Credentials::Jwt {
                signing_key_path, ..
            } => require_file("JWT signing key", signing_key_path)?,
        }
        if let Some(ca) = &self.ca_cert_path {
            require_file("CA certificate", ca)?;
        }

        if self.namespace.contains(' ') {
            tracing::warn!(namespace = %self.namespace, "namespace contains spaces; broker lookups will likely fail");
        }

        Ok(())
    }
}

/// Check an MQTT client ID: at most [`MAX_CLIENT_ID_LEN`] characters from
/// `[A-Za-z0-9_-]`. Offending characters are reported once each, in the
/// order they first appear.
pub fn validate_client_id(client_id: &str) -> Result<(), ValidationError> {
    let len = client_id.chars().count();
    if len > MAX_CLIENT_ID_LEN {
        return Err(ValidationError::ClientIdTooLong {
            client_id: client_id.to_string(),
            len,
            max: MAX_CLIENT_ID_LEN,
        });
    }

    let mut invalid: Vec<char> = Vec::new();
    for c in client_id.chars() {
        if !is_client_id_char(c) && !invalid.contains(&c) {
            invalid.push(c);
        }
    }
    if !invalid.is_empty() {
        return Err(ValidationError::ClientIdInvalidChars {
            client_id: client_id.to_string(),
            invalid,
        });
    }

    Ok(())
}

fn is_client_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_path(field: &'static str, path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_file(kind: &'static str, path: &Path) -> Result<(), ValidationError> {
    if !path.is_file() {
        return Err(ValidationError::FileNotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
