//! JWT bootstrap credential for OAuth 2.0 JWT authentication.
//!
//! The token is signed RS256 with the client's private key and presented in
//! the CONNECT packet through MQTT v5 enhanced authentication.

use std::path::Path;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use eg_protocol::endpoint;

use crate::error::{SessionError, SessionResult};

/// Claim set expected by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// `{namespace}.{region}-1.ts.eventgrid.azure.net/`
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Issuer and subject are both the client ID.
    pub iss: String,
    pub sub: String,
}

impl JwtClaims {
    pub fn new(
        namespace: &str,
        region: &str,
        client_id: &str,
        ttl_secs: u64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let iat = issued_at.timestamp();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            aud: endpoint::jwt_audience(namespace, region),
            iat,
            exp: iat.saturating_add(ttl),
            iss: client_id.to_string(),
            sub: client_id.to_string(),
        }
    }
}

/// Sign claims with an RSA private key in PEM form.
pub fn sign(claims: &JwtClaims, private_key_pem: &[u8]) -> SessionResult<String> {
    let key = EncodingKey::from_rsa_pem(private_key_pem)
        .map_err(|e| SessionError::Jwt(format!("invalid RSA private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key)
        .map_err(|e| SessionError::Jwt(format!("failed to sign token: {e}")))
}

/// Read the signing key from disk and mint a token valid from now.
pub fn mint_token(
    namespace: &str,
    region: &str,
    client_id: &str,
    ttl_secs: u64,
    signing_key_path: &Path,
) -> SessionResult<String> {
    let pem = std::fs::read(signing_key_path).map_err(|e| {
        SessionError::Jwt(format!(
            "failed to read signing key '{}': {e}",
            signing_key_path.display()
        ))
    })?;
    let claims = JwtClaims::new(namespace, region, client_id, ttl_secs, Utc::now());
    tracing::debug!(aud = %claims.aud, exp = claims.exp, "minting JWT bootstrap token");
    sign(&claims, &pem)
}
