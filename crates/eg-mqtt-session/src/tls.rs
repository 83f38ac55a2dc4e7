//! TLS transport for connections to Event Grid.
//!
//! mTLS presents the client certificate in the handshake. JWT mode only
//! authenticates the server; the token travels in the CONNECT packet.
//! Trust anchors come from `ca_cert_path` when set, otherwise from the
//! platform's native root store.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use rumqttc::{TlsConfiguration, Transport};

use crate::config::{Credentials, SessionConfig};
use crate::error::{SessionError, SessionResult};

/// Build the transport described by the config.
pub fn build_transport(config: &SessionConfig) -> SessionResult<Transport> {
    if !config.use_tls {
        return Ok(plaintext_transport());
    }

    let ca = match &config.ca_cert_path {
        Some(path) => Some(read_pem("CA cert", path)?),
        None => None,
    };

    match &config.credentials {
        Credentials::Mtls {
            cert_path,
            key_path,
        } => {
            let client_cert = read_pem("client cert", cert_path)?;
            let client_key = read_pem("client key", key_path)?;
            match ca {
                Some(ca) => Ok(Transport::tls_with_config(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: Some((client_cert, client_key)),
                })),
                None => native_roots_mtls(&client_cert, &client_key),
            }
        }
        Credentials::Jwt { .. } => match ca {
            Some(ca) => Ok(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            })),
            None => {
                let config = ClientConfig::builder()
                    .with_root_certificates(native_roots()?)
                    .with_no_client_auth();
                Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
                    Arc::new(config),
                )))
            }
        },
    }
}

/// Plain TCP, for local brokers during development and tests.
pub fn plaintext_transport() -> Transport {
    Transport::Tcp
}

fn read_pem(kind: &str, path: &Path) -> SessionResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| SessionError::Tls(format!("failed to read {kind} '{}': {e}", path.display())))
}

fn native_roots_mtls(client_cert: &[u8], client_key: &[u8]) -> SessionResult<Transport> {
    let chain = rustls_pemfile::certs(&mut BufReader::new(client_cert))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SessionError::Tls(format!("invalid client cert PEM: {e}")))?;
    if chain.is_empty() {
        return Err(SessionError::Tls(
            "client cert file contains no certificates".into(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(client_key))
        .map_err(|e| SessionError::Tls(format!("invalid client key PEM: {e}")))?
        .ok_or_else(|| SessionError::Tls("client key file contains no private key".into()))?;

    let config = ClientConfig::builder()
        .with_root_certificates(native_roots()?)
        .with_client_auth_cert(chain, key)
        .map_err(|e| SessionError::Tls(format!("client certificate rejected: {e}")))?;

    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(config),
    )))
}

fn native_roots() -> SessionResult<RootCertStore> {
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| SessionError::Tls(format!("failed to load platform root certificates: {e}")))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    tracing::debug!(added, ignored, "loaded platform root certificates");
    if added == 0 {
        return Err(SessionError::Tls(
            "no usable platform root certificates; set ca_cert_path".into(),
        ));
    }
    Ok(roots)
}
