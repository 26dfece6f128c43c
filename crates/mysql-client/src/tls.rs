//! TLS context construction.
//!
//! One [`TlsContext`] is built per pool and shared by every session the
//! pool creates. TLS streams themselves are single-use; when a session is
//! replaced after a failure, the new session reuses this context.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{
    verify_server_cert_signed_by_trust_anchor, ServerCertVerified, ServerCertVerifier,
};
use rustls::server::ParsedCertificate;
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::{Config, SslMode};
use crate::error::Error;

/// Shared TLS configuration for the sessions of one pool.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Build the TLS context a configuration calls for.
    ///
    /// Returns `None` when the configuration disables TLS entirely.
    pub fn new(config: &Config) -> Result<Option<Self>, Error> {
        let client_config = match config.ssl_mode {
            SslMode::Disabled => return Ok(None),
            SslMode::Preferred | SslMode::Required => ClientConfig::builder()
                .with_safe_defaults()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth(),
            SslMode::VerifyCa => {
                let roots = load_roots(config.ca_bundle.as_deref())?;
                ClientConfig::builder()
                    .with_safe_defaults()
                    .with_custom_certificate_verifier(Arc::new(CaChainVerifier {
                        roots: Arc::new(roots),
                    }))
                    .with_no_client_auth()
            }
            SslMode::VerifyIdentity => {
                let roots = load_roots(config.ca_bundle.as_deref())?;
                ClientConfig::builder()
                    .with_safe_defaults()
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
        };

        Ok(Some(Self {
            connector: TlsConnector::from(Arc::new(client_config)),
        }))
    }

    /// Wrap an established TCP stream in TLS.
    pub async fn upgrade(&self, host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>, Error> {
        let server_name = ServerName::try_from(host)
            .map_err(|_| Error::Config(format!("invalid TLS server name: {host}")))?;
        self.connector
            .connect(server_name, tcp)
            .await
            .map_err(Error::Tls)
    }
}

fn load_roots(ca_bundle: Option<&Path>) -> Result<RootCertStore, Error> {
    let mut roots = RootCertStore::empty();
    match ca_bundle {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                Error::Config(format!("cannot open CA bundle {}: {e}", path.display()))
            })?;
            let certs = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(|e| {
                Error::Config(format!("cannot parse CA bundle {}: {e}", path.display()))
            })?;
            let (added, _skipped) = roots.add_parsable_certificates(&certs);
            if added == 0 {
                return Err(Error::Config(format!(
                    "CA bundle {} contains no usable certificates",
                    path.display()
                )));
            }
        }
        None => {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
    }
    Ok(roots)
}

/// Verifies the chain against the trust roots without checking that the
/// certificate matches the hostname.
struct CaChainVerifier {
    roots: Arc<RootCertStore>,
}

impl ServerCertVerifier for CaChainVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        _server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let parsed = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(&parsed, &self.roots, intermediates, now)?;
        for _ in scts {}
        Ok(ServerCertVerified::assertion())
    }
}

/// Accepts whatever certificate the server presents. Used for the
/// `Preferred` and `Required` modes, which ask for encryption but not
/// authentication, matching standard MySQL client behavior.
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_mode_builds_nothing() {
        let config = Config::new();
        assert!(TlsContext::new(&config).unwrap().is_none());
    }

    #[test]
    fn test_required_mode_builds_without_roots() {
        let config = Config::new().ssl_mode(SslMode::Required);
        assert!(TlsContext::new(&config).unwrap().is_some());
    }

    #[test]
    fn test_verify_identity_uses_bundled_roots() {
        let config = Config::new().ssl_mode(SslMode::VerifyIdentity);
        assert!(TlsContext::new(&config).unwrap().is_some());
    }

    #[test]
    fn test_missing_ca_bundle_is_a_config_error() {
        let config = Config::new()
            .ssl_mode(SslMode::VerifyCa)
            .ca_bundle("/nonexistent/ca.pem");
        assert!(matches!(TlsContext::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_unusable_ca_bundle_is_a_config_error() {
        let path = std::env::temp_dir().join("mysql-client-test-empty-ca.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        let config = Config::new().ssl_mode(SslMode::VerifyCa).ca_bundle(&path);
        let result = TlsContext::new(&config);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
