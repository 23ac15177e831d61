//! TLS configuration and certificate loading.
//!
//! CONNECT cannot be carried over HTTP/2 here, so the listener only ever
//! negotiates `http/1.1` via ALPN.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;

/// The only application protocol offered to clients.
pub const HTTP1_ALPN: &[u8] = b"http/1.1";

/// Errors that can occur while preparing the listener's TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0:?}")]
    CertificateNotFound(PathBuf),

    #[error("Private key file not found: {0:?}")]
    KeyNotFound(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PEM data: {0}")]
    Pem(#[source] std::io::Error),

    #[error("No certificates found in certificate PEM")]
    NoCertificates,

    #[error("No private key found in key PEM")]
    NoPrivateKey,

    #[error("Invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build a rustls server configuration from PEM-encoded certificate chain and key.
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, TlsError> {
    let mut cert_reader = cert_pem;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    let mut key_reader = key_pem;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![HTTP1_ALPN.to_vec()];

    Ok(config)
}

/// Load TLS configuration from certificate and key files.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::CertificateNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    let cert_pem = std::fs::read(cert_path).map_err(|source| TlsError::Read {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let key_pem = std::fs::read(key_path).map_err(|source| TlsError::Read {
        path: key_path.to_path_buf(),
        source,
    })?;

    let config = server_config_from_pem(&cert_pem, &key_pem)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (certified.cert.pem(), certified.key_pair.serialize_pem())
    }

    #[test]
    fn offers_only_http1() {
        let (cert, key) = self_signed();
        let config = server_config_from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn rejects_empty_chain() {
        let (_, key) = self_signed();
        let err = server_config_from_pem(b"", key.as_bytes()).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates));
    }

    #[test]
    fn rejects_missing_key() {
        let (cert, _) = self_signed();
        let err = server_config_from_pem(cert.as_bytes(), cert.as_bytes()).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey));
    }

    #[test]
    fn reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("proxy.crt");
        let key_path = dir.path().join("proxy.key");

        let err = load_tls_config(&cert_path, &key_path).unwrap_err();
        assert!(matches!(err, TlsError::CertificateNotFound(_)));

        let (cert, _) = self_signed();
        std::fs::write(&cert_path, cert).unwrap();
        let err = load_tls_config(&cert_path, &key_path).unwrap_err();
        assert!(matches!(err, TlsError::KeyNotFound(_)));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("proxy.crt");
        let key_path = dir.path().join("proxy.key");
        let (cert, key) = self_signed();
        std::fs::write(&cert_path, cert).unwrap();
        std::fs::write(&key_path, key).unwrap();

        assert!(load_tls_config(&cert_path, &key_path).is_ok());
    }
}
