//! Client-side TLS setup
//!
//! Loads certificates and keys from PEM files and wraps a connected TCP
//! stream in TLS, with SNI set to the broker hostname. Trust anchors come
//! from `ca_file` when configured, otherwise from the bundled web PKI roots.

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::pem::{self, PemObject};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{version, ClientConfig as RustlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{ClientConfig, TlsMode};

/// Error type for TLS configuration
#[derive(Debug)]
pub enum TlsError {
    /// IO error reading files or during the handshake
    Io(std::io::Error),
    /// Certificate parsing error
    CertificateError(String),
    /// Private key error
    PrivateKeyError(String),
    /// TLS configuration error
    ConfigError(String),
    /// Host name not usable for SNI
    InvalidHostname(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "IO error: {}", e),
            TlsError::CertificateError(msg) => write!(f, "Certificate error: {}", msg),
            TlsError::PrivateKeyError(msg) => write!(f, "Private key error: {}", msg),
            TlsError::ConfigError(msg) => write!(f, "TLS config error: {}", msg),
            TlsError::InvalidHostname(host) => write!(f, "Invalid hostname for SNI: {}", host),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<std::io::Error> for TlsError {
    fn from(e: std::io::Error) -> Self {
        TlsError::Io(e)
    }
}

fn pem_error(path: &Path, err: pem::Error) -> TlsError {
    TlsError::CertificateError(format!("{}: {}", path.display(), err))
}

/// Every certificate in a PEM file, in file order
fn read_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut chain = Vec::new();
    for cert in CertificateDer::pem_file_iter(path).map_err(|e| pem_error(path, e))? {
        chain.push(cert.map_err(|e| pem_error(path, e))?);
    }
    if chain.is_empty() {
        return Err(TlsError::CertificateError(format!(
            "{} contains no certificates",
            path.display()
        )));
    }
    Ok(chain)
}

/// The first private key in a PEM file
fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_file(path)
        .map_err(|e| TlsError::PrivateKeyError(format!("{}: {}", path.display(), e)))
}

/// A trust store built from the certificates in a PEM file
fn read_trust_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in read_cert_chain(path)? {
        roots
            .add(cert)
            .map_err(|e| TlsError::CertificateError(format!("{}: {}", path.display(), e)))?;
    }
    Ok(roots)
}

/// Wrap a connected TCP stream in TLS
pub(crate) async fn connect(
    stream: TcpStream,
    host: &str,
    config: &ClientConfig,
) -> Result<TlsStream<TcpStream>, TlsError> {
    let root_store = match &config.ca_file {
        Some(path) => read_trust_roots(path)?,
        None => {
            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            root_store
        }
    };

    let builder = match config.tls {
        TlsMode::Tls12 => RustlsConfig::builder_with_protocol_versions(&[&version::TLS12]),
        TlsMode::Tls13 => RustlsConfig::builder_with_protocol_versions(&[&version::TLS13]),
        _ => RustlsConfig::builder(),
    };
    let builder = builder.with_root_certificates(root_store);

    let tls_config = match (&config.cert_file, &config.key_file) {
        (Some(cert_path), Some(key_path)) => {
            let certs = read_cert_chain(cert_path)?;
            let key = read_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TlsError::ConfigError(format!("Failed to build TLS config: {}", e)))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(TlsError::ConfigError(
                "cert_file and key_file must be set together".to_string(),
            ))
        }
    };

    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| TlsError::InvalidHostname(host.to_string()))?;

    Ok(connector.connect(server_name, stream).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_error_display() {
        let err = TlsError::CertificateError("test error".to_string());
        assert!(err.to_string().contains("Certificate error"));

        let err = TlsError::PrivateKeyError("key error".to_string());
        assert!(err.to_string().contains("Private key error"));

        let err = TlsError::InvalidHostname("[bad]".to_string());
        assert!(err.to_string().contains("SNI"));
    }
}
