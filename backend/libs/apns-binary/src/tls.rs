//! rustls client configuration for the APNs gateways
//!
//! The legacy gateways authenticate the provider with a client certificate.
//! The certificate chain and private key are usually exported into a single
//! PEM file; a separate key file is also accepted.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use crate::config::ApnsConfig;
use crate::error::ConfigError;

/// Build a client configuration from the files named in `config`.
///
/// Every file is read on each call; nothing is cached between channels.
pub fn client_config(config: &ApnsConfig) -> Result<Arc<ClientConfig>, ConfigError> {
    let cert_path = config
        .certificate
        .as_deref()
        .ok_or(ConfigError::MissingCertificate)?;

    let cert_pem = read_file(cert_path)?;
    let certs = parse_certificates(cert_path, &cert_pem)?;
    let key = match config.private_key.as_deref() {
        Some(key_path) => parse_private_key(key_path, &read_file(key_path)?)?,
        None => parse_private_key(cert_path, &cert_pem)?,
    };

    let roots = root_store(config.ca_certificates.as_deref())?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| ConfigError::Tls(format!("client certificate rejected: {e}")))?;

    debug!(certificate = ?cert_path, "APNs TLS client configuration built");
    Ok(Arc::new(tls))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::CertificateUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::CertificateUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(ConfigError::NoCertificate {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn parse_private_key(path: &Path, pem: &[u8]) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ConfigError::CertificateUnreadable {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ConfigError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}

fn root_store(ca_bundle: Option<&Path>) -> Result<RootCertStore, ConfigError> {
    let mut roots = RootCertStore::empty();

    match ca_bundle {
        Some(path) => {
            let pem = read_file(path)?;
            for cert in parse_certificates(path, &pem)? {
                roots
                    .add(cert)
                    .map_err(|e| ConfigError::Tls(format!("bad CA certificate in {path:?}: {e}")))?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs()
                .map_err(|e| ConfigError::Tls(format!("failed to load platform roots: {e}")))?;
            let (added, ignored) = roots.add_parsable_certificates(native);
            debug!(added, ignored, "loaded platform trust roots");
        }
    }

    if roots.is_empty() {
        warn!("APNs trust store is empty; gateway verification will fail");
    }
    Ok(roots)
}
