//! TLS configuration and certificate loading.
//!
//! One certificate chain serves every hostname. The handshake is limited to
//! TLS 1.2 and 1.3 with forward-secret AEAD suites, and key exchange prefers
//! X25519 over P-256.

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::ring::{cipher_suite, default_provider, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{ServerConfig, SupportedCipherSuite};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Startup failure while loading, generating, or installing the TLS identity.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("certificate and private key do not match")]
    KeyMismatch,
    #[error("failed to generate certificate: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Read from existing files.
    Loaded,
    /// Freshly generated and persisted by this process.
    Generated,
}

/// Leaf chain and key served to every client.
#[derive(Debug)]
pub struct TlsIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    ca: Option<CertificateDer<'static>>,
    origin: IdentityOrigin,
}

impl TlsIdentity {
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// The issuing CA, when the chain carries one.
    pub fn ca(&self) -> Option<&CertificateDer<'static>> {
        self.ca.as_ref()
    }

    pub fn origin(&self) -> IdentityOrigin {
        self.origin
    }

    pub(crate) fn mark_generated(&mut self) {
        self.origin = IdentityOrigin::Generated;
    }

    /// Build the rustls server configuration for this identity.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, CertificateError> {
        let mut config = ServerConfig::builder_with_provider(Arc::new(crypto_provider()))
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
            .with_no_client_auth()
            .with_single_cert(self.chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }

    /// Server configuration in the form `axum-server` accepts.
    pub fn rustls_config(&self) -> Result<RustlsConfig, CertificateError> {
        Ok(RustlsConfig::from_config(self.server_config()?))
    }
}

/// Cipher allow-list: ECDHE or TLS 1.3 key exchange, AEAD only.
pub fn cipher_suites() -> Vec<SupportedCipherSuite> {
    vec![
        cipher_suite::TLS13_AES_128_GCM_SHA256,
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ]
}

/// Crypto provider restricted to the allow-listed suites and curves.
pub fn crypto_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: cipher_suites(),
        kx_groups: vec![kx_group::X25519, kx_group::SECP256R1],
        ..default_provider()
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CertificateError> {
    fs::read(path).map_err(|source| CertificateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a PEM certificate chain and private key, checking that they belong together.
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<TlsIdentity, CertificateError> {
    let cert_pem = read_file(cert_path)?;
    let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CertificateError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if chain.is_empty() {
        return Err(CertificateError::NoCertificates(cert_path.to_path_buf()));
    }

    let key_pem = read_file(key_path)?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|source| CertificateError::Read {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CertificateError::NoPrivateKey(key_path.to_path_buf()))?;

    ensure_keys_match(&chain, &key)?;

    let ca = if chain.len() > 1 { chain.last().cloned() } else { None };
    Ok(TlsIdentity {
        chain,
        key,
        ca,
        origin: IdentityOrigin::Loaded,
    })
}

fn ensure_keys_match(
    chain: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
) -> Result<(), CertificateError> {
    let signing_key = default_provider()
        .key_provider
        .load_private_key(key.clone_key())?;
    match CertifiedKey::new(chain.to_vec(), signing_key).keys_match() {
        Ok(()) => Ok(()),
        Err(rustls::Error::InconsistentKeys(_)) => Err(CertificateError::KeyMismatch),
        Err(err) => Err(err.into()),
    }
}
