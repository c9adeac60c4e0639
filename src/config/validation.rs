//! Configuration validation.
//!
//! Syntactic checks (port range shape, field types) happen in serde; this pass
//! covers the semantic rules and reports every failure, not just the first.

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid listen address {0:?}")]
    ListenAddress(String),
    #[error("certificate and key paths are required unless self-signed mode is enabled")]
    MissingCertificatePaths,
    #[error("{0} timeout must be at least 1 second")]
    Timeout(&'static str),
}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.socket_addr().is_err() {
        errors.push(ValidationError::ListenAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let tls = &config.tls;
    if !tls.self_signed
        && (tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty())
    {
        errors.push(ValidationError::MissingCertificatePaths);
    }

    let t = &config.timeouts;
    for (name, secs) in [
        ("read header", t.read_header_secs),
        ("idle", t.idle_secs),
        ("write", t.write_secs),
        ("dial", t.dial_secs),
        ("shutdown", t.shutdown_secs),
    ] {
        if secs < 1 {
            errors.push(ValidationError::Timeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
