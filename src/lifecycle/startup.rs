//! Startup orchestration.
//!
//! Order: certificate first, then the listener. A certificate failure means
//! no socket is ever bound.

use std::net::TcpListener;

use crate::config::ProxyConfig;
use crate::net::certs::{ca_path, provision};
use crate::net::tls::{CertificateError, IdentityOrigin, TlsIdentity};

/// Load or generate the TLS identity, logging where it came from.
pub fn prepare_identity(config: &ProxyConfig) -> Result<TlsIdentity, CertificateError> {
    let identity = provision(&config.tls)?;
    if identity.origin() == IdentityOrigin::Generated {
        let ca = ca_path(&config.tls.cert_path);
        tracing::info!(
            cert = %config.tls.cert_path.display(),
            key = %config.tls.key_path.display(),
            ca = %ca.display(),
            "Self-signed certificate generated"
        );
        eprintln!(
            "Generated a development CA. Trust {} to avoid browser warnings.",
            ca.display()
        );
    }
    Ok(identity)
}

/// Bind the inbound socket.
pub fn bind(config: &ProxyConfig) -> std::io::Result<TcpListener> {
    let addr = config
        .listener
        .socket_addr()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    TcpListener::bind(addr)
}

/// Usage text printed on startup.
pub fn banner(config: &ProxyConfig) -> String {
    let suffix = match config.listener.socket_addr() {
        Ok(addr) if addr.port() != 443 => format!(":{}", addr.port()),
        _ => String::new(),
    };
    format!(
        "porthole {version}\n\
         \n\
         Listening on {listen}. Any https://<port>.localhost{suffix} request is\n\
         forwarded to http://127.0.0.1:<port>.\n\
         \n\
         Examples:\n  \
         https://3000.localhost{suffix}   -> http://127.0.0.1:3000\n  \
         https://8080.localhost{suffix}   -> http://127.0.0.1:8080\n  \
         https://5173.localtest.me{suffix} -> http://127.0.0.1:5173\n",
        version = env!("CARGO_PKG_VERSION"),
        listen = config.listener.bind_address,
    )
}
