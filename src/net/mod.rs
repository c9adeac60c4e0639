//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     certs.rs (load or generate the CA + leaf)
//!     → tls.rs (rustls server config: TLS 1.2+, AEAD suites, X25519/P-256)
//!
//! Per request:
//!     connection.rs (plain or takeover-capable client connection)
//! ```

pub mod certs;
pub mod connection;
pub mod tls;

pub use connection::ClientConnection;
pub use tls::{CertificateError, IdentityOrigin, TlsIdentity};
