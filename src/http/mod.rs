//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → server.rs (Axum setup, host routing, protocol dispatch)
//!     → request.rs (request ID, host extraction, classification)
//!     → forward.rs (pooled HTTP/1.1 to the backend)   for ordinary requests
//!     → tunnel.rs (handshake relay + byte splice)      for upgrades
//!     → response.rs (JSON bodies for proxy-made errors)
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod tunnel;

pub use request::{RequestId, RequestIdGenerator, X_REQUEST_ID};
pub use server::{ProxyServer, ServeError};
