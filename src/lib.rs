//! HTTPS front door for local development servers.
//!
//! `https://<port>.localhost` is terminated here and forwarded to
//! `http://127.0.0.1:<port>`. Ordinary requests go through a pooled client;
//! WebSocket upgrades are relayed and then spliced byte-for-byte.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
