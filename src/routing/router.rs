//! Route lookup: Host header → admitted backend port.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Resolution runs before admission; a malformed host never reaches the policy
//! - One port maps to exactly one backend, `127.0.0.1:<port>`

use std::net::{Ipv4Addr, SocketAddr};

use crate::error::ProxyError;
use crate::routing::host::resolve_port;
use crate::security::PortPolicy;

/// An admitted target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub port: u16,
}

impl Route {
    /// Loopback address of the backend.
    pub fn backend_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Resolves hosts and applies the port policy.
#[derive(Debug, Clone)]
pub struct Router {
    policy: PortPolicy,
}

impl Router {
    pub fn new(policy: PortPolicy) -> Self {
        Self { policy }
    }

    /// Resolve `host` and check the resulting port against the policy.
    pub fn route(&self, host: &str) -> Result<Route, ProxyError> {
        let port = resolve_port(host)?;
        if !self.policy.is_allowed(port) {
            return Err(ProxyError::PortDenied(port));
        }
        Ok(Route { port })
    }

    pub fn policy(&self) -> &PortPolicy {
        &self.policy
    }
}
