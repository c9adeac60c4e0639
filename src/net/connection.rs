//! Client connection capabilities.
//!
//! Whether a request's connection can be taken over for raw byte access
//! depends on the transport it arrived on: HTTP/1.1 connections can, HTTP/2
//! streams can't. The capability is captured once, when a request is
//! dispatched, and the tunnel consumes it.

use axum::http::Request;
use hyper::upgrade::OnUpgrade;

/// The inbound side of a request, typed by what it allows.
#[derive(Debug)]
pub enum ClientConnection {
    /// Request/response only.
    Plain,
    /// Can be handed over as a raw stream once a 101 response is sent.
    Upgradable(OnUpgrade),
}

impl ClientConnection {
    /// Take the takeover capability out of the request, if it has one.
    pub fn from_request<B>(request: &mut Request<B>) -> Self {
        match request.extensions_mut().remove::<OnUpgrade>() {
            Some(on_upgrade) => Self::Upgradable(on_upgrade),
            None => Self::Plain,
        }
    }

    pub fn is_upgradable(&self) -> bool {
        matches!(self, Self::Upgradable(_))
    }
}
