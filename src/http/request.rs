//! Request identification and classification.
//!
//! # Responsibilities
//! - Generate unique request IDs (`<unix-nanos>-<counter>`)
//! - Extract the routing host (Host header, or URI authority on HTTP/2)
//! - Classify a request as plain HTTP or a stream upgrade

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Unique identifier for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header value form. IDs are always ASCII digits and a dash.
    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out request IDs. Owned by the server and shared by reference.
///
/// The counter makes IDs unique even when two requests read the same
/// timestamp.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RequestId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        RequestId(format!("{nanos}-{seq}"))
    }
}

/// How a request is carried to its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Ordinary request/response, forwarded through the pool.
    Http,
    /// WebSocket upgrade, tunneled byte-for-byte.
    Upgrade,
}

impl ProtocolKind {
    /// `Upgrade` iff `Connection` lists `upgrade` and `Upgrade` is `websocket`,
    /// both compared case-insensitively.
    pub fn classify(headers: &HeaderMap) -> Self {
        let connection_upgrade = headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

        let websocket = headers
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

        if connection_upgrade && websocket {
            Self::Upgrade
        } else {
            Self::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Upgrade => "upgrade",
        }
    }
}

/// The host a request was addressed to, as sent by the client.
pub fn request_host<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
        .unwrap_or_default()
}
