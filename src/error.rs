//! Per-request error taxonomy.
//!
//! Each variant is caught where it happens, logged, and turned into a JSON
//! response. Nothing here ever carries internal paths or backtraces to the
//! client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::http::response::{ErrorResponse, EXAMPLE_URL};
use crate::routing::HostError;

/// How a backend failed to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailure {
    /// Dial or response deadline elapsed.
    Timeout,
    /// Nothing listening on the port.
    Refused,
    /// Anything else: reset, protocol error, closed early.
    Unavailable,
}

impl BackendFailure {
    /// Classify an error by walking its source chain.
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::TimedOut => return Self::Timeout,
                    std::io::ErrorKind::ConnectionRefused => return Self::Refused,
                    _ => {}
                }
            }
            if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                return Self::Timeout;
            }
            if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                if hyper_err.is_timeout() {
                    return Self::Timeout;
                }
            }
            current = e.source();
        }

        if err.to_string().to_ascii_lowercase().contains("connection refused") {
            Self::Refused
        } else {
            Self::Unavailable
        }
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Refused => "connection refused",
            Self::Unavailable => "unavailable",
        })
    }
}

/// Everything that can end a single request early.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    InvalidHost(#[from] HostError),

    #[error("Port {0} is not allowed")]
    PortDenied(u16),

    #[error("backend on port {port} failed ({failure}): {message}")]
    BackendUnavailable {
        port: u16,
        failure: BackendFailure,
        message: String,
    },

    #[error("connection takeover not supported on this connection")]
    HijackUnsupported,
}

impl ProxyError {
    /// Build a backend error from any underlying cause.
    pub fn backend(port: u16, err: &(dyn std::error::Error + 'static)) -> Self {
        Self::BackendUnavailable {
            port,
            failure: BackendFailure::classify(err),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidHost(_) => StatusCode::BAD_REQUEST,
            Self::PortDenied(_) => StatusCode::FORBIDDEN,
            Self::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::HijackUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body shown to the client.
    pub fn body(&self) -> ErrorResponse {
        match self {
            Self::InvalidHost(err) => ErrorResponse::new(err.to_string())
                .hint("Use format: https://<port>.localhost")
                .example(EXAMPLE_URL),
            Self::PortDenied(port) => ErrorResponse::new(format!("Port {port} is not allowed"))
                .hint("This port is either denied or outside the allowed range")
                .example(EXAMPLE_URL),
            Self::BackendUnavailable { port, failure, .. } => {
                let (error, hint) = match failure {
                    BackendFailure::Timeout => (
                        "Request timed out".to_string(),
                        "The backend service took too long to respond".to_string(),
                    ),
                    BackendFailure::Refused => (
                        "Connection refused".to_string(),
                        format!("No service is listening on port {port}"),
                    ),
                    BackendFailure::Unavailable => (
                        "Backend service unavailable".to_string(),
                        format!("Make sure a service is running on port {port}"),
                    ),
                };
                ErrorResponse::new(error)
                    .hint(hint)
                    .example(format!("https://{port}.localhost"))
            }
            Self::HijackUnsupported => ErrorResponse::new("Connection takeover not supported")
                .hint("Stream upgrades need an HTTP/1.1 connection; retry without HTTP/2")
                .example(EXAMPLE_URL),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.body().with_status(self.status())
    }
}
