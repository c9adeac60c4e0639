//! Request accounting.
//!
//! A [`RequestContext`] is opened when a request arrives and closed exactly
//! once, producing an [`AccessRecord`]. For forwarded responses the context
//! rides inside a [`MeteredBody`] so the record is emitted only after the
//! last byte (or the failure) reaches the client.

use axum::body::{Body, Bytes};
use axum::http::Method;
use hyper::body::{Body as _, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::http::request::{ProtocolKind, RequestId};
use crate::observability::metrics;

/// One completed request or tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub request_id: String,
    pub method: String,
    pub host: String,
    /// Absent when the host never resolved.
    pub target_port: Option<u16>,
    pub kind: ProtocolKind,
    pub status: u16,
    pub latency: Duration,
    /// Body bytes sent to the client (backend to client for tunnels).
    pub bytes: u64,
    pub error: Option<String>,
}

/// Sink for access records.
pub trait AccessLog: Send + Sync + 'static {
    fn record(&self, record: AccessRecord);
}

/// Writes access records as `tracing` events.
#[derive(Debug, Clone, Copy)]
pub struct TracingAccessLog {
    enabled: bool,
}

impl TracingAccessLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl AccessLog for TracingAccessLog {
    fn record(&self, record: AccessRecord) {
        if !self.enabled {
            return;
        }
        let latency_ms = record.latency.as_secs_f64() * 1000.0;
        match &record.error {
            None => tracing::info!(
                request_id = %record.request_id,
                method = %record.method,
                host = %record.host,
                target_port = record.target_port,
                kind = record.kind.as_str(),
                status = record.status,
                latency_ms,
                bytes = record.bytes,
                "request completed"
            ),
            Some(error) => tracing::error!(
                request_id = %record.request_id,
                method = %record.method,
                host = %record.host,
                target_port = record.target_port,
                kind = record.kind.as_str(),
                status = record.status,
                latency_ms,
                bytes = record.bytes,
                error = %error,
                "request failed"
            ),
        }
    }
}

/// Measurement state for one in-flight request.
pub struct RequestContext {
    id: RequestId,
    start: Instant,
    method: Method,
    host: String,
    target_port: Option<u16>,
    kind: ProtocolKind,
    error: Option<String>,
    sink: Arc<dyn AccessLog>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("host", &self.host)
            .field("target_port", &self.target_port)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn new(id: RequestId, method: Method, host: String, sink: Arc<dyn AccessLog>) -> Self {
        Self {
            id,
            start: Instant::now(),
            method,
            host,
            target_port: None,
            kind: ProtocolKind::Http,
            error: None,
            sink,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn target_port(&self) -> Option<u16> {
        self.target_port
    }

    pub fn set_target_port(&mut self, port: u16) {
        self.target_port = Some(port);
    }

    pub fn set_kind(&mut self, kind: ProtocolKind) {
        self.kind = kind;
    }

    /// Remember the terminal error. The first one wins.
    pub fn fail(&mut self, error: impl fmt::Display) {
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
    }

    /// Close the context and hand the record to the sink.
    pub fn finish(self, status: u16, bytes: u64) {
        let latency = self.start.elapsed();
        metrics::record_request(self.method.as_str(), status, latency);
        self.sink.record(AccessRecord {
            request_id: self.id.to_string(),
            method: self.method.to_string(),
            host: self.host,
            target_port: self.target_port,
            kind: self.kind,
            status,
            latency,
            bytes,
            error: self.error,
        });
    }
}

/// Response body wrapper that counts data bytes and closes the context when
/// the body ends, fails, or is dropped early.
pub struct MeteredBody {
    inner: Body,
    status: u16,
    bytes: u64,
    context: Option<RequestContext>,
}

impl MeteredBody {
    pub fn new(inner: Body, status: u16, context: RequestContext) -> Self {
        Self {
            inner,
            status,
            bytes: 0,
            context: Some(context),
        }
    }

    fn finish(&mut self, error: Option<String>) {
        if let Some(mut context) = self.context.take() {
            if let Some(error) = error {
                context.fail(error);
            }
            context.finish(self.status, self.bytes);
        }
    }
}

impl hyper::body::Body for MeteredBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finish(Some(err.to_string()));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for MeteredBody {
    fn drop(&mut self) {
        let error = if self.inner.is_end_stream() {
            None
        } else {
            Some("response aborted before completion".to_string())
        };
        self.finish(error);
    }
}
