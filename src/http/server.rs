//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Resolve the host, apply the port policy, classify the protocol
//! - Dispatch to the forwarding path or the stream tunnel
//! - Open and close the request context for every request
//! - Serve TLS with graceful shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::forward::{self, BackendPool};
use crate::http::request::{request_host, ProtocolKind, RequestIdGenerator, X_REQUEST_ID};
use crate::http::tunnel::{self, Handshake};
use crate::net::connection::ClientConnection;
use crate::net::tls::{CertificateError, TlsIdentity};
use crate::observability::{AccessLog, MeteredBody, RequestContext, TracingAccessLog};
use crate::routing::Router as ProxyRouter;
use crate::security::PortPolicy;

/// Failure while serving.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub router: Arc<ProxyRouter>,
    pub pool: BackendPool,
    pub ids: Arc<RequestIdGenerator>,
    pub access_log: Arc<dyn AccessLog>,
    pub dial_timeout: Duration,
    pub handshake_timeout: Duration,
}

/// The development proxy: one listener, every `<port>.localhost` backend.
pub struct ProxyServer {
    config: ProxyConfig,
    state: ProxyState,
}

impl ProxyServer {
    /// Build shared state from a validated configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let state = ProxyState {
            router: Arc::new(ProxyRouter::new(PortPolicy::from_config(&config.ports))),
            pool: BackendPool::new(&config.timeouts),
            ids: Arc::new(RequestIdGenerator::new()),
            access_log: Arc::new(TracingAccessLog::new(config.observability.access_log)),
            dial_timeout: config.timeouts.dial(),
            handshake_timeout: config.timeouts.write(),
        };
        Self { config, state }
    }

    /// Replace the access record sink.
    pub fn with_access_log(mut self, access_log: Arc<dyn AccessLog>) -> Self {
        self.state.access_log = access_log;
        self
    }

    /// The Axum router, servable over any transport.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve TLS on `listener` until `shutdown` fires, then drain for the
    /// configured deadline and close whatever is left.
    pub async fn run(
        self,
        listener: std::net::TcpListener,
        identity: &TlsIdentity,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServeError> {
        let tls = identity.rustls_config()?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let handle = Handle::new();
        let drain = self.config.timeouts.shutdown();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!(drain_secs = drain.as_secs(), "Shutting down");
            shutdown_handle.graceful_shutdown(Some(drain));
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let mut server = axum_server::from_tcp_rustls(listener, tls).handle(handle);
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.timeouts.read_header());

        tracing::info!(address = %addr, "Server listening");
        server.serve(app).await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Catch-all proxy handler.
async fn proxy_handler(State(state): State<ProxyState>, mut request: Request<Body>) -> Response {
    let host = request_host(&request);
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let mut context = RequestContext::new(
        state.ids.next_id(),
        request.method().clone(),
        host.clone(),
        state.access_log.clone(),
    );
    let request_id = context.id().clone();

    let route = match state.router.route(&host) {
        Ok(route) => route,
        Err(err) => return reject(err, context),
    };
    context.set_target_port(route.port);

    let connection = ClientConnection::from_request(&mut request);
    let kind = ProtocolKind::classify(request.headers());
    context.set_kind(kind);

    match kind {
        ProtocolKind::Http => {
            tracing::debug!(
                request_id = %request_id,
                method = %request.method(),
                path = %request.uri().path(),
                target_port = route.port,
                "Proxying request"
            );
            match forward::forward(&state.pool, request, route, &host, client_ip, &request_id).await {
                Ok(response) => metered(response, context),
                Err(err) => reject(err, context),
            }
        }
        ProtocolKind::Upgrade => {
            tracing::debug!(
                request_id = %request_id,
                target_port = route.port,
                "Stream upgrade"
            );
            let opened = tunnel::open(
                request,
                connection,
                route,
                state.dial_timeout,
                state.handshake_timeout,
            )
            .await;
            match opened {
                Ok(Handshake::Declined(response)) => {
                    metered(forward::client_response(response, &request_id), context)
                }
                Ok(Handshake::Switched {
                    response,
                    client,
                    backend,
                }) => {
                    let response = tunnel::switching_response(response, &request_id);
                    tunnel::spawn_splice(client, backend, context);
                    response
                }
                Err(err) => reject(err, context),
            }
        }
    }
}

/// Log a per-request failure and turn it into the client's error response.
fn reject(err: ProxyError, mut context: RequestContext) -> Response {
    match &err {
        ProxyError::InvalidHost(reason) => tracing::warn!(
            request_id = %context.id(),
            reason = %reason,
            "Invalid host header"
        ),
        ProxyError::PortDenied(port) => {
            context.set_target_port(*port);
            tracing::warn!(
                request_id = %context.id(),
                port = port,
                "Port access denied"
            )
        }
        _ => tracing::error!(
            request_id = %context.id(),
            target_port = context.target_port(),
            error = %err,
            "Proxy error"
        ),
    }
    context.fail(&err);

    let mut response = err.into_response();
    response
        .headers_mut()
        .insert(X_REQUEST_ID, context.id().header_value());
    metered(response, context)
}

/// Attach the context to the response body; the record is emitted when the
/// body finishes.
fn metered(response: Response, context: RequestContext) -> Response {
    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(MeteredBody::new(body, status, context)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::AccessRecord;
    use axum::http::{header, StatusCode};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AccessRecord>>);

    impl AccessLog for Collect {
        fn record(&self, record: AccessRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    async fn send(host: &str) -> (Response, Arc<Collect>) {
        let sink = Arc::new(Collect::default());
        let server = ProxyServer::new(ProxyConfig::default()).with_access_log(sink.clone());
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::HOST, host)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        (response, sink)
    }

    #[tokio::test]
    async fn invalid_host_is_rejected_with_request_id() {
        let (response, sink) = send("example.com").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid host format: example.com");

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 400);
        assert_eq!(records[0].target_port, None);
        assert!(records[0].error.is_some());
    }

    #[tokio::test]
    async fn denied_port_does_not_reveal_rule() {
        let (response, sink) = send("22.localhost").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Port 22 is not allowed");
        assert_eq!(
            json["hint"],
            "This port is either denied or outside the allowed range"
        );

        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].status, 403);
        assert_eq!(records[0].target_port, Some(22));
    }
}
