//! HTTP forwarding path.
//!
//! Ordinary exchanges go through one pooled HTTP/1.1 client owned by the
//! server. Bodies stream in both directions; nothing is buffered whole.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::ProxyError;
use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::routing::Route;
use crate::security::headers::{apply_forwarded, strip_hop_by_hop};

/// Idle connections kept per backend port.
pub const MAX_IDLE_PER_HOST: usize = 10;

const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Outbound connection pool to loopback backends.
///
/// A pooled connection is checked out by exactly one request at a time and
/// returned when that exchange finishes.
#[derive(Clone)]
pub struct BackendPool {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
}

impl BackendPool {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeouts.dial()));
        connector.set_keepalive(Some(TCP_KEEPALIVE));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(timeouts.idle())
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Self {
            client,
            response_timeout: timeouts.write(),
        }
    }

    /// Send a prepared request, failing if the backend does not start
    /// responding within the response timeout.
    pub async fn send(
        &self,
        route: Route,
        request: Request<Body>,
    ) -> Result<Response<Incoming>, ProxyError> {
        match tokio::time::timeout(self.response_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(ProxyError::backend(route.port, &err)),
            Err(elapsed) => Err(ProxyError::backend(route.port, &elapsed)),
        }
    }
}

/// Rewrite an inbound request for the backend.
///
/// The URI becomes `http://127.0.0.1:<port><path-and-query>`. The Host header
/// keeps the name the client used; it is inserted for HTTP/2 requests, which
/// carry the host in the URI authority instead.
pub fn backend_request(
    mut request: Request<Body>,
    route: Route,
    host: &str,
    client_ip: Option<IpAddr>,
    request_id: &RequestId,
) -> Result<Request<Body>, ProxyError> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let authority = route.backend_addr().to_string();
    let uri = Uri::builder()
        .scheme("http")
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|err| ProxyError::backend(route.port, &err))?;
    *request.uri_mut() = uri;
    *request.version_mut() = Version::HTTP_11;

    let headers = request.headers_mut();
    strip_hop_by_hop(headers);
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert(header::HOST, value);
    }
    apply_forwarded(headers, client_ip, host);
    headers.insert(X_REQUEST_ID, request_id.header_value());

    Ok(request)
}

/// Turn a backend response into the client response.
pub fn client_response(response: Response<Incoming>, request_id: &RequestId) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts.headers.insert(X_REQUEST_ID, request_id.header_value());
    Response::from_parts(parts, Body::new(body))
}

/// Forward one exchange through the pool.
pub async fn forward(
    pool: &BackendPool,
    request: Request<Body>,
    route: Route,
    host: &str,
    client_ip: Option<IpAddr>,
    request_id: &RequestId,
) -> Result<Response<Body>, ProxyError> {
    let request = backend_request(request, route, host, client_ip, request_id)?;
    let response = pool.send(route, request).await?;
    Ok(client_response(response, request_id))
}
