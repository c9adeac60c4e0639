//! Stream tunnel for upgraded connections.
//!
//! # Data Flow
//! ```text
//! Client ──upgrade request──→ Proxy ──same request, raw TCP──→ Backend
//! Client ←──── 101 + headers ── Proxy ←──────── 101 ─────────── Backend
//! Client ←════════ bytes ═════→ Proxy ←════════ bytes ═════════→ Backend
//! ```
//!
//! The proxy never speaks the upgraded protocol. It relays the handshake,
//! then splices the two connections until both directions have closed.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::net::connection::ClientConnection;
use crate::observability::RequestContext;
use crate::routing::Route;

/// Result of relaying an upgrade handshake.
pub enum Handshake {
    /// The backend answered with something other than 101.
    Declined(Response<Incoming>),
    /// The backend switched protocols; both sides are ready to be spliced.
    Switched {
        response: Response<Incoming>,
        client: OnUpgrade,
        backend: OnUpgrade,
    },
}

/// Dial the backend and relay the client's upgrade request to it.
///
/// The client connection is only claimed after the dial succeeds, so a dead
/// backend yields an ordinary 502 on an untouched connection. The backend must
/// answer the handshake within `handshake_timeout`.
pub async fn open(
    request: Request<Body>,
    connection: ClientConnection,
    route: Route,
    dial_timeout: Duration,
    handshake_timeout: Duration,
) -> Result<Handshake, ProxyError> {
    let stream = match tokio::time::timeout(dial_timeout, TcpStream::connect(route.backend_addr())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(ProxyError::backend(route.port, &err)),
        Err(elapsed) => return Err(ProxyError::backend(route.port, &elapsed)),
    };

    let ClientConnection::Upgradable(client) = connection else {
        return Err(ProxyError::HijackUnsupported);
    };
    let _ = stream.set_nodelay(true);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|err| ProxyError::backend(route.port, &err))?;
    tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            tracing::debug!(error = %err, "Backend tunnel connection ended with error");
        }
    });

    let (mut parts, body) = request.into_parts();
    parts.uri = origin_form(&parts.uri);
    let sent = tokio::time::timeout(
        handshake_timeout,
        sender.send_request(Request::from_parts(parts, body)),
    )
    .await;
    let mut response = match sent {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return Err(ProxyError::backend(route.port, &err)),
        Err(elapsed) => return Err(ProxyError::backend(route.port, &elapsed)),
    };

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Ok(Handshake::Declined(response));
    }

    let backend = hyper::upgrade::on(&mut response);
    Ok(Handshake::Switched {
        response,
        client,
        backend,
    })
}

fn origin_form(uri: &Uri) -> Uri {
    uri.path_and_query()
        .and_then(|pq| Uri::builder().path_and_query(pq.clone()).build().ok())
        .unwrap_or_else(|| Uri::from_static("/"))
}

/// The 101 sent to the client: the backend's handshake headers plus the request id.
pub fn switching_response(response: Response<Incoming>, request_id: &RequestId) -> Response<Body> {
    let (mut parts, _) = response.into_parts();
    parts.headers.insert(X_REQUEST_ID, request_id.header_value());
    Response::from_parts(parts, Body::empty())
}

/// Splice the two upgraded connections in the background.
///
/// The access record is emitted once both directions have finished.
pub fn spawn_splice(client: OnUpgrade, backend: OnUpgrade, context: RequestContext) {
    tokio::spawn(splice(client, backend, context));
}

async fn splice(client: OnUpgrade, backend: OnUpgrade, mut context: RequestContext) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(
                request_id = %context.id(),
                target_port = context.target_port(),
                error = %err,
                "Upgrade did not complete"
            );
            context.fail(err);
            context.finish(StatusCode::SWITCHING_PROTOCOLS.as_u16(), 0);
            return;
        }
    };

    match copy_bidirectional(client, backend).await {
        (Ok(_), Ok(downstream)) => {
            context.finish(StatusCode::SWITCHING_PROTOCOLS.as_u16(), downstream);
        }
        (upstream, downstream) => {
            let bytes = downstream.as_ref().map(|n| *n).unwrap_or(0);
            if let Some(err) = upstream.err().or(downstream.err()) {
                context.fail(err);
            }
            context.finish(StatusCode::SWITCHING_PROTOCOLS.as_u16(), bytes);
        }
    }
}

/// Copy client→backend and backend→client on two tasks and wait for both.
/// Returns the byte counts in that order.
async fn copy_bidirectional(client: Upgraded, backend: Upgraded) -> (io::Result<u64>, io::Result<u64>) {
    let (client_read, client_write) = tokio::io::split(TokioIo::new(client));
    let (backend_read, backend_write) = tokio::io::split(TokioIo::new(backend));

    let upstream = tokio::spawn(pipe(client_read, backend_write));
    let downstream = tokio::spawn(pipe(backend_read, client_write));
    let (upstream, downstream) = tokio::join!(upstream, downstream);

    (flatten(upstream), flatten(downstream))
}

fn flatten(joined: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<u64> {
    joined.unwrap_or_else(|err| Err(io::Error::other(err)))
}

/// Copy until the source ends or fails, then close the destination so the
/// opposite direction sees end-of-stream.
async fn pipe<R, W>(mut reader: R, mut writer: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(&mut reader, &mut writer).await;
    let _ = writer.shutdown().await;
    copied
}
