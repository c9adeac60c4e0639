//! TLS termination with a provisioned development identity.

use porthole::config::TlsConfig;
use porthole::net::certs::{ca_path, provision};
use porthole::{ProxyConfig, ProxyServer, Shutdown};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

mod common;

fn tls_config(dir: &Path) -> TlsConfig {
    TlsConfig {
        cert_path: dir.join("localhost.pem"),
        key_path: dir.join("localhost-key.pem"),
        self_signed: true,
    }
}

/// Client config that trusts only the persisted CA file.
fn client_config(ca_file: &Path, versions: &[&'static rustls::SupportedProtocolVersion]) -> Arc<ClientConfig> {
    let pem = std::fs::read(ca_file).unwrap();
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots.add(cert.unwrap()).unwrap();
    }

    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(versions)
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

async fn connect(
    proxy: SocketAddr,
    config: Arc<ClientConfig>,
    name: ServerName<'static>,
) -> TlsStream<TcpStream> {
    let stream = TcpStream::connect(proxy).await.unwrap();
    TlsConnector::from(config).connect(name, stream).await.unwrap()
}

async fn start_tls_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let identity = provision(&config.tls).unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let task = tokio::spawn(async move {
        ProxyServer::new(config)
            .run(listener, &identity, receiver)
            .await
            .unwrap();
    });
    (addr, shutdown, task)
}

#[tokio::test]
async fn proxies_over_tls_with_generated_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ProxyConfig::default();
    config.tls = tls_config(dir.path());
    config.timeouts.shutdown_secs = 1;
    let ca_file = ca_path(&config.tls.cert_path);

    let backend = common::start_mock_backend("OK").await;
    let (proxy, shutdown, task) = start_tls_proxy(config).await;

    let client = client_config(&ca_file, rustls::DEFAULT_VERSIONS);
    let mut stream = connect(proxy, client, ServerName::try_from("localhost").unwrap()).await;
    let request = format!(
        "GET / HTTP/1.1\r\nHost: {}.localhost\r\nConnection: close\r\n\r\n",
        backend.port()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    // the server may close without close_notify; keep what arrived
    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;
    let response = String::from_utf8(raw).unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.to_ascii_lowercase().contains("x-request-id:"));
    assert!(response.ends_with("OK"));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server stops after shutdown")
        .unwrap();
}

#[tokio::test]
async fn leaf_is_valid_for_loopback_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ProxyConfig::default();
    config.tls = tls_config(dir.path());
    let ca_file = ca_path(&config.tls.cert_path);
    let (proxy, shutdown, _task) = start_tls_proxy(config).await;

    let client = client_config(&ca_file, rustls::DEFAULT_VERSIONS);
    let stream = connect(proxy, client, ServerName::try_from("127.0.0.1").unwrap()).await;
    let (_, session) = stream.get_ref();
    assert_eq!(session.alpn_protocol(), Some(&b"http/1.1"[..]));

    shutdown.trigger();
}

#[tokio::test]
async fn tls12_clients_get_forward_secret_aead() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ProxyConfig::default();
    config.tls = tls_config(dir.path());
    let ca_file = ca_path(&config.tls.cert_path);
    let (proxy, shutdown, _task) = start_tls_proxy(config).await;

    let client = client_config(&ca_file, &[&rustls::version::TLS12]);
    let stream = connect(proxy, client, ServerName::try_from("localhost").unwrap()).await;
    let (_, session) = stream.get_ref();

    assert_eq!(session.protocol_version(), Some(rustls::ProtocolVersion::TLSv1_2));
    let suite = format!("{:?}", session.negotiated_cipher_suite().unwrap().suite());
    assert!(suite.contains("ECDHE"), "{suite}");
    assert!(suite.contains("GCM") || suite.contains("CHACHA20"), "{suite}");

    shutdown.trigger();
}

#[tokio::test]
async fn restart_reuses_persisted_identity() {
    let dir = tempfile::tempdir().unwrap();
    let config = tls_config(dir.path());

    let first = provision(&config).unwrap();
    let second = provision(&config).unwrap();

    assert_eq!(first.chain(), second.chain());
}
