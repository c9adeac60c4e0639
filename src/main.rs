//! porthole: HTTPS for every local port.
//!
//! ```text
//!   https://3000.localhost ──TLS──┐
//!   https://8080.localhost ──TLS──┼──▶ porthole ──┬──▶ http://127.0.0.1:3000
//!   wss://5173.localhost   ──TLS──┘               ├──▶ http://127.0.0.1:8080
//!                                                 └──▶ tcp  127.0.0.1:5173 (spliced)
//! ```
//!
//! Settings come from defaults, an optional TOML file, environment variables,
//! and flags, in increasing order of precedence.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use porthole::config::{read_config, validate_config, ConfigError, PortRange, ProxyConfig};
use porthole::lifecycle::{signals, startup, Shutdown};
use porthole::observability::{logging, metrics};
use porthole::ProxyServer;

#[derive(Debug, Parser)]
#[command(name = "porthole", version, about = "HTTPS reverse proxy for https://<port>.localhost")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "PORTHOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. ":443" or "127.0.0.1:8443".
    #[arg(long, env = "PORTHOLE_LISTEN")]
    listen: Option<String>,

    /// Certificate chain (PEM).
    #[arg(long, env = "PORTHOLE_CERT")]
    cert: Option<PathBuf>,

    /// Private key (PEM).
    #[arg(long, env = "PORTHOLE_KEY")]
    key: Option<PathBuf>,

    /// Generate a development CA and certificate when none is usable.
    #[arg(long, env = "PORTHOLE_SELF_SIGNED", num_args = 0..=1, default_missing_value = "true")]
    self_signed: Option<bool>,

    /// Comma-separated ports or ranges that are never proxied, e.g. "22,135-139".
    #[arg(long, env = "PORTHOLE_DENY_PORTS")]
    deny_ports: Option<String>,

    /// The only port range that may be proxied, e.g. "1024-65535".
    #[arg(long, env = "PORTHOLE_ALLOW_RANGE")]
    allow_range: Option<PortRange>,

    /// Debug-level logging.
    #[arg(short, long, env = "PORTHOLE_VERBOSE")]
    verbose: bool,

    /// Log one line per completed request.
    #[arg(long, env = "PORTHOLE_ACCESS_LOG", num_args = 0..=1, default_missing_value = "true")]
    access_log: Option<bool>,
}

impl Cli {
    /// Layer flags and environment values over the file configuration.
    fn apply(&self, config: &mut ProxyConfig) -> anyhow::Result<()> {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(cert) = &self.cert {
            config.tls.cert_path = cert.clone();
        }
        if let Some(key) = &self.key {
            config.tls.key_path = key.clone();
        }
        if let Some(self_signed) = self.self_signed {
            config.tls.self_signed = self_signed;
        }
        if let Some(deny) = &self.deny_ports {
            config.ports.deny = PortRange::parse_list(deny).context("invalid --deny-ports")?;
        }
        if let Some(allow) = self.allow_range {
            config.ports.allow = allow;
        }
        if self.verbose {
            config.observability.verbose = true;
        }
        if let Some(access_log) = self.access_log {
            config.observability.access_log = access_log;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability).context("failed to initialize logging")?;

    if let Some(addr) = &config.observability.metrics_address {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address {addr:?}"))?;
        metrics::init_metrics(addr).context("failed to start metrics endpoint")?;
    }

    tracing::info!(
        listen = %config.listener.bind_address,
        cert = %config.tls.cert_path.display(),
        key = %config.tls.key_path.display(),
        self_signed = config.tls.self_signed,
        "Server starting"
    );

    let identity = startup::prepare_identity(&config).context("certificate setup failed")?;
    let listener = startup::bind(&config)
        .with_context(|| format!("failed to listen on {}", config.listener.bind_address))?;
    eprintln!("{}", startup::banner(&config));

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);
    let receiver = shutdown.subscribe();

    ProxyServer::new(config)
        .run(listener, &identity, receiver)
        .await?;
    Ok(())
}
