//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Ports that are never proxied unless explicitly overridden.
pub const DEFAULT_DENY_PORTS: &[&str] = &[
    "22",      // SSH
    "25",      // SMTP
    "135-139", // NetBIOS/SMB
    "445",     // SMB
    "3389",    // RDP
    "5900",    // VNC
];

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// TLS identity location and provisioning mode.
    pub tls: TlsConfig,

    /// Port admission policy.
    pub ports: PortsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:443" or ":443").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:443".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Parse the bind address. A bare `:port` binds every interface.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        match self.bind_address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}").parse(),
            None => self.bind_address.parse(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// Generate a development CA and leaf when no usable pair exists.
    pub self_signed: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("./cert/localhost.pem"),
            key_path: PathBuf::from("./cert/localhost-key.pem"),
            self_signed: true,
        }
    }
}

/// Port admission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Ranges that are always refused, even inside `allow`.
    pub deny: Vec<PortRange>,

    /// The only range that may be proxied.
    pub allow: PortRange,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            deny: DEFAULT_DENY_PORTS
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
            allow: PortRange {
                start: 1024,
                end: 65535,
            },
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to read inbound request headers, in seconds.
    pub read_header_secs: u64,

    /// Idle keep-alive lifetime for pooled backend connections, in seconds.
    pub idle_secs: u64,

    /// Time a backend has to start responding, in seconds.
    pub write_secs: u64,

    /// Backend connection establishment timeout, in seconds.
    pub dial_secs: u64,

    /// Drain deadline for in-flight connections on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_header_secs: 10,
            idle_secs: 120,
            write_secs: 30,
            dial_secs: 10,
            shutdown_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn read_header(&self) -> Duration {
        Duration::from_secs(self.read_header_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn dial(&self) -> Duration {
        Duration::from_secs(self.dial_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, multi-line.
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable debug-level logging.
    pub verbose: bool,

    /// Emit one access record per completed request.
    pub access_log: bool,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus scrape endpoint bind address, disabled when absent.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            access_log: true,
            log_format: LogFormat::Json,
            metrics_address: None,
        }
    }
}

/// Error produced while parsing a port or port range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortRangeError {
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    #[error("invalid start port: {0:?}")]
    InvalidStart(String),
    #[error("invalid end port: {0:?}")]
    InvalidEnd(String),
    #[error("port {0} out of valid range (1-65535)")]
    OutOfRange(u64),
    #[error("start port cannot be greater than end port")]
    Inverted,
    #[error("invalid port range {range:?}: {source}")]
    InList {
        range: String,
        #[source]
        source: Box<PortRangeError>,
    },
}

/// Inclusive port range within [1, 65535]. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Build a range, rejecting port 0 and inverted bounds.
    pub fn new(start: u16, end: u16) -> Result<Self, PortRangeError> {
        if start == 0 {
            return Err(PortRangeError::OutOfRange(0));
        }
        if start > end {
            return Err(PortRangeError::Inverted);
        }
        Ok(Self { start, end })
    }

    /// A range holding a single port.
    pub fn single(port: u16) -> Result<Self, PortRangeError> {
        Self::new(port, port)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Inclusive membership test.
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Parse a comma-separated list such as `"22,25,135-139"`. Empty items are skipped.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, PortRangeError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse().map_err(|e| PortRangeError::InList {
                    range: part.to_string(),
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

fn parse_port(s: &str) -> Option<Result<u16, PortRangeError>> {
    let n: u64 = s.trim().parse().ok()?;
    Some(match u16::try_from(n) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(PortRangeError::OutOfRange(n)),
    })
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start)
                    .ok_or_else(|| PortRangeError::InvalidStart(start.trim().to_string()))??;
                let end = parse_port(end)
                    .ok_or_else(|| PortRangeError::InvalidEnd(end.trim().to_string()))??;
                Self::new(start, end)
            }
            None => {
                let port =
                    parse_port(s).ok_or_else(|| PortRangeError::InvalidPort(s.to_string()))??;
                Self::single(port)
            }
        }
    }
}

impl TryFrom<String> for PortRange {
    type Error = PortRangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}
