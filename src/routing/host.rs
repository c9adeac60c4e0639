//! Host header → target port resolution.
//!
//! Accepts exactly `<digits>.localhost` or `<digits>.localtest.me`, optionally
//! followed by `:<digits>`, and nothing else. The whole string must match; a
//! hostname with extra labels such as `app.8000.localhost` is rejected so a
//! request can't smuggle a port through a longer name.
//!
//! Matching is case-sensitive and digits are ASCII only.

/// Domains that may follow the port label.
const DOMAINS: [&str; 2] = ["localhost", "localtest.me"];

/// Why a host could not be turned into a port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("invalid host format: {0}")]
    Malformed(String),
    #[error("invalid port number: {0}")]
    InvalidPortNumber(String),
    #[error("port {0} out of valid range (1-65535)")]
    OutOfRange(u64),
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Extract the `<digits>` label, or `None` if the host doesn't fit the grammar.
fn port_label(host: &str) -> Option<&str> {
    let name = match host.rsplit_once(':') {
        Some((name, suffix)) if is_digits(suffix) => name,
        Some(_) => return None,
        None => host,
    };
    let (label, domain) = name.split_once('.')?;
    (is_digits(label) && DOMAINS.contains(&domain)).then_some(label)
}

/// Resolve a Host header value to the backend port it names.
pub fn resolve_port(host: &str) -> Result<u16, HostError> {
    let label = port_label(host).ok_or_else(|| HostError::Malformed(host.to_string()))?;
    let n: u64 = label
        .parse()
        .map_err(|_| HostError::InvalidPortNumber(label.to_string()))?;
    match u16::try_from(n) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(HostError::OutOfRange(n)),
    }
}
