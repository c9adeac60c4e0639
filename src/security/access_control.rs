//! Port admission policy.
//!
//! A port is refused if any deny range contains it, and otherwise admitted
//! only inside the allow range. Deny wins on overlap; there is no implicit
//! allow outside the configured range.

use crate::config::{PortRange, PortsConfig};

/// Immutable deny/allow rule set, built once at startup.
#[derive(Debug, Clone)]
pub struct PortPolicy {
    deny: Vec<PortRange>,
    allow: PortRange,
}

impl PortPolicy {
    pub fn new(deny: Vec<PortRange>, allow: PortRange) -> Self {
        Self { deny, allow }
    }

    pub fn from_config(config: &PortsConfig) -> Self {
        Self::new(config.deny.clone(), config.allow)
    }

    /// Returns true if the port may be proxied.
    ///
    /// Callers only learn the verdict, never which rule produced it.
    pub fn is_allowed(&self, port: u16) -> bool {
        if self.deny.iter().any(|range| range.contains(port)) {
            return false;
        }
        self.allow.contains(port)
    }

    pub fn deny_ranges(&self) -> &[PortRange] {
        &self.deny
    }

    pub fn allow_range(&self) -> PortRange {
        self.allow
    }
}

impl Default for PortPolicy {
    fn default() -> Self {
        Self::from_config(&PortsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> PortRange {
        s.parse().unwrap()
    }

    #[test]
    fn default_policy() {
        let policy = PortPolicy::default();
        assert!(policy.is_allowed(8000));
        assert!(policy.is_allowed(1024));
        assert!(policy.is_allowed(65535));
        assert!(!policy.is_allowed(22));
        assert!(!policy.is_allowed(80));
        assert!(!policy.is_allowed(1023));
        assert!(!policy.is_allowed(137));
        assert!(!policy.is_allowed(3389));
        assert!(!policy.is_allowed(5900));
    }

    #[test]
    fn deny_overrides_allow_on_overlap() {
        let policy = PortPolicy::new(vec![range("5000-5010"), range("8080")], range("1-65535"));
        for port in 5000..=5010 {
            assert!(!policy.is_allowed(port), "port {port} is denied");
        }
        assert!(!policy.is_allowed(8080));
        assert!(policy.is_allowed(4999));
        assert!(policy.is_allowed(5011));
        assert!(policy.is_allowed(8081));
    }

    #[test]
    fn allow_range_bounds_are_inclusive() {
        let policy = PortPolicy::new(Vec::new(), range("3000-4000"));
        assert!(!policy.is_allowed(2999));
        assert!(policy.is_allowed(3000));
        assert!(policy.is_allowed(4000));
        assert!(!policy.is_allowed(4001));
    }
}
