//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command-line / environment overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by the server at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the port policy never changes while serving
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, PortRange, PortRangeError, PortsConfig,
    ProxyConfig, TimeoutConfig, TlsConfig, DEFAULT_DENY_PORTS,
};
pub use validation::{validate_config, ValidationError};
