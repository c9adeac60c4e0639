//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header, or URI authority on HTTP/2)
//!     → host.rs (grammar: <digits>.localhost | <digits>.localtest.me, optional :port)
//!     → router.rs (port policy check)
//!     → Return: admitted Route or a refusal
//! ```
//!
//! # Design Decisions
//! - No regex: an explicit anchored parser with the same accept set
//! - Deterministic: same host always yields the same verdict

pub mod host;
pub mod router;

pub use host::{resolve_port, HostError};
pub use router::{Route, Router};
