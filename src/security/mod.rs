//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved target port:
//!     → access_control.rs (deny ranges, then allow range)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: a port outside the allow range is refused
//! - Refusals never say which rule matched

pub mod access_control;
pub mod headers;

pub use access_control::PortPolicy;
