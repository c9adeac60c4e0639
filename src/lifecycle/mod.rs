//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Provision certificate → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Certificate before socket: no partial listener on a bad identity
//! - Shutdown has a deadline; connections still open after it are closed

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
