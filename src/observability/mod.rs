//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler
//!     → access.rs (request context, metered body, access record)
//!     → metrics.rs (counters, histograms)
//!     → AccessLog sink (tracing events by default)
//!
//! logging.rs installs the tracing subscriber once at startup.
//! ```

pub mod access;
pub mod logging;
pub mod metrics;

pub use access::{AccessLog, AccessRecord, MeteredBody, RequestContext, TracingAccessLog};
