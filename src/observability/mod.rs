//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every dispatch produces:
//!     → access_log.rs (one structured event: caller, target, outcome, bytes)
//!     → metrics.rs (per-target counters, latency histogram, circuit gauge)
//!
//! Consumers:
//!     → Log aggregation (stdout via tracing-subscriber)
//!     → Metrics endpoint (Prometheus scrape on its own listener)
//! ```
//!
//! # Design Decisions
//! - Correlation id flows through all subsystems as x-request-id
//! - Metrics are cheap (atomic increments)
//! - No Redfish payload content is logged or exported, ever

pub mod access_log;
pub mod metrics;

pub use access_log::{CountedBody, EventScope, MeteredBody, Outcome};
