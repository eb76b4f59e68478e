//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch to a target:
//!     → circuit_breaker.rs consulted before the upstream request is built
//!     → outcome recorded after headers arrive (or fail to)
//!     → open circuits fail fast with 503 + Retry-After
//! ```
//!
//! # Design Decisions
//! - Per-target state; one slow BMC never poisons the others
//! - Circuit state lives in memory only and resets on restart

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitDecision, CircuitSettings, CircuitSnapshot, CircuitState, CircuitTracker,
};
