//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Initialize subsystems → Start listener
//!
//! Shutdown:
//!     SIGTERM/SIGINT → Stop accepting → Drain in-flight (bounded grace)
//!     → Close upstream pool → Exit
//!
//! Reload:
//!     SIGHUP → Load config → Swap target set → Drop stale clients
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close pool
//! - Shutdown has a timeout: forced exit after the grace period
//! - A reload that fails validation leaves the running set untouched

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{Signal, Signals};
