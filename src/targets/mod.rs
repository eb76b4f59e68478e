//! Target management subsystem.
//!
//! # Data Flow
//! ```text
//! Config targets
//!     → target.rs (load TLS material, compute content hash)
//!     → registry.rs (id → Arc<Target>, atomic swap on reload)
//!     → consumed by the classifier and the client pool
//! ```
//!
//! # Design Decisions
//! - Target records are immutable; rotation replaces the record atomically
//! - The registry is the sole owner of the target set
//! - Content hashes drive client pool invalidation across reloads

pub mod registry;
pub mod target;

pub use registry::TargetRegistry;
pub use target::{Credentials, Secret, Target, TargetTimeouts, TlsMaterial, TlsMode};
