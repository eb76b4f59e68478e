//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → classifier.rs (first path segment → target id, rest → upstream path)
//!     → headers.rs (hop-by-hop and credential stripping, forwarded headers)
//!     → dispatcher builds the upstream request
//! ```
//!
//! # Design Decisions
//! - Classification is a pure function over the URI and the registry
//! - Explicit typed errors rather than a catch-all no-match
//! - No schema coupling: the Redfish path is opaque payload

pub mod classifier;
pub mod headers;

pub use classifier::{classify, RouteDecision, RoutingError};
