//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, shutdown)
//!     → dispatch.rs (auth → classify → circuit → build → send → stream)
//!     → error.rs (typed failures → proxy-originated responses)
//! ```

pub mod dispatch;
pub mod error;
pub mod server;

pub use error::{ProxyError, X_PROXY_ORIGIN};
pub use server::{apply_reload, build_router, AppState, HttpServer};
