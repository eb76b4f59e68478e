//! Upstream client subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → pool.rs (cached per-target client, deduplicated construction)
//!     → tls.rs (per-target rustls config: roots, client certs, skip-verify)
//!     → session.rs (Redfish session tokens for session-auth targets)
//!     → hyper client issues the request
//! ```
//!
//! # Design Decisions
//! - One long-lived client per target; connection reuse comes from the
//!   hyper pool, bounded by the target's idle settings
//! - The pool is the only owner of transport state; shutdown is well-defined
//! - The client performs no redirect handling, so credentials can never
//!   follow a Location header to another host

pub mod pool;
pub mod session;
pub mod tls;

pub use pool::{ClientEntry, ClientPool, PoolError, UpstreamClient};
pub use session::SessionTokens;

/// Transport-level failure talking to a target, mapped to 502/504 by the
/// dispatcher and counted by the circuit tracker.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("tls failed: {0}")]
    TlsFailed(String),
    #[error("upstream did not produce response headers in time")]
    HeaderTimeout,
    #[error("reading upstream body failed: {0}")]
    BodyReadFailed(String),
    #[error("session login failed: {0}")]
    SessionLogin(String),
}

impl UpstreamError {
    /// Classify a hyper client error. TLS failures surface inside the
    /// connect phase, so the source chain is inspected for rustls markers.
    pub fn from_client(err: &hyper_util::client::legacy::Error) -> Self {
        let description = err.to_string();
        if err.is_connect() {
            let mut source: Option<&(dyn std::error::Error + 'static)> =
                std::error::Error::source(err);
            while let Some(cause) = source {
                let text = cause.to_string();
                if cause.is::<rustls::Error>()
                    || text.contains("certificate")
                    || text.contains("handshake")
                {
                    return UpstreamError::TlsFailed(text);
                }
                source = cause.source();
            }
            UpstreamError::ConnectFailed(description)
        } else {
            UpstreamError::BodyReadFailed(description)
        }
    }
}
