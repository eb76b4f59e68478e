//! Multi-target reverse proxy for Redfish management interfaces.

pub mod admin;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod routing;
pub mod targets;
pub mod upstream;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::HttpServer;
