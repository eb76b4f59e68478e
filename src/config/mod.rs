//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On SIGHUP:
//!     loader.rs loads new config
//!     → validation.rs validates
//!     → target registry swaps its set atomically
//!     → client pool drops entries for changed targets
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields except `auth.mode` have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ProxyConfig;
pub use schema::{AdminConfig, AuthConfig, AuthMode, ObservabilityConfig, ServerConfig};
pub use schema::{CredentialsConfig, TargetConfig, TargetTimeoutConfig, TlsModeConfig};
