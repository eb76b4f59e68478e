//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the Redfish proxy.
///
/// The `auth` section is intentionally *not* defaulted: a running process
/// must state its front-side authentication mode explicitly, even when that
/// mode is `none`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Front-side server configuration (bind address, timeouts).
    #[serde(default)]
    pub server: ServerConfig,

    /// Front-side authentication. Required in the config file.
    pub auth: AuthConfig,

    /// Redfish target definitions.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Admin/introspection surface.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Front-side server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Total per-request timeout in seconds, propagated to the upstream call.
    pub request_timeout_secs: u64,

    /// Grace period for in-flight dispatches during shutdown, in seconds.
    pub shutdown_grace_secs: u64,

    /// Value sent upstream in X-Forwarded-Proto. Set to "https" when a TLS
    /// terminator fronts this proxy.
    pub forwarded_proto: String,

    /// Upper bound for request bodies that must be buffered for replay
    /// (session-token targets retrying once after an upstream 401).
    pub max_replay_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 60,
            shutdown_grace_secs: 30,
            forwarded_proto: "http".to_string(),
            max_replay_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Front-side authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No front-side authentication. Development only.
    #[default]
    None,
    /// HTTP basic against a list of callers with hashed secrets.
    Basic,
    /// Caller identity taken from the client certificate subject attached
    /// by the front-side TLS terminator.
    MutualTls,
    /// Caller identity taken from a named header set by a trusted upstream.
    HeaderDelegation,
}

/// Front-side authentication configuration.
///
/// `mode` carries no serde default: omitting it from the config file is a
/// parse error, never a silent fallback to `none`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Active mode. Exactly one per running process.
    pub mode: AuthMode,

    /// Realm sent in WWW-Authenticate challenges for `basic` mode.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Accepted callers for `basic` mode.
    #[serde(default)]
    pub callers: Vec<CallerConfig>,

    /// Header carrying the caller identity for `header_delegation` mode.
    #[serde(default = "default_trusted_header")]
    pub trusted_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::None,
            realm: default_realm(),
            callers: Vec::new(),
            trusted_header: default_trusted_header(),
        }
    }
}

fn default_realm() -> String {
    "redfish-proxy".to_string()
}

fn default_trusted_header() -> String {
    "x-delegated-user".to_string()
}

/// One accepted caller for `basic` mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallerConfig {
    /// Caller name presented as the basic-auth username.
    pub caller: String,

    /// Hex-encoded SHA-256 of the caller's secret.
    pub secret_hash: String,
}

/// One Redfish target definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Stable opaque identifier, unique within the config. Lookup key from
    /// request paths.
    pub id: String,

    /// Host (and optional port) of the upstream Redfish endpoint.
    pub address: String,

    /// Upstream scheme. Targets speak HTTPS unless explicitly downgraded.
    #[serde(default)]
    pub scheme: UpstreamScheme,

    /// Soft-remove flag.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Upstream credentials.
    pub credentials: CredentialsConfig,

    /// Upstream TLS trust configuration.
    #[serde(default)]
    pub tls: TargetTlsConfig,

    /// Per-target timeout overrides.
    #[serde(default)]
    pub timeouts: TargetTimeoutConfig,
}

fn default_enabled() -> bool {
    true
}

/// Upstream scheme selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamScheme {
    #[default]
    Https,
    Http,
}

impl UpstreamScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamScheme::Https => "https",
            UpstreamScheme::Http => "http",
        }
    }
}

/// Upstream credential configuration, a closed two-case variant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// HTTP basic on every upstream request.
    Basic { username: String, secret: String },
    /// Redfish session login; the proxy obtains and caches an X-Auth-Token.
    Session { username: String, secret: String },
}

/// Upstream TLS trust mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsModeConfig {
    /// Verify against the system trust store.
    #[default]
    System,
    /// Verify against a custom CA bundle (`ca_bundle` must be set).
    CustomCa,
    /// Skip server certificate verification. Must be opted into explicitly.
    InsecureSkipVerify,
}

/// Upstream TLS configuration for one target.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetTlsConfig {
    pub mode: TlsModeConfig,

    /// PEM file with the CA bundle for `custom_ca` mode.
    pub ca_bundle: Option<String>,

    /// PEM file with a client certificate chain, if the BMC requires mTLS.
    pub client_cert: Option<String>,

    /// PEM file with the client private key.
    pub client_key: Option<String>,
}

/// Per-target timeouts in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetTimeoutConfig {
    /// TCP connect timeout. Default 5 s.
    pub connect_secs: u64,

    /// TLS handshake timeout. Default 10 s.
    pub tls_handshake_secs: u64,

    /// Time allowed for the upstream to produce response headers. Default 30 s.
    pub response_header_secs: u64,

    /// Idle timeout for pooled upstream connections. Default 90 s.
    pub idle_secs: u64,
}

impl Default for TargetTimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            tls_handshake_secs: 10,
            response_header_secs: 30,
            idle_secs: 90,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
///
/// The admin surface is gated on its own bind address, never on a Host
/// header match.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin endpoints.
    pub enabled: bool,

    /// Bearer token for admin requests.
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:5001".to_string(),
        }
    }
}
