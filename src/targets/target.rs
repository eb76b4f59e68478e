//! Target abstraction.
//!
//! # Responsibilities
//! - Represent a single Redfish endpoint (identity, address, credentials, TLS)
//! - Load TLS material from disk at construction time
//! - Expose a content hash so the client pool can detect stale entries

use std::fs;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::config::schema::{
    CredentialsConfig, TargetConfig, TargetTimeoutConfig, TlsModeConfig, UpstreamScheme,
};

/// A secret value with a redacting Debug so credentials never reach logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);


impl Secret {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Upstream credentials, a closed two-case variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Credentials {
    /// Injected as an Authorization header on every upstream request.
    Basic { username: String, secret: Secret },
    /// Exchanged for an X-Auth-Token through the Redfish session service.
    Session { username: String, secret: Secret },
}

/// TLS trust selection with material loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TlsMode {
    SystemRoots,
    CustomCa { bundle_pem: Vec<u8> },
    InsecureSkipVerify,
}

/// Optional client certificate material for BMCs that require mTLS.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Complete upstream TLS configuration for one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TlsMaterial {
    pub mode: TlsMode,
    pub client_identity: Option<ClientIdentity>,
}

/// Per-target timeouts with documented defaults (connect 5 s, TLS handshake
/// 10 s, response header 30 s, idle 90 s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetTimeouts {
    pub connect: Duration,
    pub tls_handshake: Duration,
    pub response_header: Duration,
    pub idle: Duration,
}

impl From<&TargetTimeoutConfig> for TargetTimeouts {
    fn from(cfg: &TargetTimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(cfg.connect_secs),
            tls_handshake: Duration::from_secs(cfg.tls_handshake_secs),
            response_header: Duration::from_secs(cfg.response_header_secs),
            idle: Duration::from_secs(cfg.idle_secs),
        }
    }
}

/// Error constructing a Target from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("target '{id}': cannot read {what} from '{path}': {source}")]
    Material {
        id: String,
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
}

/// One Redfish endpoint as known to the proxy.
///
/// Targets are immutable once constructed; configuration changes produce a
/// replacement record with a different content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub address: String,
    pub scheme: UpstreamScheme,
    pub enabled: bool,
    pub credentials: Credentials,
    pub tls: TlsMaterial,
    pub timeouts: TargetTimeouts,
    content_hash: u64,
}

impl Target {
    /// Build a Target from configuration, reading referenced PEM files.
    pub fn from_config(cfg: &TargetConfig) -> Result<Self, TargetError> {
        let credentials = match &cfg.credentials {
            CredentialsConfig::Basic { username, secret } => Credentials::Basic {
                username: username.clone(),
                secret: Secret::new(secret.clone()),
            },
            CredentialsConfig::Session { username, secret } => Credentials::Session {
                username: username.clone(),
                secret: Secret::new(secret.clone()),
            },
        };

        let mode = match cfg.tls.mode {
            TlsModeConfig::System => TlsMode::SystemRoots,
            TlsModeConfig::CustomCa => {
                // Validation guarantees ca_bundle is present for this mode.
                let path = cfg.tls.ca_bundle.as_deref().unwrap_or_default();
                TlsMode::CustomCa {
                    bundle_pem: read_material(&cfg.id, "CA bundle", path)?,
                }
            }
            TlsModeConfig::InsecureSkipVerify => TlsMode::InsecureSkipVerify,
        };

        let client_identity = match (&cfg.tls.client_cert, &cfg.tls.client_key) {
            (Some(cert), Some(key)) => Some(ClientIdentity {
                cert_pem: read_material(&cfg.id, "client certificate", cert)?,
                key_pem: read_material(&cfg.id, "client key", key)?,
            }),
            _ => None,
        };

        let tls = TlsMaterial {
            mode,
            client_identity,
        };
        let timeouts = TargetTimeouts::from(&cfg.timeouts);

        let content_hash = hash_content(
            &cfg.id,
            &cfg.address,
            cfg.scheme,
            cfg.enabled,
            &credentials,
            &tls,
            &timeouts,
        );

        Ok(Self {
            id: cfg.id.clone(),
            address: cfg.address.clone(),
            scheme: cfg.scheme,
            enabled: cfg.enabled,
            credentials,
            tls,
            timeouts,
            content_hash,
        })
    }

    /// Hash over every connection-relevant field. The client pool compares
    /// this to decide whether a cached client is stale.
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// Whether this target authenticates upstream through session tokens.
    pub fn uses_session_auth(&self) -> bool {
        matches!(self.credentials, Credentials::Session { .. })
    }
}

fn read_material(id: &str, what: &'static str, path: &str) -> Result<Vec<u8>, TargetError> {
    fs::read(path).map_err(|source| TargetError::Material {
        id: id.to_string(),
        what,
        path: path.to_string(),
        source,
    })
}

#[allow(clippy::too_many_arguments)]
fn hash_content(
    id: &str,
    address: &str,
    scheme: UpstreamScheme,
    enabled: bool,
    credentials: &Credentials,
    tls: &TlsMaterial,
    timeouts: &TargetTimeouts,
) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    address.hash(&mut hasher);
    scheme.hash(&mut hasher);
    enabled.hash(&mut hasher);
    credentials.hash(&mut hasher);
    tls.hash(&mut hasher);
    timeouts.hash(&mut hasher);
    hasher.finish()
}
