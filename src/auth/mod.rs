//! Front-side authentication.
//!
//! # Responsibilities
//! - Validate the incoming request against the proxy's own access policy
//! - Resolve a caller identity for the access log
//! - Decide whether the caller may reach the selected target
//!
//! # Design Decisions
//! - Exactly one mode per running process, chosen in configuration
//! - Basic secrets are stored hashed and compared in constant time
//! - Authorisation is coarse: any authenticated caller reaches any enabled
//!   target; disabled targets are Forbidden, not NotFound

use std::collections::HashMap;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::schema::{AuthConfig, AuthMode};
use crate::targets::Target;

/// Authentication failure, mapped to 401/403 by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("forbidden")]
    Forbidden,
}

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub caller: String,
}

/// Verified peer identity attached to the request extensions by the
/// front-side TLS terminator integration. Consumed by `mutual_tls` mode.
#[derive(Debug, Clone)]
pub struct TlsPeerIdentity(pub String);

enum Mode {
    None,
    Basic {
        realm: String,
        // caller -> decoded SHA-256 of the secret
        callers: HashMap<String, [u8; 32]>,
    },
    MutualTls,
    HeaderDelegation {
        header: HeaderName,
    },
}

/// Front-side authenticator. One mode active per process.
pub struct Authenticator {
    mode: Mode,
}

impl Authenticator {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let mode = match cfg.mode {
            AuthMode::None => Mode::None,
            AuthMode::Basic => {
                let mut callers = HashMap::with_capacity(cfg.callers.len());
                for caller in &cfg.callers {
                    // Validation already checked the hash shape.
                    if let Ok(bytes) = hex::decode(&caller.secret_hash) {
                        if bytes.len() == 32 {
                            let mut digest = [0u8; 32];
                            digest.copy_from_slice(&bytes);
                            callers.insert(caller.caller.clone(), digest);
                        }
                    }
                }
                Mode::Basic {
                    realm: cfg.realm.clone(),
                    callers,
                }
            }
            AuthMode::MutualTls => Mode::MutualTls,
            AuthMode::HeaderDelegation => Mode::HeaderDelegation {
                header: HeaderName::from_bytes(cfg.trusted_header.as_bytes())
                    .unwrap_or_else(|_| HeaderName::from_static("x-delegated-user")),
            },
        };
        Self { mode }
    }

    /// Validate the request and resolve the caller identity.
    pub fn authenticate<B>(&self, req: &Request<B>) -> Result<Identity, AuthError> {
        match &self.mode {
            Mode::None => Ok(Identity {
                caller: "anonymous".to_string(),
            }),
            Mode::Basic { callers, .. } => {
                let (caller, secret) = parse_basic(req.headers())?;
                verify_basic(callers, &caller, &secret)?;
                Ok(Identity { caller })
            }
            Mode::MutualTls => match req.extensions().get::<TlsPeerIdentity>() {
                Some(peer) => Ok(Identity {
                    caller: peer.0.clone(),
                }),
                None => Err(AuthError::MissingCredentials),
            },
            Mode::HeaderDelegation { header } => {
                let value = req
                    .headers()
                    .get(header)
                    .ok_or(AuthError::MissingCredentials)?;
                let caller = value
                    .to_str()
                    .map_err(|_| AuthError::InvalidCredentials)?
                    .trim();
                if caller.is_empty() {
                    return Err(AuthError::InvalidCredentials);
                }
                Ok(Identity {
                    caller: caller.to_string(),
                })
            }
        }
    }

    /// Coarse authorisation: any authenticated caller reaches any enabled
    /// target. A disabled target is soft-removed and therefore Forbidden.
    pub fn authorize(&self, _identity: &Identity, target: &Target) -> Result<(), AuthError> {
        if !target.enabled {
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }

    /// WWW-Authenticate challenge appropriate to the active mode, sent on
    /// 401 responses.
    pub fn challenge(&self) -> Option<String> {
        match &self.mode {
            Mode::Basic { realm, .. } => Some(format!("Basic realm=\"{}\"", realm)),
            _ => None,
        }
    }

    /// Front-side credential headers that must never travel upstream.
    pub fn stripped_headers(&self) -> Vec<HeaderName> {
        match &self.mode {
            Mode::Basic { .. } => vec![AUTHORIZATION],
            Mode::HeaderDelegation { header } => vec![header.clone()],
            Mode::None | Mode::MutualTls => Vec::new(),
        }
    }
}

fn parse_basic(headers: &HeaderMap) -> Result<(String, String), AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?;
    let value = header
        .to_str()
        .map_err(|_| AuthError::InvalidCredentials)?;
    let encoded = value
        .strip_prefix("Basic ")
        .ok_or(AuthError::MissingCredentials)?;

    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|_| AuthError::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredentials)?;

    match decoded.split_once(':') {
        Some((caller, secret)) => Ok((caller.to_string(), secret.to_string())),
        None => Err(AuthError::InvalidCredentials),
    }
}

fn verify_basic(
    callers: &HashMap<String, [u8; 32]>,
    caller: &str,
    secret: &str,
) -> Result<(), AuthError> {
    // Unknown callers are verified against a dummy digest so the comparison
    // cost does not reveal whether the caller name exists.
    static DUMMY: [u8; 32] = [0u8; 32];
    let expected = callers.get(caller);

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let presented: [u8; 32] = hasher.finalize().into();

    let matches = presented.ct_eq(expected.unwrap_or(&DUMMY));
    if expected.is_some() && bool::from(matches) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}
