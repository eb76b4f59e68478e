//! Redfish session token management.
//!
//! # Responsibilities
//! - Log into a target's session service and cache the issued X-Auth-Token
//! - Serve the cached token until it expires or is force-refreshed
//!
//! # Design Decisions
//! - One token cache per client entry, so a rebuilt client starts clean
//! - Acquisition is lazy: no login happens until the first dispatch
//! - An upstream 401 triggers exactly one forced refresh, driven by the
//!   dispatcher

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{Method, Request};
use tokio::sync::Mutex;

use crate::targets::{Credentials, Target};
use crate::upstream::pool::UpstreamClient;
use crate::upstream::UpstreamError;

/// Conservative lifetime for cached tokens. BMC session services commonly
/// expire sessions after 30 minutes of inactivity.
const TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";

struct CachedToken {
    token: String,
    obtained_at: Instant,
}

/// Per-target cache of the Redfish session token.
pub struct SessionTokens {
    state: Mutex<Option<CachedToken>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Return the cached token, logging in first if none is held or the
    /// cached one has aged out.
    pub async fn token(
        &self,
        client: &UpstreamClient,
        target: &Target,
    ) -> Result<String, UpstreamError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if cached.obtained_at.elapsed() < TOKEN_TTL {
                return Ok(cached.token.clone());
            }
        }

        let token = login(client, target).await?;
        *state = Some(CachedToken {
            token: token.clone(),
            obtained_at: Instant::now(),
        });
        Ok(token)
    }

    /// Discard the cached token and log in again. Used after an upstream
    /// 401 rejected the token the cache was holding.
    pub async fn force_refresh(
        &self,
        client: &UpstreamClient,
        target: &Target,
    ) -> Result<String, UpstreamError> {
        let mut state = self.state.lock().await;
        *state = None;

        let token = login(client, target).await?;
        *state = Some(CachedToken {
            token: token.clone(),
            obtained_at: Instant::now(),
        });
        Ok(token)
    }
}

impl Default for SessionTokens {
    fn default() -> Self {
        Self::new()
    }
}

async fn login(client: &UpstreamClient, target: &Target) -> Result<String, UpstreamError> {
    let (username, secret) = match &target.credentials {
        Credentials::Session { username, secret } => (username.as_str(), secret.expose()),
        Credentials::Basic { .. } => {
            return Err(UpstreamError::SessionLogin(
                "target does not use session credentials".to_string(),
            ))
        }
    };

    let uri = format!(
        "{}://{}{}",
        target.scheme.as_str(),
        target.address,
        SESSIONS_PATH
    );
    let payload =
        serde_json::json!({ "UserName": username, "Password": secret }).to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri(&uri)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .body(Body::from(payload))
        .map_err(|e| UpstreamError::SessionLogin(format!("building login request: {}", e)))?;

    tracing::debug!(target_id = %target.id, "Logging into Redfish session service");

    let response = client
        .request(request)
        .await
        .map_err(|e| UpstreamError::from_client(&e))?;

    if !response.status().is_success() {
        return Err(UpstreamError::SessionLogin(format!(
            "session service returned {}",
            response.status()
        )));
    }

    response
        .headers()
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or_else(|| {
            UpstreamError::SessionLogin("session service sent no X-Auth-Token".to_string())
        })
}
