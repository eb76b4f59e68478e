//! Proxy error taxonomy and HTTP mapping.
//!
//! Errors are classified where they originate (routing, auth, pool,
//! upstream) and surface here; the dispatcher alone turns them into HTTP
//! responses. Error payloads carry at most a code, a short reason, and the
//! target id — never an upstream URL, header, or credential.

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};

use crate::auth::AuthError;
use crate::observability::Outcome;
use crate::routing::RoutingError;
use crate::upstream::{PoolError, UpstreamError};

/// Marker header distinguishing proxy-originated responses from upstream
/// responses.
pub const X_PROXY_ORIGIN: HeaderName = HeaderName::from_static("x-proxy-origin");

/// Anything that stops a dispatch short of streaming an upstream response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("circuit open for target '{target}'")]
    CircuitOpen {
        target: String,
        retry_after: Duration,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("upstream failure for target '{target}': {source}")]
    Upstream {
        target: String,
        source: UpstreamError,
    },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Routing(RoutingError::EmptyTarget)
            | ProxyError::Routing(RoutingError::MalformedRequest) => StatusCode::BAD_REQUEST,
            ProxyError::Routing(RoutingError::UnknownTarget(_)) => StatusCode::NOT_FOUND,
            ProxyError::Auth(AuthError::MissingCredentials)
            | ProxyError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            ProxyError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            ProxyError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream { source, .. } => match source {
                UpstreamError::HeaderTimeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Routing(RoutingError::EmptyTarget) => "empty_target",
            ProxyError::Routing(RoutingError::UnknownTarget(_)) => "unknown_target",
            ProxyError::Routing(RoutingError::MalformedRequest) => "malformed_request",
            ProxyError::Auth(AuthError::MissingCredentials) => "missing_credentials",
            ProxyError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            ProxyError::Auth(AuthError::Forbidden) => "forbidden",
            ProxyError::CircuitOpen { .. } => "circuit_open",
            ProxyError::Pool(_) => "target_misconfigured",
            ProxyError::Upstream { source, .. } => match source {
                UpstreamError::HeaderTimeout => "upstream_timeout",
                _ => "upstream_unreachable",
            },
        }
    }

    /// Short human-readable reason. Deliberately free of upstream detail.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::Routing(RoutingError::EmptyTarget) => "empty target",
            ProxyError::Routing(RoutingError::UnknownTarget(_)) => "unknown target",
            ProxyError::Routing(RoutingError::MalformedRequest) => "malformed request",
            ProxyError::Auth(AuthError::MissingCredentials) => "missing credentials",
            ProxyError::Auth(AuthError::InvalidCredentials) => "invalid credentials",
            ProxyError::Auth(AuthError::Forbidden) => "forbidden",
            ProxyError::CircuitOpen { .. } => "circuit open",
            ProxyError::Pool(_) => "target misconfigured",
            ProxyError::Upstream { source, .. } => match source {
                UpstreamError::HeaderTimeout => "upstream timed out",
                _ => "upstream transport error",
            },
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            ProxyError::Routing(RoutingError::UnknownTarget(id)) => Some(id),
            ProxyError::CircuitOpen { target, .. } => Some(target),
            ProxyError::Pool(PoolError::TlsMaterial { id, .. }) => Some(id),
            ProxyError::Upstream { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ProxyError::Routing(_) => Outcome::RoutingError,
            ProxyError::Auth(_) => Outcome::AuthDenied,
            ProxyError::CircuitOpen { .. } => Outcome::CircuitOpen,
            ProxyError::Pool(_) => Outcome::PoolError,
            ProxyError::Upstream { .. } => Outcome::UpstreamError,
        }
    }

    /// Build the proxy-originated HTTP response for this error.
    ///
    /// `challenge` is the WWW-Authenticate value for the active auth mode,
    /// attached to 401 responses.
    pub fn into_response(self, challenge: Option<&str>) -> Response<Body> {
        let status = self.status();

        let mut builder = Response::builder()
            .status(status)
            .header(X_PROXY_ORIGIN, "true")
            .header(CONTENT_TYPE, "application/json");

        if let ProxyError::CircuitOpen { retry_after, .. } = &self {
            builder = builder.header(RETRY_AFTER, retry_after.as_secs().to_string());
        }
        if status == StatusCode::UNAUTHORIZED {
            if let Some(challenge) = challenge {
                if let Ok(value) = HeaderValue::from_str(challenge) {
                    builder = builder.header(WWW_AUTHENTICATE, value);
                }
            }
        }

        let payload = match self.target_id() {
            Some(target) => serde_json::json!({
                "code": self.code(),
                "reason": self.reason(),
                "target": target,
            }),
            None => serde_json::json!({
                "code": self.code(),
                "reason": self.reason(),
            }),
        };

        builder
            .body(Body::from(payload.to_string()))
            .unwrap_or_else(|_| {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                response
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::from(RoutingError::EmptyTarget).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::from(RoutingError::UnknownTarget("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::from(AuthError::MissingCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::from(AuthError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::Upstream {
                target: "bmc-1".into(),
                source: UpstreamError::HeaderTimeout,
            }
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::Upstream {
                target: "bmc-1".into(),
                source: UpstreamError::ConnectFailed("refused".into()),
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_circuit_response_carries_retry_after() {
        let err = ProxyError::CircuitOpen {
            target: "bmc-1".into(),
            retry_after: Duration::from_secs(30),
        };
        let response = err.into_response(None);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "30");
        assert_eq!(response.headers().get(&X_PROXY_ORIGIN).unwrap(), "true");
    }

    #[test]
    fn test_unauthorized_response_carries_challenge() {
        let err = ProxyError::from(AuthError::MissingCredentials);
        let response = err.into_response(Some("Basic realm=\"bmc-fleet\""));

        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"bmc-fleet\""
        );
    }

    #[test]
    fn test_reasons_never_leak_transport_detail() {
        let err = ProxyError::Upstream {
            target: "bmc-1".into(),
            source: UpstreamError::ConnectFailed(
                "tcp connect error to https://10.0.0.1 with Authorization".into(),
            ),
        };
        assert_eq!(err.reason(), "upstream transport error");
    }
}
