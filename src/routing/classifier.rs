//! Request classification.
//!
//! # Responsibilities
//! - Extract the target id from the first non-empty path segment
//! - Carry the remaining path and raw query to the upstream verbatim
//! - Resolve the id against the registry
//!
//! # Design Decisions
//! - The proxy stays transparent to Redfish semantics: no schema coupling,
//!   one URL template `/<target_id>/redfish/v1/...`
//! - Path and query are forwarded byte-for-byte, percent-encoding included
//! - Absolute-form request URIs are rejected as malformed

use std::sync::Arc;

use axum::http::Uri;

use crate::targets::{Target, TargetRegistry};

/// Typed routing failure, mapped to 400/404 by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("empty target")]
    EmptyTarget,
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("malformed request")]
    MalformedRequest,
}

/// Outcome of classification: the resolved target and the exact
/// path-and-query to present upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub target: Arc<Target>,
    /// Upstream path with leading slash, plus the raw query when present.
    pub upstream_path_and_query: String,
}

/// Classify an incoming request URI against the registry.
pub fn classify(uri: &Uri, registry: &TargetRegistry) -> Result<RouteDecision, RoutingError> {
    // Absolute-form URIs (proxy-form requests) are not part of this surface.
    if uri.authority().is_some() || uri.scheme().is_some() {
        return Err(RoutingError::MalformedRequest);
    }

    let path = uri.path();
    let trimmed = path.strip_prefix('/').ok_or(RoutingError::MalformedRequest)?;
    if trimmed.is_empty() {
        return Err(RoutingError::EmptyTarget);
    }

    let (target_id, rest) = match trimmed.split_once('/') {
        Some((id, rest)) => (id, format!("/{}", rest)),
        None => (trimmed, "/".to_string()),
    };
    if target_id.is_empty() {
        return Err(RoutingError::EmptyTarget);
    }

    let target = registry
        .lookup(target_id)
        .ok_or_else(|| RoutingError::UnknownTarget(target_id.to_string()))?;

    let upstream_path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", rest, query),
        None => rest,
    };

    Ok(RouteDecision {
        target,
        upstream_path_and_query,
    })
}
