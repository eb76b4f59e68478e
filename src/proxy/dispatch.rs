//! Request dispatch.
//!
//! # Responsibilities
//! - Sequence one request through auth, classification, circuit check,
//!   upstream build, send, and response streaming
//! - Inject upstream credentials from the target snapshot
//! - Translate failures into proxy-originated responses
//!
//! # Request State Machine
//! ```text
//! RECEIVED → AUTH → CLASSIFY → CIRCUIT_CHECK → BUILD_UPSTREAM → SEND
//!     → STREAM_RESPONSE → DONE
//! ```
//! Failures exit early: auth and routing to 4xx, an open circuit to 503,
//! transport errors to 502, an expired deadline to 504.
//!
//! # Design Decisions
//! - Credentials come from the target snapshot the classifier resolved,
//!   never from anything the caller controls
//! - Bodies stream in both directions; only session-auth targets buffer
//!   small request bodies so one forced token refresh can replay them
//! - Circuit bookkeeping is guarded: a dispatch cancelled mid-flight
//!   releases an admitted half-open probe instead of wedging it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http_body_util::BodyExt;

use crate::observability::access_log::{CountedBody, EventScope, MeteredBody, Outcome};
use crate::observability::metrics;
use crate::proxy::error::ProxyError;
use crate::proxy::server::AppState;
use crate::resilience::{CircuitDecision, CircuitTracker};
use crate::routing::{classify, headers, RoutingError};
use crate::targets::{Credentials, Target};
use crate::upstream::UpstreamError;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// Drive one request through the dispatch state machine.
pub async fn dispatch(state: AppState, peer: SocketAddr, req: Request<Body>) -> Response<Body> {
    let correlation_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut scope = EventScope::new(correlation_id.clone(), req.method().clone());

    // AUTH
    let identity = match state.authenticator.authenticate(&req) {
        Ok(identity) => identity,
        Err(e) => return reject(&state, scope, &correlation_id, e.into()),
    };
    scope.set_caller(&identity.caller);

    // CLASSIFY
    let decision = match classify(req.uri(), &state.registry) {
        Ok(decision) => decision,
        Err(e) => return reject(&state, scope, &correlation_id, e.into()),
    };
    let target = decision.target.clone();
    scope.set_target(&target.id);

    if let Err(e) = state.authenticator.authorize(&identity, &target) {
        return reject(&state, scope, &correlation_id, e.into());
    }

    // CIRCUIT_CHECK
    if let CircuitDecision::Reject { retry_after } = state.circuits.check(&target.id) {
        return reject(
            &state,
            scope,
            &correlation_id,
            ProxyError::CircuitOpen {
                target: target.id.clone(),
                retry_after,
            },
        );
    }
    let mut circuit = CircuitGuard::new(&state.circuits, &target.id);

    match forward(
        &state,
        peer,
        &target,
        &decision.upstream_path_and_query,
        req,
        scope,
        &mut circuit,
        &correlation_id,
    )
    .await
    {
        Ok(response) => response,
        Err((scope, err)) => reject(&state, scope, &correlation_id, err),
    }
}

/// BUILD_UPSTREAM → SEND → STREAM_RESPONSE.
#[allow(clippy::too_many_arguments)]
async fn forward(
    state: &AppState,
    peer: SocketAddr,
    target: &Arc<Target>,
    upstream_path_and_query: &str,
    req: Request<Body>,
    mut scope: EventScope,
    circuit: &mut CircuitGuard<'_>,
    correlation_id: &str,
) -> Result<Response<Body>, (EventScope, ProxyError)> {
    let entry = match state.pool.client_for(target).await {
        Ok(entry) => entry,
        Err(e) => return Err((scope, ProxyError::Pool(e))),
    };

    let (parts, body) = req.into_parts();
    let method = parts.method;
    let mut upstream_headers = parts.headers;

    // Replay eligibility is judged on the original headers, before the
    // hop-by-hop sweep removes Transfer-Encoding.
    let replayable = target.uses_session_auth()
        && body_is_replayable(&upstream_headers, state.max_replay_body_bytes);

    headers::strip_hop_by_hop(&mut upstream_headers);
    headers::strip_front_credentials(&mut upstream_headers, &state.stripped_headers);
    headers::set_forwarded(&mut upstream_headers, peer, &state.forwarded_proto);
    upstream_headers.remove(HOST);
    if let Ok(host) = HeaderValue::from_str(&target.address) {
        upstream_headers.insert(HOST, host);
    }

    let uri: Uri = match format!(
        "{}://{}{}",
        target.scheme.as_str(),
        target.address,
        upstream_path_and_query
    )
    .parse()
    {
        Ok(uri) => uri,
        Err(_) => return Err((scope, ProxyError::Routing(RoutingError::MalformedRequest))),
    };

    // Request body: buffered for replay on session targets, streamed
    // otherwise.
    let mut replay: Option<Bytes> = None;
    let mut streamed: Option<Body> = None;
    if replayable {
        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                scope.add_bytes_in(bytes.len() as u64);
                replay = Some(bytes);
            }
            Err(_) => {
                // The front-side body stream broke under us.
                return Err((scope, ProxyError::Routing(RoutingError::MalformedRequest)));
            }
        }
    } else {
        streamed = Some(Body::new(CountedBody::new(body, scope.bytes_in_counter())));
    }

    let mut token: Option<String> = None;
    if let Some(session) = &entry.session {
        match session.token(&entry.client, target).await {
            Ok(t) => token = Some(t),
            Err(e) => {
                circuit.failure();
                return Err((scope, upstream_error(target, e)));
            }
        }
    }

    // SEND, with one retry after a forced token refresh on upstream 401.
    let deadline = Instant::now() + state.request_timeout;
    let send_started = Instant::now();
    let mut attempt = 0;
    let response = loop {
        attempt += 1;

        let body = match &replay {
            Some(bytes) => Body::from(bytes.clone()),
            None => streamed
                .take()
                .expect("streamed request body cannot be replayed"),
        };

        let mut request = match Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(body)
        {
            Ok(request) => request,
            Err(_) => {
                return Err((scope, ProxyError::Routing(RoutingError::MalformedRequest)))
            }
        };
        *request.headers_mut() = upstream_headers.clone();
        inject_credentials(request.headers_mut(), target, token.as_deref());

        let budget = per_attempt_budget(target, deadline);
        let response = match tokio::time::timeout(budget, entry.client.request(request)).await {
            Err(_) => {
                circuit.failure();
                return Err((scope, upstream_error(target, UpstreamError::HeaderTimeout)));
            }
            Ok(Err(e)) => {
                circuit.failure();
                return Err((scope, upstream_error(target, UpstreamError::from_client(&e))));
            }
            Ok(Ok(response)) => response,
        };

        if response.status() == StatusCode::UNAUTHORIZED && replay.is_some() && attempt == 1 {
            if let Some(session) = &entry.session {
                tracing::debug!(
                    target_id = %target.id,
                    "Upstream rejected session token, refreshing once"
                );
                match session.force_refresh(&entry.client, target).await {
                    Ok(t) => {
                        token = Some(t);
                        continue;
                    }
                    Err(e) => {
                        circuit.failure();
                        return Err((scope, upstream_error(target, e)));
                    }
                }
            }
        }

        break response;
    };

    metrics::record_upstream_latency(&target.id, send_started.elapsed().as_secs_f64());

    // STREAM_RESPONSE
    let status = response.status();
    scope.set_upstream_status(status.as_u16());
    if status.is_server_error() {
        circuit.failure();
    } else {
        circuit.success();
    }

    let (mut parts, body) = response.into_parts();
    headers::strip_hop_by_hop(&mut parts.headers);
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        parts.headers.insert(X_REQUEST_ID, value);
    }

    let outcome = if status.is_server_error() {
        Outcome::UpstreamError
    } else {
        Outcome::Ok
    };
    let metered = MeteredBody::new(body, scope, outcome);
    Ok(Response::from_parts(parts, Body::new(metered)))
}

/// A body can be replayed when its size is known and bounded, or when the
/// request carries no body at all.
fn body_is_replayable(headers: &HeaderMap, cap: usize) -> bool {
    if let Some(value) = headers.get(CONTENT_LENGTH) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|n| n <= cap)
            .unwrap_or(false);
    }
    !headers.contains_key(TRANSFER_ENCODING)
}

fn inject_credentials(headers: &mut HeaderMap, target: &Target, token: Option<&str>) {
    match &target.credentials {
        Credentials::Basic { username, secret } => {
            let encoded = BASE64.encode(format!("{}:{}", username, secret.expose()));
            if let Ok(mut value) = HeaderValue::from_str(&format!("Basic {}", encoded)) {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }
        Credentials::Session { .. } => {
            if let Some(token) = token {
                if let Ok(mut value) = HeaderValue::from_str(token) {
                    value.set_sensitive(true);
                    headers.insert(X_AUTH_TOKEN, value);
                }
            }
        }
    }
}

fn per_attempt_budget(target: &Target, deadline: Instant) -> Duration {
    let remaining = deadline.saturating_duration_since(Instant::now());
    target.timeouts.response_header.min(remaining)
}

fn upstream_error(target: &Target, source: UpstreamError) -> ProxyError {
    ProxyError::Upstream {
        target: target.id.clone(),
        source,
    }
}

/// Emit the event and build the proxy-originated error response.
fn reject(
    state: &AppState,
    scope: EventScope,
    correlation_id: &str,
    err: ProxyError,
) -> Response<Body> {
    tracing::debug!(correlation_id = %correlation_id, error = %err, "Request rejected");
    scope.finish(err.outcome());

    let challenge = state.authenticator.challenge();
    let mut response = err.into_response(challenge.as_deref());
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Resolves circuit bookkeeping exactly once. Dropping an unresolved guard
/// releases an admitted half-open probe so a cancelled dispatch cannot wedge
/// the circuit.
struct CircuitGuard<'a> {
    tracker: &'a CircuitTracker,
    target_id: String,
    resolved: bool,
}

impl<'a> CircuitGuard<'a> {
    fn new(tracker: &'a CircuitTracker, target_id: &str) -> Self {
        Self {
            tracker,
            target_id: target_id.to_string(),
            resolved: false,
        }
    }

    fn success(&mut self) {
        if !self.resolved {
            self.resolved = true;
            self.tracker.record_success(&self.target_id);
        }
    }

    fn failure(&mut self) {
        if !self.resolved {
            self.resolved = true;
            self.tracker.record_failure(&self.target_id);
        }
    }
}

impl Drop for CircuitGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.tracker.release_probe(&self.target_id);
        }
    }
}
