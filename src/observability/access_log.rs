//! Per-request structured events.
//!
//! # Responsibilities
//! - Emit exactly one structured event per dispatched request
//! - Meter request and response bytes without buffering either stream
//! - Observe client aborts through body drop
//!
//! # Design Decisions
//! - The event scope is a drop guard: a dispatch future cancelled mid-flight
//!   still produces its event, with outcome client_abort
//! - Redfish payload content never appears in any event, only byte counts

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::Method;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::observability::metrics;

/// Final disposition of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    AuthDenied,
    RoutingError,
    CircuitOpen,
    UpstreamError,
    ClientAbort,
    PoolError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::AuthDenied => "auth_denied",
            Outcome::RoutingError => "routing_error",
            Outcome::CircuitOpen => "circuit_open",
            Outcome::UpstreamError => "upstream_error",
            Outcome::ClientAbort => "client_abort",
            Outcome::PoolError => "pool_error",
        }
    }
}

/// Event scope for one in-flight request.
///
/// Emits its event exactly once: explicitly via [`EventScope::finish`], or on
/// drop with outcome `client_abort` when the dispatch never completed.
pub struct EventScope {
    correlation_id: String,
    caller: String,
    target_id: Option<String>,
    method: Method,
    upstream_status: Option<u16>,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
    started_at: Instant,
    done: bool,
}

impl EventScope {
    pub fn new(correlation_id: String, method: Method) -> Self {
        Self {
            correlation_id,
            caller: "-".to_string(),
            target_id: None,
            method,
            upstream_status: None,
            bytes_in: Arc::new(AtomicU64::new(0)),
            bytes_out: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
            done: false,
        }
    }

    pub fn set_caller(&mut self, caller: &str) {
        self.caller = caller.to_string();
    }

    pub fn set_target(&mut self, target_id: &str) {
        self.target_id = Some(target_id.to_string());
    }

    pub fn set_upstream_status(&mut self, status: u16) {
        self.upstream_status = Some(status);
    }

    /// Shared counter for request-body bytes.
    pub fn bytes_in_counter(&self) -> Arc<AtomicU64> {
        self.bytes_in.clone()
    }

    /// Shared counter for response-body bytes.
    pub fn bytes_out_counter(&self) -> Arc<AtomicU64> {
        self.bytes_out.clone()
    }

    /// Record request bytes known up front (buffered bodies).
    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit the event with a final outcome.
    pub fn finish(mut self, outcome: Outcome) {
        self.emit(outcome);
    }

    fn emit(&mut self, outcome: Outcome) {
        if self.done {
            return;
        }
        self.done = true;

        let target = self.target_id.as_deref().unwrap_or("-");
        tracing::info!(
            correlation_id = %self.correlation_id,
            caller = %self.caller,
            target_id = %target,
            method = %self.method,
            upstream_status = self.upstream_status.unwrap_or(0),
            bytes_in = self.bytes_in.load(Ordering::Relaxed),
            bytes_out = self.bytes_out.load(Ordering::Relaxed),
            latency_ms = self.started_at.elapsed().as_millis() as u64,
            outcome = outcome.as_str(),
            "request"
        );
        metrics::record_request(target, outcome.as_str());
    }
}

impl Drop for EventScope {
    fn drop(&mut self) {
        // A dispatch that never finished was cancelled from the front side.
        self.emit(Outcome::ClientAbort);
    }
}

/// Request-body wrapper that counts streamed bytes into the event scope.
pub struct CountedBody<B> {
    inner: B,
    counter: Arc<AtomicU64>,
}

impl<B> CountedBody<B> {
    pub fn new(inner: B, counter: Arc<AtomicU64>) -> Self {
        Self { inner, counter }
    }
}

impl<B> HttpBody for CountedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.counter.fetch_add(data.len() as u64, Ordering::Relaxed);
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Response-body wrapper that counts streamed bytes and closes the event
/// scope when the stream ends. Dropping it mid-stream records the abort.
pub struct MeteredBody<B> {
    inner: B,
    bytes_out: Arc<AtomicU64>,
    scope: Option<EventScope>,
    outcome: Outcome,
}

impl<B> MeteredBody<B> {
    /// `outcome` is the disposition decided at header time (ok, or
    /// upstream_error for a passed-through 5xx).
    pub fn new(inner: B, scope: EventScope, outcome: Outcome) -> Self {
        let bytes_out = scope.bytes_out_counter();
        Self {
            inner,
            bytes_out,
            scope: Some(scope),
            outcome,
        }
    }
}

impl<B> HttpBody for MeteredBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes_out
                        .fetch_add(data.len() as u64, Ordering::Relaxed);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(scope) = this.scope.take() {
                    scope.finish(Outcome::UpstreamError);
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(scope) = this.scope.take() {
                    scope.finish(this.outcome);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_counted_body_counts_bytes() {
        let counter = Arc::new(AtomicU64::new(0));
        let body = CountedBody::new(
            http_body_util::Full::new(Bytes::from_static(b"hello world")),
            counter.clone(),
        );

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"hello world");
        assert_eq!(counter.load(Ordering::Relaxed), 11);
    }

    #[tokio::test]
    async fn test_metered_body_counts_and_completes() {
        let scope = EventScope::new("cid-1".into(), Method::GET);
        let bytes_out = scope.bytes_out_counter();
        let body = MeteredBody::new(
            http_body_util::Full::new(Bytes::from_static(b"payload")),
            scope,
            Outcome::Ok,
        );

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"payload");
        assert_eq!(bytes_out.load(Ordering::Relaxed), 7);
    }
}
