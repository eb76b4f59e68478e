//! Circuit breaker for target protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: target assumed down, requests fail fast
//! - Half-Open: testing if target recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold within window
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - Per-target circuit, local to the process (no cross-instance coordination)
//! - Fail fast in Open state with a Retry-After hint
//! - Single probe in Half-Open (prevents hammering a recovering BMC)
//! - A failure is a transport error, a deadline expiry, or an upstream 5xx;
//!   4xx responses never count

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;

/// Circuit tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct CircuitSettings {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Failures older than this no longer count as consecutive.
    pub window: Duration,
    /// Time the circuit stays open before admitting a probe.
    pub cooldown: Duration,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Externally visible circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Verdict for one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Dispatch normally.
    Allow,
    /// Fail fast; tell the caller when to try again.
    Reject { retry_after: Duration },
}

/// Consistent snapshot of one circuit, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitSnapshot {
    pub target_id: String,
    pub state: &'static str,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
struct Circuit {
    inner: Mutex<Inner>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }
}

/// Per-target circuit tracker. The sole writer of circuit state.
pub struct CircuitTracker {
    circuits: DashMap<String, Arc<Circuit>>,
    settings: CircuitSettings,
}

impl CircuitTracker {
    pub fn new(settings: CircuitSettings) -> Self {
        Self {
            circuits: DashMap::new(),
            settings,
        }
    }

    fn circuit(&self, target_id: &str) -> Arc<Circuit> {
        self.circuits
            .entry(target_id.to_string())
            .or_insert_with(|| Arc::new(Circuit::new()))
            .clone()
    }

    /// Consulted before dispatch. May admit a single probe when the
    /// cooldown has elapsed.
    pub fn check(&self, target_id: &str) -> CircuitDecision {
        let circuit = self.circuit(target_id);
        let mut inner = circuit.inner.lock().expect("circuit mutex poisoned");

        match inner.state {
            CircuitState::Closed => CircuitDecision::Allow,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.settings.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(target_id = %target_id, "Circuit half-open, admitting probe");
                    metrics::record_circuit_state(target_id, CircuitState::HalfOpen);
                    CircuitDecision::Allow
                } else {
                    CircuitDecision::Reject {
                        retry_after: retry_hint(self.settings.cooldown - elapsed),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    CircuitDecision::Reject {
                        retry_after: retry_hint(self.settings.cooldown),
                    }
                } else {
                    inner.probe_in_flight = true;
                    CircuitDecision::Allow
                }
            }
        }
    }

    /// Record a successful dispatch (headers received, status < 500).
    pub fn record_success(&self, target_id: &str) {
        let circuit = self.circuit(target_id);
        let mut inner = circuit.inner.lock().expect("circuit mutex poisoned");

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::info!(target_id = %target_id, "Circuit closed after successful probe");
                inner.state = CircuitState::Closed;
                inner.probe_in_flight = false;
                inner.consecutive_failures = 0;
                inner.last_failure_at = None;
                inner.opened_at = None;
                metrics::record_circuit_state(target_id, CircuitState::Closed);
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.last_failure_at = None;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed dispatch (transport error, deadline, or upstream 5xx).
    pub fn record_failure(&self, target_id: &str) {
        let circuit = self.circuit(target_id);
        let mut inner = circuit.inner.lock().expect("circuit mutex poisoned");
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::warn!(target_id = %target_id, "Probe failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.probe_in_flight = false;
                inner.opened_at = Some(now);
                inner.last_failure_at = Some(now);
                metrics::record_circuit_state(target_id, CircuitState::Open);
            }
            CircuitState::Closed => {
                let within_window = inner
                    .last_failure_at
                    .map(|at| now.duration_since(at) <= self.settings.window)
                    .unwrap_or(false);
                inner.consecutive_failures = if within_window {
                    inner.consecutive_failures + 1
                } else {
                    1
                };
                inner.last_failure_at = Some(now);

                if inner.consecutive_failures >= self.settings.failure_threshold {
                    tracing::warn!(
                        target_id = %target_id,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    metrics::record_circuit_state(target_id, CircuitState::Open);
                }
            }
            CircuitState::Open => {
                inner.last_failure_at = Some(now);
            }
        }
    }

    /// Release an admitted probe whose outcome never materialised (client
    /// aborted, or dispatch failed before the request was sent).
    pub fn release_probe(&self, target_id: &str) {
        let circuit = self.circuit(target_id);
        let mut inner = circuit.inner.lock().expect("circuit mutex poisoned");
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Snapshot every circuit, for the admin surface.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| {
                let inner = entry.value().inner.lock().expect("circuit mutex poisoned");
                CircuitSnapshot {
                    target_id: entry.key().clone(),
                    state: inner.state.as_str(),
                    consecutive_failures: inner.consecutive_failures,
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        snapshots
    }
}

/// Retry-After hints round up to whole seconds, never below one.
fn retry_hint(remaining: Duration) -> Duration {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    Duration::from_secs(secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(cooldown: Duration) -> CircuitTracker {
        CircuitTracker::new(CircuitSettings {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown,
        })
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let tracker = tracker(Duration::from_secs(30));

        for _ in 0..4 {
            tracker.record_failure("bmc-1");
            assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        }
        tracker.record_failure("bmc-1");

        match tracker.check("bmc-1") {
            CircuitDecision::Reject { retry_after } => {
                assert!(retry_after >= Duration::from_secs(1));
                assert!(retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let tracker = tracker(Duration::from_secs(30));

        for _ in 0..4 {
            tracker.record_failure("bmc-1");
        }
        tracker.record_success("bmc-1");
        tracker.record_failure("bmc-1");

        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        assert_eq!(tracker.snapshot()[0].consecutive_failures, 1);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let tracker = tracker(Duration::from_millis(0));

        for _ in 0..5 {
            tracker.record_failure("bmc-1");
        }

        // Cooldown of zero: next check transitions to half-open.
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        // Second caller is rejected while the probe is in flight.
        assert!(matches!(
            tracker.check("bmc-1"),
            CircuitDecision::Reject { .. }
        ));

        tracker.record_success("bmc-1");
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        assert_eq!(tracker.snapshot()[0].state, "closed");
    }

    #[test]
    fn test_probe_failure_reopens() {
        let tracker = tracker(Duration::from_millis(0));

        for _ in 0..5 {
            tracker.record_failure("bmc-1");
        }
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        tracker.record_failure("bmc-1");

        assert_eq!(tracker.snapshot()[0].state, "open");
    }

    #[test]
    fn test_released_probe_allows_next_caller() {
        let tracker = tracker(Duration::from_millis(0));

        for _ in 0..5 {
            tracker.record_failure("bmc-1");
        }
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
        assert!(matches!(
            tracker.check("bmc-1"),
            CircuitDecision::Reject { .. }
        ));

        tracker.release_probe("bmc-1");
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
    }

    #[test]
    fn test_stale_failures_fall_out_of_window() {
        let tracker = CircuitTracker::new(CircuitSettings {
            failure_threshold: 2,
            window: Duration::from_millis(0),
            cooldown: Duration::from_secs(30),
        });

        // With a zero window, failures are never consecutive.
        tracker.record_failure("bmc-1");
        std::thread::sleep(Duration::from_millis(2));
        tracker.record_failure("bmc-1");
        assert_eq!(tracker.check("bmc-1"), CircuitDecision::Allow);
    }

    #[test]
    fn test_circuits_are_per_target() {
        let tracker = tracker(Duration::from_secs(30));

        for _ in 0..5 {
            tracker.record_failure("bmc-1");
        }
        assert!(matches!(
            tracker.check("bmc-1"),
            CircuitDecision::Reject { .. }
        ));
        assert_eq!(tracker.check("bmc-2"), CircuitDecision::Allow);
    }
}
