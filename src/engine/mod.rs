//! Admission Engine — the distributed sliding-window admission decision.
//!
//! Holds no per-key state itself; every call issues exactly one atomic
//! round trip to the coordination store (`crate::coordination`). The engine
//! is the only caller of that round trip — nothing upstream of `Admit`/
//! `Reconcile` may short-circuit ADMIT or DENY locally.

pub mod resolver;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::coordination::{CoordinationClient, ScriptOutcome, UsageSnapshot};
use crate::error::AdmitError;

pub use resolver::{ConfigResolver, RateLimitConfig, TierTables};

/// Per-request inputs to one admission decision, bundled so `Admit`'s
/// signature matches the spec 1:1: `Admit(key, est_in, est_out, now)`
/// plus the resolved config, which the handler already has from CR.
pub struct AdmitRequest<'a> {
    pub key: &'a str,
    pub config: RateLimitConfig,
    pub est_in: u64,
    pub est_out: u64,
    pub now: f64,
}

/// One of the three independently-enforced quota dimensions. Check order
/// (input, output, request) is fixed so denial reasons are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    InputTpm,
    OutputTpm,
    Rpm,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::InputTpm => "INPUT_TPM",
            Dimension::OutputTpm => "OUTPUT_TPM",
            Dimension::Rpm => "RPM",
        }
    }
}

/// Result of one admission decision.
#[derive(Debug, Clone)]
pub enum AdmissionDecision {
    Admitted {
        event_id: String,
        committed_input: u64,
        committed_output_estimate: u64,
    },
    Denied {
        reason: Dimension,
        retry_after_seconds: u64,
    },
}

/// Explicit state machine for one admission (§4.2). `admit()` holds a
/// local variable of this type and advances it at each step of the real
/// control flow — `Prepare` while minting the event id, `Decide` across
/// the coordination round trip, then `Admitted`/`Denied`/`Error` from the
/// actual outcome — rather than leaving the progression implicit in
/// comments. `Admitted` may later observe a `Reconciled` transition once
/// the handler reports actual output tokens; that transition is visible
/// only via counter sums, not via this enum (it is not re-entered into the
/// engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Prepare,
    Decide,
    Admitted,
    Denied,
    Error,
}

/// Generates event ids unique per admission: this node's identity plus a
/// monotonic per-process counter. Collisions across processes would need
/// both the same node id and the same counter value at the same instant,
/// which a restart resets — acceptable because the coordination store only
/// needs the id to be unique among events alive within one window.
pub struct EventIdGenerator {
    node_id: String,
    counter: AtomicU64,
}

impl EventIdGenerator {
    pub fn new(node_id: String) -> Self {
        Self {
            node_id,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", self.node_id, seq, uuid::Uuid::new_v4().simple())
    }
}

/// Monotonic-enough wall clock read, in fractional seconds since the Unix
/// epoch. `Admit`/`Reconcile` take this once per call, just before issuing
/// the coordination round trip.
pub fn now_seconds() -> f64 {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_secs_f64()
}

/// Computes the decision and the resulting `AdmissionState` from one
/// coordination-store reply. This is the transition `admit()` actually
/// runs on every call; pulling it out as a pure function lets a unit test
/// exercise the real Admitted/Denied branches without a coordination
/// store round trip.
fn decide(
    outcome: ScriptOutcome,
    event_id: String,
    est_in: u64,
    est_out: u64,
    now: f64,
    window_seconds: u64,
) -> (AdmissionDecision, AdmissionState) {
    match outcome {
        ScriptOutcome::Admit => (
            AdmissionDecision::Admitted {
                event_id,
                committed_input: est_in,
                committed_output_estimate: est_out,
            },
            AdmissionState::Admitted,
        ),
        ScriptOutcome::Deny {
            dimension,
            retry_at,
        } => {
            let retry_after = ((retry_at - now).ceil() as i64).clamp(1, window_seconds as i64);
            (
                AdmissionDecision::Denied {
                    reason: dimension,
                    retry_after_seconds: retry_after as u64,
                },
                AdmissionState::Denied,
            )
        }
    }
}

pub struct AdmissionEngine {
    coordination: CoordinationClient,
    event_ids: EventIdGenerator,
    window_seconds: u64,
}

impl AdmissionEngine {
    pub fn new(coordination: CoordinationClient, node_id: String, window_seconds: u64) -> Self {
        Self {
            coordination,
            event_ids: EventIdGenerator::new(node_id),
            window_seconds,
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Used by `/health`: reachability only, never a decision — §6 requires
    /// 503 the moment the CS stops answering, independent of any key's
    /// admission state.
    pub async fn is_coordination_healthy(&self) -> bool {
        self.coordination.ping().await.is_ok()
    }

    /// `Admit(key, est_in, est_out, now) -> AdmissionDecision`. Never admits
    /// on coordination failure — `CoordinationUnavailable` propagates as an
    /// error, it is not swallowed into an implicit admit.
    pub async fn admit(&self, req: AdmitRequest<'_>) -> Result<AdmissionDecision, AdmitError> {
        let AdmitRequest {
            key,
            config,
            est_in,
            est_out,
            now,
        } = req;

        if key.is_empty() {
            return Err(AdmitError::InvalidRequest("api key must not be empty".into()));
        }

        // PREPARE: mint the event id this admission will commit under.
        let mut state = AdmissionState::Prepare;
        let event_id = self.event_ids.next();

        // DECIDE: exactly one atomic round trip to the coordination store.
        state = AdmissionState::Decide;
        let started = std::time::Instant::now();
        let result = self
            .coordination
            .admit_batch(
                key,
                config.input_tpm,
                est_in,
                config.output_tpm,
                est_out,
                config.rpm,
                now,
                self.window_seconds,
                &event_id,
            )
            .await;
        metrics::histogram!("tpm_gate_coordination_round_trip_seconds", "op" => "admit")
            .record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                state = AdmissionState::Error;
                metrics::counter!("tpm_gate_coordination_errors_total", "op" => "admit").increment(1);
                tracing::warn!("engine: admit state={:?}, key={}, error={}", state, key, e);
                return Err(AdmitError::CoordinationUnavailable(e.to_string()));
            }
        };

        let (decision, final_state) =
            decide(outcome, event_id, est_in, est_out, now, self.window_seconds);
        state = final_state;

        match &decision {
            AdmissionDecision::Admitted { .. } => {
                metrics::counter!("tpm_gate_admissions_total", "outcome" => "admit").increment(1);
            }
            AdmissionDecision::Denied { reason, .. } => {
                metrics::counter!(
                    "tpm_gate_admissions_total",
                    "outcome" => "deny",
                    "dimension" => reason.as_str(),
                )
                .increment(1);
            }
        }
        tracing::debug!("engine: admit state={:?}, key={}", state, key);

        Ok(decision)
    }

    /// Read-only sums for `GET /v1/usage/{api_key}`. Never gates admission;
    /// just reports the counters' current state.
    pub async fn usage(&self, key: &str) -> Result<UsageSnapshot, AdmitError> {
        self.coordination
            .usage(key, now_seconds(), self.window_seconds)
            .await
            .map_err(|e| AdmitError::CoordinationUnavailable(e.to_string()))
    }

    /// `Reconcile(key, event_id, old_out, actual_out)`. No-op when equal.
    /// Failures are logged and dropped — the caller never blocks on this.
    pub async fn reconcile(&self, key: &str, event_id: &str, old_out: u64, actual_out: u64) {
        if old_out == actual_out {
            return;
        }

        let started = std::time::Instant::now();
        let result = self
            .coordination
            .reconcile(key, event_id, old_out, actual_out)
            .await;
        metrics::histogram!("tpm_gate_coordination_round_trip_seconds", "op" => "reconcile")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::counter!("tpm_gate_reconciles_total").increment(1);
            }
            Err(e) => {
                metrics::counter!("tpm_gate_coordination_errors_total", "op" => "reconcile")
                    .increment(1);
                tracing::warn!(
                    "engine: reconcile failed, key={}, event_id={}, error={}",
                    key,
                    event_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_as_str_matches_wire_names() {
        assert_eq!(Dimension::InputTpm.as_str(), "INPUT_TPM");
        assert_eq!(Dimension::OutputTpm.as_str(), "OUTPUT_TPM");
        assert_eq!(Dimension::Rpm.as_str(), "RPM");
    }

    #[test]
    fn event_ids_are_unique_and_carry_node_id() {
        let gen = EventIdGenerator::new("node-a".to_string());
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(a.starts_with("node-a-"));
        assert!(b.starts_with("node-a-"));
    }

    #[test]
    fn decide_reaches_admitted_state_on_admit_outcome() {
        let (decision, state) = decide(ScriptOutcome::Admit, "evt-1".to_string(), 100, 50, 1_000.0, 60);
        assert_eq!(state, AdmissionState::Admitted);
        match decision {
            AdmissionDecision::Admitted {
                event_id,
                committed_input,
                committed_output_estimate,
            } => {
                assert_eq!(event_id, "evt-1");
                assert_eq!(committed_input, 100);
                assert_eq!(committed_output_estimate, 50);
            }
            other => panic!("expected Admitted, got {:?}", other),
        }
    }

    #[test]
    fn decide_reaches_denied_state_on_deny_outcome() {
        let outcome = ScriptOutcome::Deny {
            dimension: Dimension::Rpm,
            retry_at: 1_030.0,
        };
        let (decision, state) = decide(outcome, "evt-1".to_string(), 100, 50, 1_000.0, 60);
        assert_eq!(state, AdmissionState::Denied);
        match decision {
            AdmissionDecision::Denied {
                reason,
                retry_after_seconds,
            } => {
                assert_eq!(reason, Dimension::Rpm);
                assert_eq!(retry_after_seconds, 30);
            }
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[test]
    fn decide_clamps_retry_after_into_window_bounds() {
        // retry_at in the past (clock skew, or the window itself) must
        // clamp up to 1s, never go to zero or negative.
        let past = ScriptOutcome::Deny {
            dimension: Dimension::InputTpm,
            retry_at: 990.0,
        };
        let (decision, state) = decide(past, "evt-1".to_string(), 100, 50, 1_000.0, 60);
        assert_eq!(state, AdmissionState::Denied);
        match decision {
            AdmissionDecision::Denied { retry_after_seconds, .. } => {
                assert_eq!(retry_after_seconds, 1)
            }
            other => panic!("expected Denied, got {:?}", other),
        }

        // retry_at far beyond the window must clamp down to window_seconds.
        let far = ScriptOutcome::Deny {
            dimension: Dimension::InputTpm,
            retry_at: 10_000.0,
        };
        let (decision, _) = decide(far, "evt-2".to_string(), 100, 50, 1_000.0, 60);
        match decision {
            AdmissionDecision::Denied { retry_after_seconds, .. } => {
                assert_eq!(retry_after_seconds, 60)
            }
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[test]
    fn now_seconds_is_monotonic_enough_for_back_to_back_reads() {
        let a = now_seconds();
        let b = now_seconds();
        assert!(b >= a);
    }
}
