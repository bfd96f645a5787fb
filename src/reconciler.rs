//! Reconciler (C5) — §4.5. Level-triggered: every reconcile rereads state
//! from the cache-backed C3/C4 and writes only what the evaluator decided.
//! Wiring follows `commands/reconcile.rs`'s `Controller`-based shape:
//! Prometheus metrics via `LazyLock`, structured `tracing` events, and an
//! `error_policy` that requeues with backoff.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use tracing::{info, warn};

use crate::addon_store::AddonStore;
use crate::error::Error;
use crate::evaluator;
use crate::queue::WorkQueueKey;
use crate::registry::AgentRegistry;
use crate::types::{
    HealthCheckMode, HealthCheckStatus, ManagedClusterAddOn, ProbeOutcome, Verdict, AVAILABLE_CONDITION_TYPE,
};
use crate::work_index::WorkIndex;

pub const FIELD_MANAGER: &str = "addon-health-core";
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// §4.6/spec.md:101 — conflict requeues escalate exponentially from the
/// low-millisecond range, capped near 16 minutes, instead of retrying a hot
/// key at a fixed interval forever.
const CONFLICT_BASE_BACKOFF: Duration = Duration::from_millis(100);
const CONFLICT_MAX_BACKOFF: Duration = Duration::from_secs(16 * 60);

/// Per-key conflict attempt counter backing the exponential backoff above.
/// `Action::requeue` only schedules a single delay — it never escalates a
/// repeated delay on its own — so the attempt count has to be tracked here.
pub struct ConflictBackoff {
    attempts: Mutex<HashMap<WorkQueueKey, u32>>,
}

impl ConflictBackoff {
    pub fn new() -> Self {
        Self { attempts: Mutex::new(HashMap::new()) }
    }

    /// Records another conflict for `key` and returns the delay to requeue
    /// after: doubles per attempt from `CONFLICT_BASE_BACKOFF`, capped at
    /// `CONFLICT_MAX_BACKOFF`.
    fn record_conflict(&self, key: WorkQueueKey) -> Duration {
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(key).or_insert(0);
        *count += 1;
        exponential_backoff(*count)
    }

    /// Clears the attempt count once a write for `key` succeeds, so a key
    /// that was flapping doesn't carry a stale long backoff forever.
    fn clear(&self, key: &WorkQueueKey) {
        self.attempts.lock().unwrap().remove(key);
    }
}

impl Default for ConflictBackoff {
    fn default() -> Self {
        Self::new()
    }
}

fn exponential_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(32);
    let millis = CONFLICT_BASE_BACKOFF.as_millis().saturating_mul(1u128 << shift);
    let capped = millis.min(CONFLICT_MAX_BACKOFF.as_millis());
    Duration::from_millis(capped as u64)
}

/* ============================= PROMETHEUS ============================= */

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("addonhealth_reconcile_total", "Total add-on reconciliation cycles")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RECONCILE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("addonhealth_reconcile_errors_total", "Total add-on reconciliation errors")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static VERDICTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("addonhealth_verdicts_total", "Available verdicts emitted, by status"),
        &["status"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "addonhealth_reconcile_duration_seconds",
        "Duration of each reconcile in seconds",
    ))
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

/// Force-init every metric so they appear on `/metrics` even before the
/// first reconcile runs, mirroring the teacher's `run()` startup sequence.
pub fn force_init_metrics() {
    LazyLock::force(&RECONCILE_TOTAL);
    LazyLock::force(&RECONCILE_ERRORS);
    LazyLock::force(&VERDICTS_TOTAL);
    LazyLock::force(&RECONCILE_DURATION);
}

/* ============================= CONTEXT ============================= */

pub struct ReconcilerContext {
    pub client: Client,
    pub registry: Arc<AgentRegistry>,
    pub work_index: Arc<dyn WorkIndex>,
    pub addon_store: Arc<dyn AddonStore>,
    pub conflict_backoff: ConflictBackoff,
}

/* ============================= RECONCILE ============================= */

/// Entry point the `Controller` drives. `mca` is the cache snapshot that
/// triggered this cycle; per §4.5 step 1 the reconciler still goes through
/// C4 (`ctx.addon_store`) for the read it acts on, so a stale trigger can
/// never cause it to act on since-deleted state.
pub async fn reconcile(mca: Arc<ManagedClusterAddOn>, ctx: Arc<ReconcilerContext>) -> Result<Action, Error> {
    let cluster = mca.namespace().unwrap_or_default();
    let addon = mca.name_any();

    RECONCILE_TOTAL.inc();
    let _timer = RECONCILE_DURATION.start_timer();

    info!(cluster = %cluster, addon = %addon, "reconcile_start");

    // ── §4.5 step 1: load MCA via C4 ──
    let Some(current) = ctx.addon_store.get(&cluster, &addon).await? else {
        info!(cluster = %cluster, addon = %addon, "reconcile_mca_not_found");
        return Ok(Action::await_change());
    };

    // ── §4.5 step 2/3: resolve descriptor via C1 ──
    let descriptor = ctx.registry.lookup(&addon);
    let health_prober = descriptor.as_ref().and_then(|d| d.health_prober.as_ref());

    if health_prober.is_none() {
        info!(cluster = %cluster, addon = %addon, "reconcile_no_prober_registered");
        return Ok(Action::await_change());
    }
    let health_prober = health_prober.unwrap();

    // ── §4.5 step 4: desired mode; full update if it differs ──
    let desired_mode = health_prober.mode();
    let current_mode = current.status.as_ref().and_then(|s| s.health_check.as_ref()).map(|h| h.mode).unwrap_or_default();

    if current_mode != desired_mode {
        return apply_mode_update(&ctx, &cluster, &current, desired_mode).await;
    }

    // ── §4.5 step 5: evaluate via C2 over works from C3 ──
    let works = ctx.work_index.list(&cluster, &addon).await?;
    let outcome = evaluator::evaluate(Some(health_prober), &works);

    match outcome {
        ProbeOutcome::Skip | ProbeOutcome::ModeOnly(_) => {
            info!(cluster = %cluster, addon = %addon, "reconcile_no_write_needed");
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        ProbeOutcome::Verdict(verdict) => apply_verdict_patch(&ctx, &cluster, &current, verdict).await,
    }
}

async fn apply_mode_update(
    ctx: &ReconcilerContext,
    cluster: &str,
    current: &ManagedClusterAddOn,
    desired_mode: HealthCheckMode,
) -> Result<Action, Error> {
    let name = current.name_any();
    let api: Api<ManagedClusterAddOn> = Api::namespaced(ctx.client.clone(), cluster);
    let key = WorkQueueKey::new(cluster, name.clone());

    let mut updated = current.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    status.health_check = Some(HealthCheckStatus { mode: desired_mode });

    let body = serde_json::to_vec(&updated)?;
    match api.replace_status(&name, &PostParams::default(), body).await {
        Ok(_) => {
            ctx.conflict_backoff.clear(&key);
            info!(cluster = %cluster, addon = %name, mode = %desired_mode, "mode_updated");
            Ok(Action::await_change())
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            let delay = ctx.conflict_backoff.record_conflict(key);
            info!(cluster = %cluster, addon = %name, delay_ms = delay.as_millis() as u64, "mode_update_conflict");
            Ok(Action::requeue(delay))
        }
        Err(e) => Err(e.into()),
    }
}

/// Builds the full `status.conditions` list after folding in `verdict`.
/// Pure (§7, P6): every condition except `Available` passes through
/// untouched, and `Available`'s `lastTransitionTime` only advances when its
/// `status` actually changes (P2) — the rest of `Available` (reason,
/// message, observedGeneration) is always refreshed.
fn build_conditions(existing_conditions: Vec<Condition>, verdict: &Verdict, generation: Option<i64>) -> Vec<Condition> {
    let previous_available = existing_conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE);

    let last_transition_time = match previous_available {
        Some(prev) if prev.status == verdict.status.as_str() => prev.last_transition_time.clone(),
        _ => Time(Utc::now()),
    };

    let mut conditions: Vec<Condition> =
        existing_conditions.into_iter().filter(|c| c.type_ != AVAILABLE_CONDITION_TYPE).collect();

    conditions.push(Condition {
        type_: AVAILABLE_CONDITION_TYPE.to_string(),
        status: verdict.status.as_str().to_string(),
        reason: verdict.reason.clone(),
        message: verdict.message.clone(),
        last_transition_time,
        observed_generation: generation,
    });

    conditions
}

async fn apply_verdict_patch(
    ctx: &ReconcilerContext,
    cluster: &str,
    current: &ManagedClusterAddOn,
    verdict: Verdict,
) -> Result<Action, Error> {
    let name = current.name_any();
    let api: Api<ManagedClusterAddOn> = Api::namespaced(ctx.client.clone(), cluster);
    let key = WorkQueueKey::new(cluster, name.clone());

    let existing_conditions = current.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    let conditions = build_conditions(existing_conditions, &verdict, current.metadata.generation);

    let patch = serde_json::json!({ "status": { "conditions": conditions } });

    match api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)).await {
        Ok(_) => {
            ctx.conflict_backoff.clear(&key);
            VERDICTS_TOTAL.with_label_values(&[verdict.status.as_str()]).inc();
            info!(
                cluster = %cluster,
                addon = %name,
                status = %verdict.status,
                reason = %verdict.reason,
                "status_patched"
            );
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            let delay = ctx.conflict_backoff.record_conflict(key);
            info!(cluster = %cluster, addon = %name, delay_ms = delay.as_millis() as u64, "status_patch_conflict");
            Ok(Action::requeue(delay))
        }
        Err(e) => Err(e.into()),
    }
}

/* ============================= ERROR POLICY ============================= */

pub fn error_policy(_mca: Arc<ManagedClusterAddOn>, error: &Error, _ctx: Arc<ReconcilerContext>) -> Action {
    RECONCILE_ERRORS.inc();
    warn!(error = %error, "reconcile_error");
    Action::requeue(ERROR_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthProber;

    #[test]
    fn current_mode_defaults_to_lease_when_status_absent() {
        let mca = ManagedClusterAddOn::new("test", Default::default());
        let mode = mca.status.as_ref().and_then(|s| s.health_check.as_ref()).map(|h| h.mode).unwrap_or_default();
        assert_eq!(mode, HealthCheckMode::Lease);
    }

    #[test]
    fn descriptor_with_none_prober_resolves_skip_not_modeonly() {
        let descriptor = crate::types::AgentDescriptor { addon_name: "test".to_string(), health_prober: None };
        assert!(descriptor.health_prober.is_none());
    }

    #[test]
    fn lease_descriptor_maps_to_lease_mode() {
        assert_eq!(HealthProber::Lease.mode(), HealthCheckMode::Lease);
    }

    #[test]
    fn error_kind_display_distinguishes_hub_and_patch_build() {
        let patch_err = Error::PatchBuild(serde_json::from_str::<()>("not json").unwrap_err());
        assert!(patch_err.to_string().contains("status patch"));
    }

    fn available(status: &str, last_transition: Time) -> Condition {
        Condition {
            type_: AVAILABLE_CONDITION_TYPE.to_string(),
            status: status.to_string(),
            reason: "Prev".to_string(),
            message: "prev".to_string(),
            last_transition_time: last_transition,
            observed_generation: None,
        }
    }

    fn other_condition() -> Condition {
        Condition {
            type_: "Progressing".to_string(),
            status: "True".to_string(),
            reason: "Rolling".to_string(),
            message: "rolling out".to_string(),
            last_transition_time: Time(Utc::now()),
            observed_generation: None,
        }
    }

    #[test]
    fn p2_identical_status_preserves_last_transition_time() {
        let stable_time = Time(Utc::now());
        let existing = vec![available("True", stable_time.clone())];
        let verdict = crate::types::Verdict::new(crate::types::ConditionStatus::True, "WorkAvailable", "all good");

        let conditions = build_conditions(existing, &verdict, None);
        let updated = conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE).unwrap();
        assert_eq!(updated.last_transition_time.0, stable_time.0);
    }

    #[test]
    fn p2_status_change_advances_last_transition_time() {
        let old_time = Time(Utc::now() - chrono::Duration::hours(1));
        let existing = vec![available("False", old_time.clone())];
        let verdict = crate::types::Verdict::new(crate::types::ConditionStatus::True, "WorkAvailable", "all good");

        let conditions = build_conditions(existing, &verdict, None);
        let updated = conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE).unwrap();
        assert_ne!(updated.last_transition_time.0, old_time.0);
    }

    #[test]
    fn p6_only_available_condition_is_mutated() {
        let existing = vec![other_condition(), available("False", Time(Utc::now()))];
        let verdict = crate::types::Verdict::new(crate::types::ConditionStatus::True, "WorkAvailable", "all good");

        let conditions = build_conditions(existing, &verdict, Some(3));
        assert_eq!(conditions.len(), 2);
        let progressing = conditions.iter().find(|c| c.type_ == "Progressing").unwrap();
        assert_eq!(progressing.reason, "Rolling");
        let available = conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE).unwrap();
        assert_eq!(available.status, "True");
        assert_eq!(available.observed_generation, Some(3));
    }

    #[test]
    fn conflict_backoff_escalates_per_attempt() {
        let backoff = ConflictBackoff::new();
        let key = WorkQueueKey::new("cluster1", "test");

        let first = backoff.record_conflict(key.clone());
        let second = backoff.record_conflict(key.clone());
        let third = backoff.record_conflict(key.clone());

        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(third, Duration::from_millis(400));
    }

    #[test]
    fn conflict_backoff_caps_at_sixteen_minutes() {
        let backoff = ConflictBackoff::new();
        let key = WorkQueueKey::new("cluster1", "test");

        let mut delay = Duration::ZERO;
        for _ in 0..40 {
            delay = backoff.record_conflict(key.clone());
        }

        assert_eq!(delay, CONFLICT_MAX_BACKOFF);
    }

    #[test]
    fn conflict_backoff_tracks_keys_independently() {
        let backoff = ConflictBackoff::new();
        let a = WorkQueueKey::new("cluster1", "a");
        let b = WorkQueueKey::new("cluster1", "b");

        backoff.record_conflict(a.clone());
        backoff.record_conflict(a.clone());
        let second_for_a = backoff.record_conflict(a);
        let first_for_b = backoff.record_conflict(b);

        assert_eq!(second_for_a, Duration::from_millis(800));
        assert_eq!(first_for_b, Duration::from_millis(100));
    }

    #[test]
    fn conflict_backoff_clear_resets_attempt_count() {
        let backoff = ConflictBackoff::new();
        let key = WorkQueueKey::new("cluster1", "test");

        backoff.record_conflict(key.clone());
        backoff.record_conflict(key.clone());
        backoff.clear(&key);

        let delay = backoff.record_conflict(key);
        assert_eq!(delay, Duration::from_millis(100));
    }
}
