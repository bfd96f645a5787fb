//! Probe evaluator (C2) — §4.2. Pure, side-effect-free: no API calls, no
//! clock reads, no logging. A single `evaluate` entry point over the closed
//! four-variant `HealthProber` union, per Design Note "Dynamic dispatch
//! over prober type".

use crate::types::{
    ConditionStatus, FeedbackValue, HealthProber, ManifestWork, ProbeOutcome, ResourceIdentifier,
    Verdict, AVAILABLE_CONDITION_TYPE,
};

/// Top-level entry point. `health_prober` is `None` when the descriptor
/// itself is absent, or present-but-has-no-prober — both collapse to
/// `Skip` per §4.2's decision table's first row.
pub fn evaluate(health_prober: Option<&HealthProber>, relevant_works: &[ManifestWork]) -> ProbeOutcome {
    match health_prober {
        None => ProbeOutcome::Skip,
        Some(HealthProber::None) => ProbeOutcome::ModeOnly(health_prober.unwrap().mode()),
        Some(HealthProber::Lease) => ProbeOutcome::ModeOnly(HealthProber::Lease.mode()),
        Some(HealthProber::DeploymentAvailability) => {
            ProbeOutcome::Verdict(evaluate_work_aggregation(relevant_works))
        }
        Some(HealthProber::Work(None)) => ProbeOutcome::Verdict(evaluate_work_aggregation(relevant_works)),
        Some(HealthProber::Work(Some(prober))) => {
            ProbeOutcome::Verdict(evaluate_probe_fields(&prober.probe_fields, &prober.health_check, relevant_works))
        }
    }
}

/// §4.2 row for `DeploymentAvailability` / `Work` with no `WorkProber`:
/// empty → Unknown/WorkNotFound; all-True → True; any-False → False;
/// otherwise Unknown/WorkNotApplied.
fn evaluate_work_aggregation(relevant_works: &[ManifestWork]) -> Verdict {
    if relevant_works.is_empty() {
        return Verdict::new(ConditionStatus::Unknown, "WorkNotFound", "no ManifestWork found for this add-on");
    }

    let mut any_false: Option<String> = None;
    let mut all_true = true;

    for work in relevant_works {
        match work_available_status(work) {
            Some(ConditionStatus::True) => {}
            Some(ConditionStatus::False) if any_false.is_none() => {
                all_true = false;
                any_false = Some(work_available_message(work));
            }
            _ => all_true = false,
        }
    }

    if let Some(message) = any_false {
        return Verdict::new(ConditionStatus::False, "WorkApplyFailed", message);
    }
    if all_true {
        return Verdict::new(ConditionStatus::True, "WorkAvailable", "all ManifestWork are available");
    }
    Verdict::new(ConditionStatus::Unknown, "WorkNotApplied", "not all ManifestWork report availability yet")
}

fn work_available_status(work: &ManifestWork) -> Option<ConditionStatus> {
    work.status.as_ref()?.conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE).map(|c| {
        match c.status.as_str() {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    })
}

fn work_available_message(work: &ManifestWork) -> String {
    work.status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == AVAILABLE_CONDITION_TYPE))
        .map(|c| c.message.clone())
        .unwrap_or_default()
}

/// §4.2.1: `Work` prober with a `WorkProber`. Works are scanned in the
/// order given; per the Open Question's resolution, callers are expected
/// to pass `relevant_works` pre-sorted lexicographically by work name so
/// the "first match wins" rule is deterministic (see `work_index`).
fn evaluate_probe_fields(
    probe_fields: &[crate::types::ProbeField],
    health_check: &crate::types::HealthCheckFn,
    relevant_works: &[ManifestWork],
) -> Verdict {
    if relevant_works.is_empty() {
        return Verdict::new(ConditionStatus::Unknown, "NoProbeResult", "no ManifestWork found for this add-on");
    }

    let mut failures = Vec::new();

    for field in probe_fields {
        let Some((identifier, feedback)) = find_matching_manifest(&field.resource_identifier, relevant_works) else {
            return Verdict::new(
                ConditionStatus::Unknown,
                "NoProbeResult",
                format!("no manifest matched probe field {}/{}", field.resource_identifier.namespace, field.resource_identifier.name),
            );
        };

        if let Err(reason) = health_check(&identifier, &feedback) {
            failures.push(reason);
        }
    }

    if !failures.is_empty() {
        return Verdict::new(ConditionStatus::False, "ProbeUnavailable", failures.join("; "));
    }
    Verdict::new(ConditionStatus::True, "ProbeAvailable", "all probe fields reported healthy")
}

/// Linear scan, first match wins, per §4.2.1. `relevant_works` order
/// establishes the tie-break: lexicographic by work name, then manifest
/// index within a work (Design Note, Open Question).
fn find_matching_manifest(
    wanted: &ResourceIdentifier,
    relevant_works: &[ManifestWork],
) -> Option<(ResourceIdentifier, Vec<FeedbackValue>)> {
    for work in relevant_works {
        let Some(resource_status) = work.status.as_ref().and_then(|s| s.resource_status.as_ref()) else {
            continue;
        };
        for manifest in &resource_status.manifests {
            if wanted.matches(&manifest.resource_meta) {
                let feedback = manifest
                    .status_feedback
                    .as_ref()
                    .map(|f| f.values.clone())
                    .unwrap_or_default();
                return Some((manifest.resource_meta.clone(), feedback));
            }
        }
    }
    None
}
