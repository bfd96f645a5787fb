//! Data model shared by every component: the two hub-side CRDs (§3) and the
//! in-memory agent descriptor contract (§6).

use std::fmt;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/* ============================= LABELS ============================= */

/// Label a sibling controller stamps on every `ManifestWork` it creates for
/// an add-on. The work index (C3) filters on this.
pub const ADDON_NAME_LABEL: &str = "open-cluster-management.io/addon-name";

/// Condition type the core owns exclusively (§3 invariant 3, §6).
pub const AVAILABLE_CONDITION_TYPE: &str = "Available";

/* ============================= MANAGEDCLUSTERADDON ============================= */

/// `ManagedClusterAddOn` — one add-on's desired/observed state on one
/// managed cluster. Namespace is the cluster name; name is the add-on name.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ManagedClusterAddOn",
    plural = "managedclusteraddons",
    status = "ManagedClusterAddOnStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    /// Name of the add-on install namespace on the managed cluster.
    /// Not read by the core; carried for shape-fidelity with the real CRD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckStatus {
    pub mode: HealthCheckMode,
}

/// §3 invariant 1: `Lease → Lease`; everything else → `Customized`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum HealthCheckMode {
    #[default]
    Lease,
    Customized,
}

impl fmt::Display for HealthCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheckMode::Lease => write!(f, "Lease"),
            HealthCheckMode::Customized => write!(f, "Customized"),
        }
    }
}

/* ============================= MANIFESTWORK ============================= */

/// `ManifestWork` — a bundle of resources shipped to a managed cluster, with
/// back-reported status and per-resource feedback values (§3).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "work.open-cluster-management.io",
    version = "v1",
    kind = "ManifestWork",
    plural = "manifestworks",
    status = "ManifestWorkStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    /// Manifests this work ships. Opaque to the core — it never renders or
    /// mutates these; it only reads the feedback harvested from them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workload: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_status: Option<ManifestResourceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResourceStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<ManifestCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCondition {
    pub resource_meta: ResourceIdentifier,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_feedback: Option<StatusFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusFeedback {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FeedbackValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackValue {
    pub name: String,
    pub value: String,
}

/// Identifies one manifest shipped by a work: `{resource, name, namespace}`
/// plus an optional `group`/`api_version` used only when the probe field
/// specifies them (§4.2.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub resource: String,
    pub name: String,
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl ResourceIdentifier {
    /// True if `self` (a probe field's identifier) matches `other` (a
    /// manifest's identifier). `group`/`api_version` are compared only when
    /// `self` carries them — otherwise they're ignored, per §4.2.1.
    pub fn matches(&self, other: &ResourceIdentifier) -> bool {
        if self.resource != other.resource || self.name != other.name || self.namespace != other.namespace {
            return false;
        }
        if let Some(group) = &self.group
            && Some(group) != other.group.as_ref()
        {
            return false;
        }
        if let Some(api_version) = &self.api_version
            && Some(api_version) != other.api_version.as_ref()
        {
            return false;
        }
        true
    }
}

/* ============================= AGENT DESCRIPTOR ============================= */

/// The prober strategy an add-on author declares for their agent (§3, §4.2).
/// A closed tagged union — deliberately a sum type rather than open
/// polymorphism, so the decision table in §4.2 lives in one place.
#[derive(Clone)]
pub enum HealthProber {
    /// No probing at all: `ModeOnly(Customized)`, `Available` untouched.
    None,
    /// A sibling controller owns `Available` via a heartbeat lease.
    Lease,
    /// Aggregate over `ManifestWork` status, optionally refined by a
    /// `WorkProber` that probes specific resource feedback.
    Work(Option<WorkProber>),
    /// Aggregate purely over each work's own `Available` condition.
    DeploymentAvailability,
}

impl fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthProber::None => write!(f, "None"),
            HealthProber::Lease => write!(f, "Lease"),
            HealthProber::Work(p) => f.debug_tuple("Work").field(&p.is_some()).finish(),
            HealthProber::DeploymentAvailability => write!(f, "DeploymentAvailability"),
        }
    }
}

impl HealthProber {
    /// §3 invariant 1 / §4.5 step 4: the mode this prober type maps to.
    pub fn mode(&self) -> HealthCheckMode {
        match self {
            HealthProber::Lease => HealthCheckMode::Lease,
            HealthProber::None | HealthProber::Work(_) | HealthProber::DeploymentAvailability => {
                HealthCheckMode::Customized
            }
        }
    }
}

/// A `(resourceIdentifier, probeRules)` pair declared by the add-on author.
/// `probe_rules` is opaque to the core (it only matters to the renderer
/// that harvested the feedback, out of scope here) so it's kept as an
/// untyped bag for forward compatibility.
#[derive(Debug, Clone)]
pub struct ProbeField {
    pub resource_identifier: ResourceIdentifier,
    pub probe_rules: Vec<serde_json::Value>,
}

/// The `Work`-prober's declared probe fields plus a pure health-check
/// callback. The callback is a first-class value (Design Note "Callback as
/// a value") so add-on authors can close over whatever state they need.
#[derive(Clone)]
pub struct WorkProber {
    pub probe_fields: Vec<ProbeField>,
    pub health_check: HealthCheckFn,
}

/// `HealthCheck(identifier, feedback) -> Result<(), reason>`. Must be pure
/// and side-effect-free per §6 — the evaluator (C2) never retries or caches
/// its outcome across calls.
pub type HealthCheckFn =
    Arc<dyn Fn(&ResourceIdentifier, &[FeedbackValue]) -> Result<(), String> + Send + Sync>;

/// The registered descriptor for one add-on (§3, §4.1).
#[derive(Clone)]
pub struct AgentDescriptor {
    pub addon_name: String,
    pub health_prober: Option<HealthProber>,
}

/* ============================= VERDICT ============================= */

/// C2's output (§4.2): what the reconciler should do with the MCA.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// No descriptor, or descriptor has no prober: no write at all.
    Skip,
    /// Only the mode needs settling; `Available` is untouched.
    ModeOnly(HealthCheckMode),
    /// A full `Available` verdict to patch.
    Verdict(Verdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

impl Verdict {
    pub fn new(status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, reason: reason.into(), message: message.into() }
    }
}
