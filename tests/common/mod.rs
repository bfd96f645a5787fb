use std::collections::BTreeMap;
use std::sync::Arc;

use addon_health_core::types::{
    FeedbackValue, HealthCheckMode, HealthCheckStatus, ManagedClusterAddOn, ManagedClusterAddOnStatus,
    ManifestCondition, ManifestResourceStatus, ManifestWork, ManifestWorkStatus, ResourceIdentifier,
    StatusFeedback, ADDON_NAME_LABEL, AVAILABLE_CONDITION_TYPE,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::ResourceExt;

pub fn make_mca(name: &str, namespace: &str, mode: Option<HealthCheckMode>) -> ManagedClusterAddOn {
    let mut mca = ManagedClusterAddOn::new(name, Default::default());
    mca.meta_mut().namespace = Some(namespace.to_string());
    mca.status = Some(ManagedClusterAddOnStatus {
        health_check: mode.map(|mode| HealthCheckStatus { mode }),
        conditions: vec![],
    });
    mca
}

pub fn make_work(name: &str, namespace: &str, addon: &str, available: Option<&str>) -> ManifestWork {
    let mut work = ManifestWork::new(name, Default::default());
    work.meta_mut().namespace = Some(namespace.to_string());
    let mut labels = BTreeMap::new();
    labels.insert(ADDON_NAME_LABEL.to_string(), addon.to_string());
    work.meta_mut().labels = Some(labels);

    let conditions = available
        .map(|status| {
            vec![Condition {
                type_: AVAILABLE_CONDITION_TYPE.to_string(),
                status: status.to_string(),
                reason: "test".to_string(),
                message: format!("work {name} is {status}"),
                last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
                observed_generation: None,
            }]
        })
        .unwrap_or_default();

    work.status = Some(ManifestWorkStatus { conditions, resource_status: None });
    work
}

pub fn with_feedback(mut work: ManifestWork, resource: &str, name: &str, namespace: &str, values: Vec<(&str, &str)>) -> ManifestWork {
    let feedback_values: Vec<FeedbackValue> =
        values.into_iter().map(|(n, v)| FeedbackValue { name: n.to_string(), value: v.to_string() }).collect();

    let manifest = ManifestCondition {
        resource_meta: ResourceIdentifier {
            resource: resource.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            group: None,
            api_version: None,
        },
        status_feedback: Some(StatusFeedback { values: feedback_values }),
    };

    let status = work.status.get_or_insert_with(Default::default);
    match &mut status.resource_status {
        Some(rs) => rs.manifests.push(manifest),
        None => status.resource_status = Some(ManifestResourceStatus { manifests: vec![manifest] }),
    }
    work
}

pub fn noop_health_check() -> Arc<dyn Fn(&ResourceIdentifier, &[FeedbackValue]) -> Result<(), String> + Send + Sync> {
    Arc::new(|_, _| Ok(()))
}
