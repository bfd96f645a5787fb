//! Work queue (C6) — §4.6. The `Controller`'s built-in scheduler already
//! provides per-key dedup, serialization, and exponential backoff (§5), so
//! this module only keeps the pure mapping from watch events to queue
//! keys — independently testable without a live watch stream, the same
//! split the teacher draws between `governance`'s pure scoring and
//! `reconcile.rs`'s `Controller` wiring.

use crate::types::ADDON_NAME_LABEL;

/// A dedup key: `(cluster-namespace, addon-name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkQueueKey {
    pub cluster: String,
    pub addon: String,
}

impl WorkQueueKey {
    pub fn new(cluster: impl Into<String>, addon: impl Into<String>) -> Self {
        Self { cluster: cluster.into(), addon: addon.into() }
    }
}

/// MCA add/update/delete always maps directly to its own key (§4.6).
pub fn enqueue_for_mca(namespace: &str, name: &str) -> WorkQueueKey {
    WorkQueueKey::new(namespace, name)
}

/// MW add/update/delete: derive the addon name from the add-on-name label;
/// if it's absent, the event is dropped (no key to enqueue).
pub fn enqueue_for_work(namespace: &str, labels: &std::collections::BTreeMap<String, String>) -> Option<WorkQueueKey> {
    labels.get(ADDON_NAME_LABEL).map(|addon| WorkQueueKey::new(namespace, addon))
}
