//! Agent registry (C1) — §4.1. Copy-on-write snapshot over the registered
//! descriptor set: reads never block on the rare `register`/`unregister`.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::AgentDescriptor;

pub struct AgentRegistry {
    inner: ArcSwap<HashMap<String, Arc<AgentDescriptor>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { inner: ArcSwap::from_pointee(HashMap::new()) }
    }

    /// Register (or replace) a descriptor. Invariant 4 (§3) — at most one
    /// descriptor per add-on name active at any instant — is upheld by the
    /// caller serializing calls to this method; the registry itself only
    /// guarantees the swap is atomic.
    pub fn register(&self, descriptor: AgentDescriptor) {
        let name = descriptor.addon_name.clone();
        let descriptor = Arc::new(descriptor);
        loop {
            let current = self.inner.load();
            let mut next: HashMap<String, Arc<AgentDescriptor>> = (**current).clone();
            next.insert(name.clone(), descriptor.clone());
            let prev = self.inner.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&prev, &current) {
                break;
            }
        }
    }

    pub fn unregister(&self, addon_name: &str) {
        loop {
            let current = self.inner.load();
            if !current.contains_key(addon_name) {
                return;
            }
            let mut next: HashMap<String, Arc<AgentDescriptor>> = (**current).clone();
            next.remove(addon_name);
            let prev = self.inner.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&prev, &current) {
                break;
            }
        }
    }

    /// §4.1: "if an addon has no descriptor, the reconciler treats it as
    /// out of scope" — a plain snapshot load, no locking.
    pub fn lookup(&self, addon_name: &str) -> Option<Arc<AgentDescriptor>> {
        self.inner.load().get(addon_name).cloned()
    }

    pub fn iter(&self) -> Vec<Arc<AgentDescriptor>> {
        self.inner.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthProber;

    fn descriptor(name: &str, prober: Option<HealthProber>) -> AgentDescriptor {
        AgentDescriptor { addon_name: name.to_string(), health_prober: prober }
    }

    #[test]
    fn lookup_missing_returns_none() {
        let registry = AgentRegistry::new();
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn register_then_lookup_roundtrips() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("app", Some(HealthProber::Lease)));
        let found = registry.lookup("app").expect("registered descriptor");
        assert_eq!(found.addon_name, "app");
        assert!(matches!(found.health_prober, Some(HealthProber::Lease)));
    }

    #[test]
    fn register_replaces_existing_descriptor() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("app", Some(HealthProber::Lease)));
        registry.register(descriptor("app", Some(HealthProber::None)));
        let found = registry.lookup("app").expect("registered descriptor");
        assert!(matches!(found.health_prober, Some(HealthProber::None)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_descriptor() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("app", Some(HealthProber::Lease)));
        registry.unregister("app");
        assert!(registry.lookup("app").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_missing_is_a_noop() {
        let registry = AgentRegistry::new();
        registry.unregister("nope");
        assert!(registry.is_empty());
    }

    #[test]
    fn iter_reflects_all_registered_descriptors() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("a", None));
        registry.register(descriptor("b", Some(HealthProber::DeploymentAvailability)));
        let mut names: Vec<_> = registry.iter().iter().map(|d| d.addon_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
