//! Addon store (C4) — §4.4. Read-only view over `ManagedClusterAddOn`,
//! indexed by `(cluster, addon)`. Same trait-over-reflector shape as C3.

use async_trait::async_trait;
use kube::Resource;
use kube::api::Api;

use crate::error::Error;
use crate::types::ManagedClusterAddOn;

#[async_trait]
pub trait AddonStore: Send + Sync {
    /// A missing MCA is not an error (§4.4) — the reconciler treats `None`
    /// as "nothing to do" and returns without writes.
    async fn get(&self, cluster: &str, addon: &str) -> Result<Option<ManagedClusterAddOn>, Error>;
}

pub struct KubeAddonStore {
    client: kube::Client,
}

impl KubeAddonStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AddonStore for KubeAddonStore {
    async fn get(&self, cluster: &str, addon: &str) -> Result<Option<ManagedClusterAddOn>, Error> {
        let api: Api<ManagedClusterAddOn> = Api::namespaced(self.client.clone(), cluster);
        match api.get_opt(addon).await? {
            Some(mca) if mca.meta().deletion_timestamp.is_none() => Ok(Some(mca)),
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct FakeAddonStore {
    addons: std::collections::HashMap<(String, String), ManagedClusterAddOn>,
}

impl FakeAddonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cluster: &str, addon: &str, mca: ManagedClusterAddOn) {
        self.addons.insert((cluster.to_string(), addon.to_string()), mca);
    }
}

#[async_trait]
impl AddonStore for FakeAddonStore {
    async fn get(&self, cluster: &str, addon: &str) -> Result<Option<ManagedClusterAddOn>, Error> {
        Ok(self.addons.get(&(cluster.to_string(), addon.to_string())).cloned())
    }
}
