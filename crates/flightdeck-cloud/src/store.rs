//! Persistent entity store for domains and clusters

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

/// Table holding [`DomainEntity`] records
pub const DOMAINS_TABLE: &str = "FlightDomains";
/// Table holding [`ClusterEntity`] records
pub const CLUSTERS_TABLE: &str = "FlightClusters";

/// Persisted domain record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainEntity {
    pub name: String,
    pub prefix: String,
    /// Booked network indices, each in `0..128`
    #[serde(default)]
    pub net_bookings: BTreeSet<u8>,
}

impl DomainEntity {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            net_bookings: BTreeSet::new(),
        }
    }
}

/// Persisted cluster record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterEntity {
    pub name: String,
    pub domain: String,
    pub network_index: u8,
    pub group_count: u32,
}

/// Entity store with conditional set updates.
///
/// `add_net_booking` and `remove_net_booking` must succeed only when the
/// index is still absent (respectively present) at commit time.
/// `set_domain_prefix` and `add_group_count` touch a single attribute so
/// they never overwrite a concurrent booking or count change.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create backing tables if missing; existing tables are not an error
    async fn ensure_tables(&self) -> Result<()>;

    async fn put_domain(&self, domain: &DomainEntity) -> Result<()>;

    async fn get_domain(&self, name: &str) -> Result<Option<DomainEntity>>;

    async fn delete_domain(&self, name: &str) -> Result<()>;

    /// Set the domain's prefix, creating the record if missing. Bookings
    /// are left as they are.
    async fn set_domain_prefix(&self, name: &str, prefix: &str) -> Result<()>;

    /// Add `index` to the domain's bookings if it is not already there.
    /// Fails with `CloudError::ConditionFailed` otherwise.
    async fn add_net_booking(&self, domain: &str, index: u8) -> Result<()>;

    /// Remove `index` from the domain's bookings if it is there.
    /// Fails with `CloudError::ConditionFailed` otherwise.
    async fn remove_net_booking(&self, domain: &str, index: u8) -> Result<()>;

    async fn put_cluster(&self, cluster: &ClusterEntity) -> Result<()>;

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterEntity>>;

    async fn delete_cluster(&self, name: &str) -> Result<()>;

    /// Add `delta` to a cluster's group count, flooring at zero. Unknown
    /// clusters are ignored.
    async fn add_group_count(&self, name: &str, delta: i64) -> Result<()>;
}

/// Registry contents shared by the in-memory and file-backed stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub domains: HashMap<String, DomainEntity>,
    #[serde(default)]
    pub clusters: HashMap<String, ClusterEntity>,
}

impl Registry {
    pub(crate) fn add_booking(&mut self, domain: &str, index: u8) -> Result<()> {
        let entity = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainEntity::new(domain, ""));
        if !entity.net_bookings.insert(index) {
            return Err(CloudError::ConditionFailed(format!(
                "network {} already booked in {}",
                index, domain
            )));
        }
        Ok(())
    }

    pub(crate) fn set_prefix(&mut self, name: &str, prefix: &str) {
        self.domains
            .entry(name.to_string())
            .or_insert_with(|| DomainEntity::new(name, ""))
            .prefix = prefix.to_string();
    }

    pub(crate) fn add_group_count(&mut self, name: &str, delta: i64) {
        if let Some(cluster) = self.clusters.get_mut(name) {
            let count = (i64::from(cluster.group_count) + delta).max(0);
            cluster.group_count = u32::try_from(count).unwrap_or(u32::MAX);
        }
    }

    pub(crate) fn remove_booking(&mut self, domain: &str, index: u8) -> Result<()> {
        let removed = self
            .domains
            .get_mut(domain)
            .map(|d| d.net_bookings.remove(&index))
            .unwrap_or(false);
        if !removed {
            return Err(CloudError::ConditionFailed(format!(
                "network {} not booked in {}",
                index, domain
            )));
        }
        Ok(())
    }
}

/// In-memory store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    registry: Mutex<Registry>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> Registry {
        self.registry.lock().await.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn ensure_tables(&self) -> Result<()> {
        Ok(())
    }

    async fn put_domain(&self, domain: &DomainEntity) -> Result<()> {
        let mut registry = self.registry.lock().await;
        registry.domains.insert(domain.name.clone(), domain.clone());
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> Result<Option<DomainEntity>> {
        Ok(self.registry.lock().await.domains.get(name).cloned())
    }

    async fn delete_domain(&self, name: &str) -> Result<()> {
        self.registry.lock().await.domains.remove(name);
        Ok(())
    }

    async fn set_domain_prefix(&self, name: &str, prefix: &str) -> Result<()> {
        self.registry.lock().await.set_prefix(name, prefix);
        Ok(())
    }

    async fn add_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.registry.lock().await.add_booking(domain, index)
    }

    async fn remove_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.registry.lock().await.remove_booking(domain, index)
    }

    async fn put_cluster(&self, cluster: &ClusterEntity) -> Result<()> {
        let mut registry = self.registry.lock().await;
        registry.clusters.insert(cluster.name.clone(), cluster.clone());
        Ok(())
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterEntity>> {
        Ok(self.registry.lock().await.clusters.get(name).cloned())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.registry.lock().await.clusters.remove(name);
        Ok(())
    }

    async fn add_group_count(&self, name: &str, delta: i64) -> Result<()> {
        self.registry.lock().await.add_group_count(name, delta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conditional_add() {
        let store = MemoryEntityStore::new();
        store.put_domain(&DomainEntity::new("lab", "lab")).await.unwrap();

        store.add_net_booking("lab", 4).await.unwrap();
        let err = store.add_net_booking("lab", 4).await.unwrap_err();
        assert!(matches!(err, CloudError::ConditionFailed(_)));

        let domain = store.get_domain("lab").await.unwrap().unwrap();
        assert!(domain.net_bookings.contains(&4));
    }

    #[tokio::test]
    async fn test_conditional_remove() {
        let store = MemoryEntityStore::new();
        store.put_domain(&DomainEntity::new("lab", "lab")).await.unwrap();

        let err = store.remove_net_booking("lab", 7).await.unwrap_err();
        assert!(matches!(err, CloudError::ConditionFailed(_)));

        store.add_net_booking("lab", 7).await.unwrap();
        store.remove_net_booking("lab", 7).await.unwrap();
        let domain = store.get_domain("lab").await.unwrap().unwrap();
        assert!(domain.net_bookings.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_update_keeps_bookings() {
        let store = MemoryEntityStore::new();
        store.set_domain_prefix("lab", "lb").await.unwrap();
        store.add_net_booking("lab", 2).await.unwrap();

        store.set_domain_prefix("lab", "lab").await.unwrap();
        let domain = store.get_domain("lab").await.unwrap().unwrap();
        assert_eq!(domain.prefix, "lab");
        assert!(domain.net_bookings.contains(&2));
    }

    #[tokio::test]
    async fn test_group_count_floors_at_zero() {
        let store = MemoryEntityStore::new();
        store
            .put_cluster(&ClusterEntity {
                name: "hpc".into(),
                domain: "lab".into(),
                network_index: 0,
                group_count: 1,
            })
            .await
            .unwrap();

        store.add_group_count("hpc", 2).await.unwrap();
        assert_eq!(store.get_cluster("hpc").await.unwrap().unwrap().group_count, 3);
        store.add_group_count("hpc", -7).await.unwrap();
        assert_eq!(store.get_cluster("hpc").await.unwrap().unwrap().group_count, 0);
        store.add_group_count("ghost", 1).await.unwrap();
        assert!(store.get_cluster("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cluster_round_trip() {
        let store = MemoryEntityStore::new();
        let cluster = ClusterEntity {
            name: "hpc".into(),
            domain: "lab".into(),
            network_index: 3,
            group_count: 1,
        };
        store.put_cluster(&cluster).await.unwrap();
        assert_eq!(store.get_cluster("hpc").await.unwrap(), Some(cluster));
        store.delete_cluster("hpc").await.unwrap();
        assert_eq!(store.get_cluster("hpc").await.unwrap(), None);
    }
}
