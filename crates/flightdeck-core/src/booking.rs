//! Domain and cluster records, and the network index allocator
//!
//! Booking reads a snapshot of the domain's bookings, picks the lowest free
//! index and commits it with a conditional "add if absent" write. The scan
//! is stale by the time the write lands, so concurrent bookers can pick the
//! same index; the store lets exactly one of them win. Losers rescan and try
//! again, up to a bounded number of attempts.

use crate::error::Result;
use crate::network::NetworkIndex;
use flightdeck_cloud::{ClusterEntity, CloudError, DomainEntity, EntityStore, RetryGate};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Booking attempts before a conflict is surfaced
pub const DEFAULT_BOOKING_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct BookingRegistry {
    store: Arc<dyn EntityStore>,
    gate: RetryGate,
    max_attempts: u32,
    tables: Arc<OnceCell<()>>,
}

impl BookingRegistry {
    pub fn new(store: Arc<dyn EntityStore>, gate: RetryGate) -> Self {
        Self {
            store,
            gate,
            max_attempts: DEFAULT_BOOKING_ATTEMPTS,
            tables: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Backing tables are created on first use
    async fn ready(&self) -> Result<&Arc<dyn EntityStore>> {
        self.tables
            .get_or_try_init(|| async {
                self.gate.execute(|| self.store.ensure_tables()).await
            })
            .await?;
        Ok(&self.store)
    }

    /// Record a domain's prefix without disturbing its bookings
    pub async fn save_domain(&self, name: &str, prefix: &str) -> Result<()> {
        let store = self.ready().await?;
        self.gate
            .execute(|| store.set_domain_prefix(name, prefix))
            .await?;
        debug!(domain = name, "Saved domain record");
        Ok(())
    }

    pub async fn load_domain(&self, name: &str) -> Result<Option<DomainEntity>> {
        let store = self.ready().await?;
        Ok(self.gate.execute(|| store.get_domain(name)).await?)
    }

    pub async fn delete_domain(&self, name: &str) -> Result<()> {
        let store = self.ready().await?;
        self.gate.execute(|| store.delete_domain(name)).await?;
        Ok(())
    }

    /// Claim the lowest free network index of `domain`
    pub async fn book_network(&self, domain: &str) -> Result<NetworkIndex> {
        let store = self.ready().await?;
        let mut contested = None;

        for attempt in 1..=self.max_attempts {
            let entity = self
                .gate
                .execute(|| store.get_domain(domain))
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("Domain record '{}' not found", domain)))?;

            let candidate = NetworkIndex::all()
                .find(|i| !entity.net_bookings.contains(&i.get()))
                .ok_or_else(|| CloudError::NoNetworksAvailable(domain.to_string()))?;

            match self
                .gate
                .execute(|| store.add_net_booking(domain, candidate.get()))
                .await
            {
                Ok(()) => {
                    info!(domain, index = candidate.get(), "Booked network");
                    return Ok(candidate);
                }
                Err(CloudError::ConditionFailed(reason)) => {
                    warn!(
                        domain,
                        index = candidate.get(),
                        attempt,
                        "Network booking lost a race: {}",
                        reason
                    );
                    contested = Some(candidate);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::BookingConflict {
            domain: domain.to_string(),
            index: contested.map(NetworkIndex::get).unwrap_or_default(),
        }
        .into())
    }

    /// Give a booked index back to the pool
    pub async fn release_network(&self, domain: &str, index: NetworkIndex) -> Result<()> {
        let store = self.ready().await?;
        let not_booked = || CloudError::NetworkNotBooked {
            domain: domain.to_string(),
            index: index.get(),
        };

        let entity = self.gate.execute(|| store.get_domain(domain)).await?;
        if !entity.is_some_and(|e| e.net_bookings.contains(&index.get())) {
            return Err(not_booked().into());
        }

        match self
            .gate
            .execute(|| store.remove_net_booking(domain, index.get()))
            .await
        {
            Ok(()) => {
                info!(domain, index = index.get(), "Released network");
                Ok(())
            }
            Err(CloudError::ConditionFailed(_)) => Err(not_booked().into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_cluster(&self, cluster: &ClusterEntity) -> Result<()> {
        let store = self.ready().await?;
        self.gate.execute(|| store.put_cluster(cluster)).await?;
        Ok(())
    }

    pub async fn load_cluster(&self, name: &str) -> Result<Option<ClusterEntity>> {
        let store = self.ready().await?;
        Ok(self.gate.execute(|| store.get_cluster(name)).await?)
    }

    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        let store = self.ready().await?;
        self.gate.execute(|| store.delete_cluster(name)).await?;
        Ok(())
    }

    /// Adjust a cluster's compute group count, ignoring unknown clusters
    pub async fn adjust_group_count(&self, name: &str, delta: i64) -> Result<()> {
        let store = self.ready().await?;
        self.gate
            .execute(|| store.add_group_count(name, delta))
            .await?;
        Ok(())
    }
}
