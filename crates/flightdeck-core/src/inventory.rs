//! Cached view of the running stacks
//!
//! Listing and describing every stack is slow, so the result is kept until
//! [`StackInventory::invalidate`] is called. The orchestrator invalidates
//! after each operation that creates or deletes stacks.

use crate::appliance::ApplianceKind;
use crate::error::{EngineError, Result};
use crate::model::{Appliance, Cluster, ClusterNetwork, ComputeGroup, Domain, DomainStatus, Master};
use flightdeck_cloud::{NAME_PREFIX, RetryGate, StackApi, StackDescriptor, StackStatus, tags};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Snapshot = Arc<Vec<StackDescriptor>>;

pub struct StackInventory {
    stacks: Arc<dyn StackApi>,
    gate: RetryGate,
    flight: Mutex<Option<Snapshot>>,
    all: Mutex<Option<Snapshot>>,
}

impl StackInventory {
    pub fn new(stacks: Arc<dyn StackApi>, gate: RetryGate) -> Self {
        Self {
            stacks,
            gate,
            flight: Mutex::new(None),
            all: Mutex::new(None),
        }
    }

    /// Drop the cached listings
    pub async fn invalidate(&self) {
        *self.flight.lock().await = None;
        *self.all.lock().await = None;
    }

    async fn load(&self, flight_only: bool) -> Result<Vec<StackDescriptor>> {
        let stacks = &self.stacks;
        let statuses = StackStatus::running();
        let summaries = self.gate.execute(|| stacks.list_stacks(&statuses)).await?;

        let mut described = Vec::with_capacity(summaries.len());
        for summary in summaries
            .iter()
            .filter(|s| !flight_only || s.name.starts_with(NAME_PREFIX))
        {
            let name = summary.name.as_str();
            match self.gate.execute(|| stacks.describe_stack(name)).await {
                Ok(stack) => described.push(stack),
                Err(e) => warn!(stack = name, "Failed to describe stack: {}", e),
            }
        }
        debug!(count = described.len(), flight_only, "Loaded stack inventory");
        Ok(described)
    }

    /// Running stacks named `flight-*`
    pub async fn flight_stacks(&self) -> Result<Snapshot> {
        let mut cached = self.flight.lock().await;
        if let Some(snapshot) = cached.as_ref() {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(self.load(true).await?);
        *cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Every running stack in the region
    pub async fn all_stacks(&self) -> Result<Snapshot> {
        let mut cached = self.all.lock().await;
        if let Some(snapshot) = cached.as_ref() {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(self.load(false).await?);
        *cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn domains(&self) -> Result<Vec<Domain>> {
        Ok(self
            .flight_stacks()
            .await?
            .iter()
            .filter_map(|stack| Domain::from_stack(stack.clone()))
            .collect())
    }

    /// First domain found, for commands that do not name one
    pub async fn default_domain(&self) -> Result<Domain> {
        self.domains()
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::NoDomains)
    }

    /// Clusters and appliances running in `domain`
    pub async fn domain_status(&self, domain: &Domain) -> Result<DomainStatus> {
        let mut status = DomainStatus {
            has_internet_access: domain.has_internet_access(),
            vpn_connection: domain.vpn_connection().map(str::to_string),
            peer_vpc: domain.peer_vpc().map(str::to_string),
            peer_vpc_cidr_block: domain.peer_vpc_cidr_block().map(str::to_string),
            ..DomainStatus::default()
        };

        let stacks = self.flight_stacks().await?;
        for stack in stacks
            .iter()
            .filter(|s| s.tag(tags::DOMAIN) == Some(domain.name.as_str()))
        {
            match stack.stack_type() {
                Some(kind @ ("master" | "network" | "compute")) => {
                    let Some(name) = stack.tag(tags::CLUSTER) else {
                        warn!(stack = %stack.name, "Cluster stack without cluster tag");
                        continue;
                    };
                    let cluster = status
                        .clusters
                        .entry(name.to_string())
                        .or_insert_with(|| Cluster::new(name, Some(&domain.name)));
                    match kind {
                        "master" => {
                            cluster.master = Some(Master {
                                stack: stack.clone(),
                            })
                        }
                        "network" => match ClusterNetwork::from_stack(stack.clone()) {
                            Some(network) => cluster.network = Some(network),
                            None => warn!(stack = %stack.name, "Network stack without index tag"),
                        },
                        _ => cluster
                            .compute_groups
                            .push(ComputeGroup::from_stack(stack.clone())),
                    }
                }
                Some("appliance") => {
                    let name = stack.tag(tags::APPLIANCE).unwrap_or_default();
                    match name.parse::<ApplianceKind>() {
                        Ok(kind) => {
                            status.appliances.insert(
                                name.to_string(),
                                Appliance {
                                    kind,
                                    stack: stack.clone(),
                                },
                            );
                        }
                        Err(e) => warn!(stack = %stack.name, "Skipping appliance: {}", e),
                    }
                }
                _ => {}
            }
        }
        Ok(status)
    }

    /// Standalone clusters
    pub async fn solo_status(&self) -> Result<DomainStatus> {
        let mut status = DomainStatus::default();
        for stack in self.flight_stacks().await?.iter() {
            if stack.stack_type() != Some("solo") {
                continue;
            }
            let name = stack.tag(tags::CLUSTER).unwrap_or_default();
            let mut cluster = Cluster::new(name, None);
            cluster.master = Some(Master {
                stack: stack.clone(),
            });
            status.clusters.insert(name.to_string(), cluster);
        }
        Ok(status)
    }

    async fn cluster_stacks(
        &self,
        stack_type: &str,
        domain: &str,
        cluster: &str,
    ) -> Result<Vec<StackDescriptor>> {
        Ok(self
            .flight_stacks()
            .await?
            .iter()
            .filter(|s| {
                s.stack_type() == Some(stack_type)
                    && s.tag(tags::CLUSTER) == Some(cluster)
                    && s.tag(tags::DOMAIN) == Some(domain)
            })
            .cloned()
            .collect())
    }

    pub async fn component_stacks(&self, domain: &str, cluster: &str) -> Result<Vec<StackDescriptor>> {
        self.cluster_stacks("component", domain, cluster).await
    }

    pub async fn compute_group_stacks(
        &self,
        domain: &str,
        cluster: &str,
    ) -> Result<Vec<StackDescriptor>> {
        self.cluster_stacks("compute", domain, cluster).await
    }

    /// Flight stacks whose `flight:expiry` is at or before `now` (unix seconds)
    pub async fn expired_stacks(&self, now: i64) -> Result<Vec<StackDescriptor>> {
        Ok(self
            .flight_stacks()
            .await?
            .iter()
            .filter(|s| {
                s.tag(tags::EXPIRY)
                    .and_then(|e| e.parse::<i64>().ok())
                    .is_some_and(|expiry| expiry <= now)
            })
            .cloned()
            .collect())
    }

    /// Stacks not launched by Flightdeck
    pub async fn other_stacks(&self) -> Result<Vec<StackDescriptor>> {
        Ok(self
            .all_stacks()
            .await?
            .iter()
            .filter(|s| s.stack_type().is_none())
            .cloned()
            .collect())
    }
}
