use super::{Orchestrator, Session};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ProgressEvent, emit};
use crate::model::{Cluster, ClusterDetails, ClusterNetwork, ComputeGroup, Domain, Master};
use crate::naming;
use crate::network::NetworkIndex;
use crate::params::{
    LaunchContext, LaunchParameters, ParameterSet, ParameterSetKind, load_parameter_file,
    parameters_for, resolve_cluster_parameters,
};
use flightdeck_cloud::{AutoscalingGroup, ClusterEntity, CloudError, StackDescriptor, tags};
use flightdeck_config::Configuration;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const NETWORK_TEMPLATE: &str = "cluster-network.json";
const MASTER_TEMPLATE: &str = "cluster-master.json";
const COMPUTE_TEMPLATE: &str = "cluster-compute.json";
const SOLO_TEMPLATE: &str = "solo-cluster.json";

/// Stack resource type backing a compute group
const AUTOSCALING_RESOURCE: &str = "AWS::AutoScaling::AutoScalingGroup";

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Compute queue created once the master is up
    pub queue: Option<String>,
    pub queue_options: QueueOptions,
}

#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Explicit parameter table instead of the configured `cluster-compute` set
    pub params_file: Option<PathBuf>,
    /// Unix timestamp after which the queue may be reaped
    pub expiry: Option<i64>,
}

fn cluster_parameters(
    config: &Configuration,
    kind: ParameterSetKind,
    file: Option<&Path>,
    ctx: &LaunchContext<'_>,
) -> Result<LaunchParameters> {
    let set = parameters_for(config, kind, file)?;
    Ok(resolve_cluster_parameters(config, &set, ctx))
}

fn qualified(domain: &str, cluster: &str) -> String {
    format!("{}/{}", domain, cluster)
}

impl Orchestrator {
    /// Launch a domain-attached cluster: network, master, then the
    /// optional initial queue, strictly in that order.
    pub async fn launch_cluster(
        &self,
        domain: &str,
        name: &str,
        options: &LaunchOptions,
        sink: &EventSink,
    ) -> Result<Cluster> {
        let domain = self.ready_domain(domain).await?;
        let session = self
            .open_session(&naming::cluster_channel(&domain.name, name), sink)
            .await?;
        info!(domain = %domain.name, cluster = name, "Launching cluster");

        let result = self.build_cluster(&session, &domain, name, options).await;
        self.finish(session, result, sink).await
    }

    async fn build_cluster(
        &self,
        session: &Session,
        domain: &Domain,
        name: &str,
        options: &LaunchOptions,
    ) -> Result<Cluster> {
        let d = domain.name.as_str();
        let index = self.bookings.book_network(d).await?;
        // Recorded before anything is created so a failed launch can still be destroyed
        self.bookings
            .save_cluster(&ClusterEntity {
                name: name.to_string(),
                domain: d.to_string(),
                network_index: index.get(),
                group_count: 0,
            })
            .await?;

        let mut network = ClusterNetwork { index, stack: None };
        let params = cluster_parameters(
            &self.config,
            ParameterSetKind::ClusterNetwork,
            None,
            &LaunchContext::new(name)
                .with_domain(domain)
                .with_network(&network),
        )?;
        let request = self
            .stack_request(&naming::network_stack(d, name), NETWORK_TEMPLATE, "network", Some(d))
            .with_tag(tags::CLUSTER, name)
            .with_tag(tags::NETWORK, index.to_string())
            .with_parameters(params);
        network.stack = Some(self.create_stack(session, request).await?);

        let params = cluster_parameters(
            &self.config,
            ParameterSetKind::ClusterMaster,
            None,
            &LaunchContext::new(name)
                .with_domain(domain)
                .with_network(&network),
        )?;
        let request = self
            .stack_request(&naming::master_stack(d, name), MASTER_TEMPLATE, "master", Some(d))
            .with_tag(tags::CLUSTER, name)
            .with_parameters(params);
        let master = Master {
            stack: self.create_stack(session, request).await?,
        };

        let mut cluster = Cluster::new(name, Some(d));
        if let Some(queue) = options.queue.as_deref() {
            let ctx = LaunchContext::new(name)
                .with_domain(domain)
                .with_network(&network)
                .with_master(&master);
            let group = self
                .create_compute_group(session, &ctx, d, queue, &options.queue_options)
                .await?;
            cluster.compute_groups.push(group);
        }
        cluster.network = Some(network);
        cluster.master = Some(master);
        Ok(cluster)
    }

    /// Launch a standalone cluster as a single stack
    pub async fn launch_solo_cluster(&self, name: &str, sink: &EventSink) -> Result<Cluster> {
        let stack_name = naming::solo_stack(name);
        let session = self.open_session(&stack_name, sink).await?;
        info!(cluster = name, "Launching solo cluster");

        let result = async {
            let params = cluster_parameters(
                &self.config,
                ParameterSetKind::Solo,
                None,
                &LaunchContext::new(name),
            )?;
            let request = self
                .stack_request(&stack_name, SOLO_TEMPLATE, "solo", None)
                .with_tag(tags::CLUSTER, name)
                .with_parameters(params);
            let stack = self.create_stack(&session, request).await?;
            let mut cluster = Cluster::new(name, None);
            cluster.master = Some(Master { stack });
            Ok::<_, EngineError>(cluster)
        }
        .await;

        self.finish(session, result, sink).await
    }

    async fn create_compute_group(
        &self,
        session: &Session,
        ctx: &LaunchContext<'_>,
        domain: &str,
        queue: &str,
        options: &QueueOptions,
    ) -> Result<ComputeGroup> {
        let mut config = (*self.config).clone();
        if config.setting("compute-group-label").is_none() {
            config.set_setting("compute-group-label", queue);
        }
        let params = cluster_parameters(
            &config,
            ParameterSetKind::ClusterCompute,
            options.params_file.as_deref(),
            ctx,
        )?;

        let mut request = self
            .stack_request(
                &naming::compute_stack(domain, ctx.cluster, queue),
                COMPUTE_TEMPLATE,
                "compute",
                Some(domain),
            )
            .with_tag(tags::CLUSTER, ctx.cluster)
            .with_tag(tags::QUEUE, queue)
            .with_parameters(params);
        if let Some(expiry) = options.expiry {
            request = request.with_tag(tags::EXPIRY, expiry.to_string());
        }

        let stack = self.create_stack(session, request).await?;
        self.bookings.adjust_group_count(ctx.cluster, 1).await?;
        Ok(ComputeGroup::from_stack(stack))
    }

    async fn load_network(&self, domain: &str, cluster: &str) -> Result<ClusterNetwork> {
        self.find_stack(&naming::network_stack(domain, cluster))
            .await?
            .and_then(ClusterNetwork::from_stack)
            .ok_or_else(|| EngineError::ClusterNotFound(qualified(domain, cluster)))
    }

    async fn load_master(&self, domain: &str, cluster: &str) -> Result<Master> {
        self.find_stack(&naming::master_stack(domain, cluster))
            .await?
            .map(|stack| Master { stack })
            .ok_or_else(|| EngineError::ClusterNotFound(qualified(domain, cluster)))
    }

    /// Add a compute queue to a running cluster
    pub async fn add_queue(
        &self,
        domain: &str,
        cluster: &str,
        queue: &str,
        options: &QueueOptions,
        sink: &EventSink,
    ) -> Result<ComputeGroup> {
        let domain = self.ready_domain(domain).await?;
        let d = domain.name.as_str();
        let network = self.load_network(d, cluster).await?;
        let master = self.load_master(d, cluster).await?;

        let session = self
            .open_session(&naming::cluster_channel(d, cluster), sink)
            .await?;
        info!(domain = d, cluster, queue, "Adding queue");

        let ctx = LaunchContext::new(cluster)
            .with_domain(&domain)
            .with_network(&network)
            .with_master(&master);
        let result = self
            .create_compute_group(&session, &ctx, d, queue, options)
            .await;
        self.finish(session, result, sink).await
    }

    /// Remove a compute queue from a running cluster
    pub async fn destroy_queue(
        &self,
        domain: &str,
        cluster: &str,
        queue: &str,
        sink: &EventSink,
    ) -> Result<()> {
        let stack_name = naming::compute_stack(domain, cluster, queue);
        if self.find_stack(&stack_name).await?.is_none() {
            return Err(EngineError::QueueNotFound {
                cluster: qualified(domain, cluster),
                queue: queue.to_string(),
            });
        }

        let session = self
            .open_session(&naming::cluster_channel(domain, cluster), sink)
            .await?;
        info!(domain, cluster, queue, "Removing queue");

        let result = async {
            self.delete_stack(&stack_name).await?;
            self.bookings.adjust_group_count(cluster, -1).await
        }
        .await;
        self.finish(session, result, sink).await
    }

    /// Attach a component stack built from `<type>.json`.
    ///
    /// Components only take parameters from an explicit file; they are
    /// resolved against the cluster's network and master.
    pub async fn expand_cluster(
        &self,
        domain: &str,
        cluster: &str,
        component_type: &str,
        component_name: Option<&str>,
        params_file: Option<&Path>,
        sink: &EventSink,
    ) -> Result<StackDescriptor> {
        let domain = self.ready_domain(domain).await?;
        let d = domain.name.as_str();
        let network = self.load_network(d, cluster).await?;
        let master = self.load_master(d, cluster).await?;
        let set = match params_file {
            Some(path) => load_parameter_file(path)?,
            None => ParameterSet::new(),
        };

        let session = self
            .open_session(&naming::cluster_channel(d, cluster), sink)
            .await?;
        let stack_name = naming::component_stack(d, cluster, component_type, component_name);
        info!(stack = %stack_name, "Expanding cluster");

        let result = async {
            let ctx = LaunchContext::new(cluster)
                .with_domain(&domain)
                .with_network(&network)
                .with_master(&master);
            let params = resolve_cluster_parameters(&self.config, &set, &ctx);
            let request = self
                .stack_request(
                    &stack_name,
                    &format!("{}.json", component_type),
                    "component",
                    Some(d),
                )
                .with_tag(tags::CLUSTER, cluster)
                .with_parameters(params);
            self.create_stack(&session, request).await
        }
        .await;
        self.finish(session, result, sink).await
    }

    /// Destroy a component stack
    pub async fn reduce_cluster(
        &self,
        domain: &str,
        cluster: &str,
        component_type: &str,
        component_name: Option<&str>,
        sink: &EventSink,
    ) -> Result<()> {
        let stack_name = naming::component_stack(domain, cluster, component_type, component_name);
        if self.find_stack(&stack_name).await?.is_none() {
            return Err(CloudError::NotFound(format!(
                "Component '{}' not found on cluster: {}",
                naming::component_id(component_type, component_name),
                qualified(domain, cluster)
            ))
            .into());
        }

        let session = self
            .open_session(&naming::cluster_channel(domain, cluster), sink)
            .await?;
        info!(stack = %stack_name, "Reducing cluster");
        let result = self.delete_stack(&stack_name).await;
        self.finish(session, result, sink).await
    }

    /// Tear a cluster down in reverse dependency order: components (with
    /// counters suppressed), compute groups, master, network. The network
    /// booking and cluster record go last. `domain` of `None` names a solo
    /// cluster.
    pub async fn destroy_cluster(
        &self,
        domain: Option<&str>,
        name: &str,
        sink: &EventSink,
    ) -> Result<()> {
        let Some(d) = domain else {
            return self.destroy_solo_cluster(name, sink).await;
        };

        let components = self.inventory.component_stacks(d, name).await?;
        let groups = self.inventory.compute_group_stacks(d, name).await?;
        let master = naming::master_stack(d, name);
        let known = !components.is_empty()
            || !groups.is_empty()
            || self.find_stack(&master).await?.is_some()
            || self.find_stack(&naming::network_stack(d, name)).await?.is_some()
            || self.bookings.load_cluster(name).await?.is_some();
        if !known {
            return Err(EngineError::ClusterNotFound(qualified(d, name)));
        }

        let session = self
            .open_session(&naming::cluster_channel(d, name), sink)
            .await?;
        info!(domain = d, cluster = name, "Destroying cluster");

        let result = async {
            emit(sink, ProgressEvent::SuppressCounters(true));
            let removed = async {
                for stack in &components {
                    self.delete_stack(&stack.name).await?;
                }
                Ok::<_, EngineError>(())
            }
            .await;
            emit(sink, ProgressEvent::SuppressCounters(false));
            removed?;

            for stack in &groups {
                self.delete_stack(&stack.name).await?;
            }
            self.delete_stack(&master).await?;
            self.destroy_network(d, name).await
        }
        .await;

        let index = self.finish(session, result, sink).await?;
        self.release_cluster(d, name, index).await
    }

    async fn destroy_solo_cluster(&self, name: &str, sink: &EventSink) -> Result<()> {
        let stack_name = naming::solo_stack(name);
        if self.find_stack(&stack_name).await?.is_none() {
            return Err(EngineError::ClusterNotFound(name.to_string()));
        }
        let session = self.open_session(&stack_name, sink).await?;
        info!(cluster = name, "Destroying solo cluster");
        let result = self.delete_stack(&stack_name).await;
        self.finish(session, result, sink).await
    }

    /// Delete the network stack after clearing interfaces left detached in
    /// its management subnet. Returns the index from the stack's tag, or
    /// `None` when the stack is already gone.
    pub(crate) async fn destroy_network(
        &self,
        domain: &str,
        cluster: &str,
    ) -> Result<Option<NetworkIndex>> {
        let stack_name = naming::network_stack(domain, cluster);
        let Some(stack) = self.find_stack(&stack_name).await? else {
            debug!(stack = %stack_name, "Network stack already gone");
            return Ok(None);
        };
        let network = ClusterNetwork::from_stack(stack).ok_or_else(|| {
            CloudError::Validation(format!(
                "stack {} has no valid {} tag",
                stack_name,
                tags::NETWORK
            ))
        })?;

        self.remove_detached_interfaces(network.management_subnet())
            .await?;
        self.delete_stack(&stack_name).await?;
        Ok(Some(network.index))
    }

    async fn remove_detached_interfaces(&self, subnet: &str) -> Result<()> {
        if subnet.is_empty() {
            return Ok(());
        }
        let compute = &self.clients.compute;
        let interfaces = self
            .gate
            .execute(|| compute.detached_network_interfaces(subnet))
            .await?;
        for interface in &interfaces {
            info!(interface, subnet, "Deleting detached network interface");
            self.gate
                .execute(|| compute.delete_network_interface(interface))
                .await?;
        }
        Ok(())
    }

    /// Give the network index back and drop the cluster record
    pub(crate) async fn release_cluster(
        &self,
        domain: &str,
        cluster: &str,
        fallback: Option<NetworkIndex>,
    ) -> Result<()> {
        let entity = self
            .bookings
            .load_cluster(cluster)
            .await?
            .filter(|e| e.domain == domain);
        let index = entity
            .as_ref()
            .and_then(|e| NetworkIndex::new(e.network_index))
            .or(fallback);

        match index {
            Some(index) => match self.bookings.release_network(domain, index).await {
                Ok(()) => {}
                Err(EngineError::Cloud(CloudError::NetworkNotBooked { .. })) => {
                    warn!(domain, cluster, index = index.get(), "Network was not booked");
                }
                Err(e) => return Err(e),
            },
            None => warn!(domain, cluster, "No network booking recorded for cluster"),
        }

        if entity.is_some() {
            self.bookings.delete_cluster(cluster).await?;
        }
        Ok(())
    }

    /// A cluster as assembled from its running stacks
    pub async fn load_cluster(&self, domain: Option<&str>, name: &str) -> Result<Cluster> {
        let mut status = match domain {
            Some(d) => {
                let domain = self.find_domain(d).await?;
                self.inventory.domain_status(&domain).await?
            }
            None => self.inventory.solo_status().await?,
        };
        status.clusters.remove(name).ok_or_else(|| {
            EngineError::ClusterNotFound(match domain {
                Some(d) => qualified(d, name),
                None => name.to_string(),
            })
        })
    }

    /// Names of the component stacks attached to a cluster
    pub async fn cluster_components(&self, domain: &str, cluster: &str) -> Result<Vec<String>> {
        Ok(self
            .inventory
            .component_stacks(domain, cluster)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// Access details; `None` while the cluster has no master
    pub async fn cluster_details(
        &self,
        domain: Option<&str>,
        name: &str,
    ) -> Result<Option<ClusterDetails>> {
        let cluster = self.load_cluster(domain, name).await?;
        let components = match domain {
            Some(d) => self.cluster_components(d, name).await?,
            None => Vec::new(),
        };
        Ok(cluster.details(components))
    }

    /// Capacity of the autoscaling group behind a compute group
    pub async fn compute_group_capacity(&self, group: &ComputeGroup) -> Result<AutoscalingGroup> {
        let stacks = &self.clients.stacks;
        let name = group.stack_name();
        let resources = self
            .gate
            .execute(|| stacks.list_stack_resources(name))
            .await?;
        let resource = resources
            .iter()
            .find(|r| r.resource_type == AUTOSCALING_RESOURCE)
            .ok_or_else(|| EngineError::AutoscalingResourceMissing(name.to_string()))?;

        let compute = &self.clients.compute;
        let physical = resource.physical_id.as_str();
        Ok(self
            .gate
            .execute(|| compute.describe_autoscaling_group(physical))
            .await?)
    }
}
