use super::Orchestrator;
use crate::counts;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ProgressEvent, emit, forward_nested};
use crate::model::{Domain, DomainStatus};
use crate::naming;
use crate::params::{ParameterSetKind, parameters_for, resolve_domain_parameters};
use flightdeck_cloud::tags;
use std::path::Path;
use tracing::{info, warn};

impl Orchestrator {
    /// Describe the domain stack; absent or non-domain stacks are not found
    pub async fn find_domain(&self, name: &str) -> Result<Domain> {
        self.find_stack(&naming::domain_stack(name))
            .await?
            .and_then(Domain::from_stack)
            .ok_or_else(|| EngineError::DomainNotFound(name.to_string()))
    }

    /// Like [`find_domain`](Self::find_domain), but the domain stack must
    /// have finished creating
    pub async fn ready_domain(&self, name: &str) -> Result<Domain> {
        let domain = self.find_domain(name).await?;
        if domain.is_ready() {
            Ok(domain)
        } else {
            Err(EngineError::DomainNotReady(name.to_string()))
        }
    }

    pub async fn domain_status(&self, name: &str) -> Result<DomainStatus> {
        let domain = self.find_domain(name).await?;
        self.inventory.domain_status(&domain).await
    }

    /// Create the domain stack and record the domain.
    ///
    /// The expected resource count is derived from the resolved parameters
    /// and sent before the channel opens.
    pub async fn create_domain(
        &self,
        name: &str,
        prefix: &str,
        params_file: Option<&Path>,
        sink: &EventSink,
    ) -> Result<Domain> {
        let set = parameters_for(&self.config, ParameterSetKind::Domain, params_file)?;
        let params = resolve_domain_parameters(&self.config, &set);
        emit(
            sink,
            ProgressEvent::SetTotal(counts::domain_resource_count(&params)),
        );

        let stack_name = naming::domain_stack(name);
        let session = self.open_session(&stack_name, sink).await?;
        info!(domain = name, prefix, "Creating domain");

        let result = async {
            let request = self
                .stack_request(&stack_name, "domain.json", "domain", Some(name))
                .with_tag(tags::PREFIX, prefix)
                .with_parameters(params);
            let stack = self.create_stack(&session, request).await?;
            self.bookings.save_domain(name, prefix).await?;
            Domain::from_stack(stack).ok_or_else(|| EngineError::DomainNotFound(name.to_string()))
        }
        .await;

        self.finish(session, result, sink).await
    }

    /// Destroy the domain stack and its record.
    ///
    /// A domain still hosting clusters or appliances is refused unless
    /// `force` is set, in which case each cluster and then each appliance
    /// is destroyed first with counters suppressed.
    pub async fn destroy_domain(&self, name: &str, force: bool, sink: &EventSink) -> Result<()> {
        let domain = self.find_domain(name).await?;
        let status = self.inventory.domain_status(&domain).await?;
        if !status.is_empty() && !force {
            return Err(EngineError::DomainNotEmpty(name.to_string()));
        }
        emit(
            sink,
            ProgressEvent::SetTotal(counts::domain_resource_count(&domain.stack.parameters)),
        );

        let stack_name = naming::domain_stack(name);
        let session = self.open_session(&stack_name, sink).await?;
        info!(domain = name, force, "Destroying domain");

        let result = async {
            if !status.is_empty() {
                self.destroy_domain_children(name, &status, sink).await?;
            }
            self.delete_stack(&stack_name).await
        }
        .await;

        self.finish(session, result, sink).await?;
        self.bookings.delete_domain(name).await
    }

    async fn destroy_domain_children(
        &self,
        name: &str,
        status: &DomainStatus,
        sink: &EventSink,
    ) -> Result<()> {
        emit(sink, ProgressEvent::SuppressCounters(true));
        let (nested, forwarder) = forward_nested(sink);

        let result = async {
            for cluster in status.clusters.keys() {
                self.destroy_cluster(Some(name), cluster, &nested).await?;
            }
            for appliance in status.appliances.values() {
                self.destroy_appliance(name, appliance.kind, &nested).await?;
            }
            Ok::<_, EngineError>(())
        }
        .await;

        drop(nested);
        if let Err(e) = forwarder.await {
            warn!("Progress forwarder ended abnormally: {}", e);
        }
        emit(sink, ProgressEvent::SuppressCounters(false));
        result
    }
}
