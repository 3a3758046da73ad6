use super::Orchestrator;
use crate::appliance::ApplianceKind;
use crate::error::{EngineError, Result};
use crate::events::EventSink;
use crate::model::Appliance;
use crate::naming;
use flightdeck_cloud::{CloudError, tags};
use tracing::info;

impl Orchestrator {
    /// Launch an appliance into a ready domain
    pub async fn launch_appliance(
        &self,
        domain: &str,
        kind: ApplianceKind,
        sink: &EventSink,
    ) -> Result<Appliance> {
        let domain = self.ready_domain(domain).await?;
        let stack_name = naming::appliance_stack(&domain.name, kind.name());
        let params = kind.launch_parameters(&self.config, &domain);

        let session = self.open_session(&stack_name, sink).await?;
        info!(domain = %domain.name, appliance = %kind, "Launching appliance");

        let result = async {
            let request = self
                .stack_request(&stack_name, kind.template(), "appliance", Some(&domain.name))
                .with_tag(tags::APPLIANCE, kind.name())
                .with_parameters(params);
            let stack = self.create_stack(&session, request).await?;
            Ok::<_, EngineError>(Appliance { kind, stack })
        }
        .await;

        self.finish(session, result, sink).await
    }

    /// Destroy an appliance stack
    pub async fn destroy_appliance(
        &self,
        domain: &str,
        kind: ApplianceKind,
        sink: &EventSink,
    ) -> Result<()> {
        let stack_name = naming::appliance_stack(domain, kind.name());
        if self.find_stack(&stack_name).await?.is_none() {
            return Err(CloudError::NotFound(format!(
                "Appliance '{}' is not running in domain '{}'",
                kind, domain
            ))
            .into());
        }

        let session = self.open_session(&stack_name, sink).await?;
        info!(domain, appliance = %kind, "Destroying appliance");
        let result = self.delete_stack(&stack_name).await;
        self.finish(session, result, sink).await
    }
}
