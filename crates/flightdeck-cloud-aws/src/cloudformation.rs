//! CloudFormation-backed [`StackApi`]

use crate::error::{AwsError, build_error, enum_text, from_sdk, text};
use crate::provider::AwsCloud;
use async_trait::async_trait;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, StackStatus as CfnStatus, Tag};
use flightdeck_cloud::{
    CloudError, CreateStackRequest, Result, StackApi, StackDescriptor, StackResource, StackStatus, StackSummary,
};
use std::time::Duration;

/// Delay between stack status polls while waiting
const WAIT_INTERVAL: Duration = Duration::from_secs(10);
/// Polls before giving up on a stack transition (one hour)
const WAIT_ATTEMPTS: u32 = 360;

fn descriptor(stack: &Stack) -> StackDescriptor {
    let mut descriptor = StackDescriptor::new(
        text(stack.stack_name()),
        StackStatus::from(enum_text(stack.stack_status())),
    );
    for p in stack.parameters() {
        descriptor = descriptor.with_parameter(text(p.parameter_key()), text(p.parameter_value()));
    }
    for t in stack.tags() {
        descriptor = descriptor.with_tag(text(t.key()), text(t.value()));
    }
    for o in stack.outputs() {
        descriptor = descriptor.with_output(text(o.output_key()), text(o.output_value()));
    }
    descriptor
}

impl AwsCloud {
    async fn stack_status(&self, name: &str) -> Result<StackStatus> {
        Ok(self.describe_stack(name).await?.status)
    }
}

#[async_trait]
impl StackApi for AwsCloud {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<()> {
        let parameters = request
            .parameters
            .iter()
            .map(|(k, v)| Parameter::builder().parameter_key(k).parameter_value(v).build())
            .collect::<Vec<_>>();
        let tags = request
            .tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| build_error("Tag", e))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(stack = %request.name, template = %request.template_url, "CreateStack");
        self.cloudformation
            .create_stack()
            .stack_name(&request.name)
            .template_url(&request.template_url)
            .capabilities(Capability::CapabilityIam)
            .set_parameters(Some(parameters))
            .set_tags(Some(tags))
            .set_notification_arns(request.notification_topic.clone().map(|t| vec![t]))
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn wait_until_create_complete(&self, name: &str) -> Result<()> {
        for _ in 0..WAIT_ATTEMPTS {
            match self.stack_status(name).await? {
                StackStatus::CreateComplete => return Ok(()),
                StackStatus::CreateInProgress => tokio::time::sleep(WAIT_INTERVAL).await,
                other => {
                    return Err(AwsError::StackFailed {
                        name: name.to_string(),
                        status: other.to_string(),
                    }
                    .into());
                }
            }
        }
        Err(AwsError::WaitTimeout(name.to_string()).into())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        tracing::debug!(stack = name, "DeleteStack");
        self.cloudformation
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn wait_until_delete_complete(&self, name: &str) -> Result<()> {
        for _ in 0..WAIT_ATTEMPTS {
            match self.stack_status(name).await {
                Err(CloudError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
                Ok(StackStatus::DeleteComplete) => return Ok(()),
                Ok(StackStatus::DeleteFailed) => {
                    return Err(AwsError::StackFailed {
                        name: name.to_string(),
                        status: StackStatus::DeleteFailed.to_string(),
                    }
                    .into());
                }
                Ok(_) => tokio::time::sleep(WAIT_INTERVAL).await,
            }
        }
        Err(AwsError::WaitTimeout(name.to_string()).into())
    }

    async fn describe_stack(&self, name: &str) -> Result<StackDescriptor> {
        let output = self
            .cloudformation
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
            .map_err(from_sdk)?;
        output
            .stacks()
            .first()
            .map(descriptor)
            .ok_or_else(|| CloudError::NotFound(format!("Stack {} does not exist", name)))
    }

    async fn list_stacks(&self, statuses: &[StackStatus]) -> Result<Vec<StackSummary>> {
        let filter = statuses
            .iter()
            .map(|s| CfnStatus::from(s.as_str()))
            .collect::<Vec<_>>();
        let mut summaries = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .cloudformation
                .list_stacks()
                .set_stack_status_filter(Some(filter.clone()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            summaries.extend(output.stack_summaries().iter().map(|s| StackSummary {
                name: text(s.stack_name()),
                status: StackStatus::from(enum_text(s.stack_status())),
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!(count = summaries.len(), "ListStacks");
        Ok(summaries)
    }

    async fn list_stack_resources(&self, name: &str) -> Result<Vec<StackResource>> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .cloudformation
                .list_stack_resources()
                .stack_name(name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            resources.extend(output.stack_resource_summaries().iter().map(|r| StackResource {
                logical_id: text(r.logical_resource_id()),
                physical_id: text(r.physical_resource_id()),
                resource_type: text(r.resource_type()),
                status: enum_text(r.resource_status()),
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(resources)
    }

    async fn check_access(&self) -> Result<()> {
        self.cloudformation
            .describe_account_limits()
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}
