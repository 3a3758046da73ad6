//! EC2/Auto Scaling-backed [`ComputeApi`]

use crate::error::{from_sdk, number, text};
use crate::provider::AwsCloud;
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use flightdeck_cloud::{AutoscalingGroup, CloudError, ComputeApi, Result};

#[async_trait]
impl ComputeApi for AwsCloud {
    async fn detached_network_interfaces(&self, subnet_id: &str) -> Result<Vec<String>> {
        let output = self
            .ec2
            .describe_network_interfaces()
            .filters(Filter::builder().name("subnet-id").values(subnet_id).build())
            .filters(
                Filter::builder()
                    .name("attachment.status")
                    .values("detached")
                    .build(),
            )
            .send()
            .await
            .map_err(from_sdk)?;

        let interfaces = output
            .network_interfaces()
            .iter()
            .filter_map(|nic| nic.network_interface_id().map(str::to_string))
            .collect::<Vec<_>>();
        tracing::debug!(subnet = subnet_id, count = interfaces.len(), "Detached network interfaces");
        Ok(interfaces)
    }

    async fn delete_network_interface(&self, interface_id: &str) -> Result<()> {
        tracing::debug!(interface = interface_id, "DeleteNetworkInterface");
        self.ec2
            .delete_network_interface()
            .network_interface_id(interface_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn describe_autoscaling_group(&self, name: &str) -> Result<AutoscalingGroup> {
        let output = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(from_sdk)?;

        let group = output
            .auto_scaling_groups()
            .first()
            .ok_or_else(|| CloudError::NotFound(format!("Autoscaling group {} not found", name)))?;

        Ok(AutoscalingGroup {
            name: text(group.auto_scaling_group_name()),
            desired_capacity: number(group.desired_capacity()),
            min_size: number(group.min_size()),
            max_size: number(group.max_size()),
            instances: group
                .instances()
                .iter()
                .map(|i| text(i.instance_id()))
                .collect(),
        })
    }

    async fn key_pair_exists(&self, name: &str) -> Result<bool> {
        let result = self.ec2.describe_key_pairs().key_names(name).send().await;
        match result {
            Ok(output) => Ok(!output.key_pairs().is_empty()),
            Err(err) => match from_sdk(err) {
                CloudError::Api { code: Some(c), .. } if c == "InvalidKeyPair.NotFound" => Ok(false),
                other => Err(other),
            },
        }
    }
}
