//! AWS client bundle

use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::config::{Credentials, Region};
use flightdeck_cloud::CloudClients;
use std::sync::Arc;

/// Static credentials taken from the Flightdeck configuration
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Service clients sharing one resolved SDK configuration
#[derive(Debug, Clone)]
pub struct AwsCloud {
    pub(crate) cloudformation: aws_sdk_cloudformation::Client,
    pub(crate) sns: aws_sdk_sns::Client,
    pub(crate) sqs: aws_sdk_sqs::Client,
    pub(crate) ec2: aws_sdk_ec2::Client,
    pub(crate) autoscaling: aws_sdk_autoscaling::Client,
    pub(crate) dynamodb: aws_sdk_dynamodb::Client,
}

impl AwsCloud {
    /// Resolve the SDK configuration for `region`.
    ///
    /// Static credentials win over the default provider chain when given.
    pub async fn connect(region: &str, credentials: Option<AwsCredentials>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

        if let Some(creds) = credentials {
            tracing::debug!("Using static AWS credentials from configuration");
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id,
                creds.secret_access_key,
                None,
                None,
                "flightdeck-config",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::debug!(region, "AWS SDK configuration loaded");

        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&sdk_config),
            sns: aws_sdk_sns::Client::new(&sdk_config),
            sqs: aws_sdk_sqs::Client::new(&sdk_config),
            ec2: aws_sdk_ec2::Client::new(&sdk_config),
            autoscaling: aws_sdk_autoscaling::Client::new(&sdk_config),
            dynamodb: aws_sdk_dynamodb::Client::new(&sdk_config),
        }
    }

    /// Provider bundle for the orchestration engine
    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients::from_provider(self.clone())
    }
}
