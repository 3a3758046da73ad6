//! Provider trait definitions
//!
//! The infrastructure provider is split along the services Flightdeck talks
//! to: declarative stacks, pub/sub messaging and compute inventory. A
//! concrete provider (e.g. `flightdeck-cloud-aws`) implements all three and
//! is handed to the engine as a [`CloudClients`] bundle.

use crate::error::Result;
use crate::stack::{CreateStackRequest, StackDescriptor, StackResource, StackStatus, StackSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Declarative stack operations
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Submit a stack for creation; does not wait
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<()>;

    /// Block until the stack reaches `CREATE_COMPLETE`
    async fn wait_until_create_complete(&self, name: &str) -> Result<()>;

    /// Submit a stack for deletion; does not wait
    async fn delete_stack(&self, name: &str) -> Result<()>;

    /// Block until the stack reaches `DELETE_COMPLETE`
    async fn wait_until_delete_complete(&self, name: &str) -> Result<()>;

    /// Describe a single stack. Absent stacks yield `CloudError::NotFound`.
    async fn describe_stack(&self, name: &str) -> Result<StackDescriptor>;

    /// List stacks whose status is one of `statuses`
    async fn list_stacks(&self, statuses: &[StackStatus]) -> Result<Vec<StackSummary>>;

    /// List the physical resources of a stack
    async fn list_stack_resources(&self, name: &str) -> Result<Vec<StackResource>>;

    /// Cheap authenticated call used to check credentials
    async fn check_access(&self) -> Result<()>;
}

/// Handle to a pub/sub topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicRef(pub String);

impl TopicRef {
    /// Topic name (last `:`-separated segment of the identifier)
    pub fn name(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for TopicRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a message queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueRef(pub String);

impl QueueRef {
    /// Queue name (last `/`-separated segment of the URL)
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message received from a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Pub/sub topic and queue operations
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Create the topic, or fetch it if it already exists
    async fn create_topic(&self, name: &str) -> Result<TopicRef>;

    /// Create the queue, or fetch it if it already exists
    async fn create_queue(&self, name: &str) -> Result<QueueRef>;

    /// Durable identifier of a queue, used as subscription endpoint
    async fn queue_arn(&self, queue: &QueueRef) -> Result<String>;

    async fn set_queue_policy(&self, queue: &QueueRef, policy: &str) -> Result<()>;

    /// Subscribe a queue to a topic, returning the subscription id
    async fn subscribe(&self, topic: &TopicRef, queue_arn: &str) -> Result<String>;

    async fn list_subscriptions(&self, topic: &TopicRef) -> Result<Vec<String>>;

    async fn unsubscribe(&self, subscription: &str) -> Result<()>;

    async fn delete_topic(&self, topic: &TopicRef) -> Result<()>;

    async fn delete_queue(&self, queue: &QueueRef) -> Result<()>;

    async fn list_topics(&self) -> Result<Vec<TopicRef>>;

    async fn list_queues(&self) -> Result<Vec<QueueRef>>;

    /// Receive up to `max` pending messages. A deleted queue yields
    /// `CloudError::QueueDeleted`.
    async fn receive_messages(&self, queue: &QueueRef, max: i32) -> Result<Vec<QueueMessage>>;

    async fn delete_message(&self, queue: &QueueRef, receipt_handle: &str) -> Result<()>;
}

/// Autoscaling group capacity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoscalingGroup {
    pub name: String,
    pub desired_capacity: i32,
    pub min_size: i32,
    pub max_size: i32,
    pub instances: Vec<String>,
}

/// Compute inventory operations
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Network interfaces in `subnet_id` whose attachment status is detached
    async fn detached_network_interfaces(&self, subnet_id: &str) -> Result<Vec<String>>;

    async fn delete_network_interface(&self, interface_id: &str) -> Result<()>;

    async fn describe_autoscaling_group(&self, name: &str) -> Result<AutoscalingGroup>;

    /// Whether an SSH key pair with this name is registered
    async fn key_pair_exists(&self, name: &str) -> Result<bool>;
}

/// Explicit bundle of provider clients handed to the engine
#[derive(Clone)]
pub struct CloudClients {
    pub stacks: Arc<dyn StackApi>,
    pub messaging: Arc<dyn MessagingApi>,
    pub compute: Arc<dyn ComputeApi>,
}

impl CloudClients {
    pub fn new(
        stacks: Arc<dyn StackApi>,
        messaging: Arc<dyn MessagingApi>,
        compute: Arc<dyn ComputeApi>,
    ) -> Self {
        Self {
            stacks,
            messaging,
            compute,
        }
    }

    /// Bundle a single provider that implements every service
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: StackApi + MessagingApi + ComputeApi + 'static,
    {
        Self {
            stacks: provider.clone(),
            messaging: provider.clone(),
            compute: provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_names() {
        let topic = TopicRef("arn:aws:sns:eu-west-1:123456789012:flight-lab".into());
        assert_eq!(topic.name(), "flight-lab");

        let queue = QueueRef("https://sqs.eu-west-1.amazonaws.com/123456789012/flight-lab".into());
        assert_eq!(queue.name(), "flight-lab");
    }
}
