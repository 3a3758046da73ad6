//! AWS provider for Flightdeck
//!
//! Implements the `flightdeck-cloud` provider traits on top of the AWS SDK:
//!
//! - [`StackApi`](flightdeck_cloud::StackApi): CloudFormation
//! - [`MessagingApi`](flightdeck_cloud::MessagingApi): SNS topics and SQS queues
//! - [`ComputeApi`](flightdeck_cloud::ComputeApi): EC2 network interfaces and Auto Scaling groups
//!
//! plus [`DynamoEntityStore`], the DynamoDB-backed entity store.

mod cloudformation;
mod compute;
mod dynamo;
mod error;
mod messaging;
mod provider;

pub use dynamo::DynamoEntityStore;
pub use error::AwsError;
pub use provider::{AwsCloud, AwsCredentials};
