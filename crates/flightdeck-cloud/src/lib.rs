//! Flightdeck cloud plumbing
//!
//! Provider abstraction over the three cloud services the orchestrator talks
//! to (stacks, messaging, compute), the entity store holding domain and
//! cluster records, and the retry gate every remote call goes through.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 flightdeck CLI                   │
//! │        (domain / cluster / infra / cleanup)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                flightdeck-core                   │
//! │   orchestrator · relay · progress · booking      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               flightdeck-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  StackApi · MessagingApi · ComputeApi     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  RetryGate   │  │ EntityStore  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ flightdeck-   │
//! │  cloud-aws    │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod retry;
pub mod stack;
pub mod state;
pub mod store;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, Plan, PlanSummary, ResourceKind};
pub use error::{CloudError, Result};
pub use provider::{
    AutoscalingGroup, CloudClients, ComputeApi, MessagingApi, QueueMessage, QueueRef, StackApi,
    TopicRef,
};
pub use retry::{RetryConfig, RetryGate};
pub use stack::{
    CreateStackRequest, NAME_PREFIX, StackDescriptor, StackResource, StackStatus, StackSummary,
    tags,
};
pub use state::LocalEntityStore;
pub use store::{
    CLUSTERS_TABLE, ClusterEntity, DOMAINS_TABLE, DomainEntity, EntityStore, MemoryEntityStore,
    Registry,
};
