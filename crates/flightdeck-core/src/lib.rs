//! Flightdeck orchestration engine
//!
//! Drives the ordered creation and teardown of the provider stacks behind
//! domains, clusters and appliances, relays the stacks' resource
//! notifications into a live progress view, and allocates per-domain
//! network indices.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   Orchestrator                    │
//! │   domain · cluster · queue · appliance · purge    │
//! └──────┬──────────────┬──────────────┬─────────────┘
//!        │              │              │
//! ┌──────▼──────┐ ┌─────▼──────┐ ┌─────▼────────────┐
//! │ EventRelay  │ │  Booking   │ │  StackInventory  │
//! │ topic+queue │ │  Registry  │ │  (cached list)   │
//! └──────┬──────┘ └────────────┘ └──────────────────┘
//!        │ ProgressEvent
//! ┌──────▼─────────────┐
//! │ ProgressAggregator │
//! └────────────────────┘
//! ```

pub mod appliance;
pub mod booking;
pub mod catalog;
pub mod counts;
pub mod error;
pub mod events;
pub mod inventory;
pub mod model;
pub mod naming;
pub mod network;
pub mod notification;
pub mod orchestrator;
pub mod params;
pub mod progress;
pub mod relay;

// Re-exports
pub use appliance::ApplianceKind;
pub use booking::BookingRegistry;
pub use error::{EngineError, Result};
pub use events::{EventSink, EventStream, ProgressEvent, ResourceTransition, event_channel};
pub use inventory::StackInventory;
pub use model::{
    Appliance, Cluster, ClusterDetails, ClusterNetwork, ComputeGroup, Domain, DomainStatus,
    Master, Pricing,
};
pub use network::NetworkIndex;
pub use orchestrator::{
    LaunchOptions, Orchestrator, OrchestratorOptions, QueueOptions, active_channels,
};
pub use params::{ParameterSetKind, write_parameter_directory};
pub use progress::{MemoryView, ProgressAggregator, ProgressMode, ProgressView, TerminalView};
pub use relay::{EventChannel, EventRelay, PollHandle};
