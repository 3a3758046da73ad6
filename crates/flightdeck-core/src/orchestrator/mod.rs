//! Stack orchestration
//!
//! Every operation follows the same shape: open the event channel named
//! after the operation's stacks, start polling it into the caller's sink,
//! run the ordered stack creates and deletes, then stop the poller and tear
//! the channel down whether the body succeeded or not.
//!
//! ```text
//! open_session ──► poll task ──► sink
//!      │
//!      ▼
//!  create / delete stacks (through the retry gate)
//!      │
//!      ▼
//!   finish: stop poll ─► teardown ─► invalidate inventory ─► Done
//! ```

mod appliance;
mod cleanup;
mod cluster;
mod domain;
mod purge;

pub use cleanup::active_channels;
pub use cluster::{LaunchOptions, QueueOptions};

use crate::booking::{BookingRegistry, DEFAULT_BOOKING_ATTEMPTS};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ProgressEvent, emit};
use crate::inventory::StackInventory;
use crate::relay::{EventChannel, EventRelay, POLL_INTERVAL, PollHandle};
use flightdeck_cloud::{
    CloudClients, CloudError, CreateStackRequest, EntityStore, RetryConfig, RetryGate,
    StackDescriptor, tags,
};
use flightdeck_config::Configuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for the engine's remote-call behaviour
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub retry: RetryConfig,
    pub poll_interval: Duration,
    pub booking_attempts: u32,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            poll_interval: POLL_INTERVAL,
            booking_attempts: DEFAULT_BOOKING_ATTEMPTS,
        }
    }
}

/// Sequences stack operations for domains, clusters and appliances
#[derive(Clone)]
pub struct Orchestrator {
    clients: CloudClients,
    gate: RetryGate,
    relay: EventRelay,
    bookings: BookingRegistry,
    inventory: Arc<StackInventory>,
    config: Arc<Configuration>,
}

/// The event channel and poller of one running operation
pub(crate) struct Session {
    channel: EventChannel,
    poll: PollHandle,
}

impl Session {
    fn topic(&self) -> &str {
        &self.channel.topic.0
    }
}

impl Orchestrator {
    pub fn new(clients: CloudClients, store: Arc<dyn EntityStore>, config: Configuration) -> Self {
        Self::with_options(clients, store, config, OrchestratorOptions::default())
    }

    pub fn with_options(
        clients: CloudClients,
        store: Arc<dyn EntityStore>,
        config: Configuration,
        options: OrchestratorOptions,
    ) -> Self {
        let gate = RetryGate::new(options.retry);
        let relay = EventRelay::new(clients.messaging.clone(), gate.clone())
            .with_poll_interval(options.poll_interval);
        let bookings =
            BookingRegistry::new(store, gate.clone()).with_max_attempts(options.booking_attempts);
        let inventory = Arc::new(StackInventory::new(clients.stacks.clone(), gate.clone()));
        Self {
            clients,
            gate,
            relay,
            bookings,
            inventory,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn inventory(&self) -> &StackInventory {
        &self.inventory
    }

    pub fn bookings(&self) -> &BookingRegistry {
        &self.bookings
    }

    /// Check the region, then make one cheap authenticated call
    pub async fn preflight(&self) -> Result<()> {
        self.config.validate_region()?;
        let stacks = &self.clients.stacks;
        match self.gate.execute(|| stacks.check_access()).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("InvalidClientTokenId") => {
                Err(CloudError::Validation("invalid credentials".to_string()).into())
            }
            Err(e) => Err(CloudError::Api {
                status: None,
                code: e.code().map(str::to_string),
                message: format!("connection to endpoint failed ({})", e),
            }
            .into()),
        }
    }

    /// Fail unless `name` is a key pair registered in the region
    pub async fn validate_key_pair(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(EngineError::InvalidKeyPair(name.to_string()));
        }
        let compute = &self.clients.compute;
        match self.gate.execute(|| compute.key_pair_exists(name)).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::InvalidKeyPair(name.to_string())),
            Err(e) => {
                debug!(key_pair = name, "Key pair lookup failed: {}", e);
                Err(EngineError::InvalidKeyPair(name.to_string()))
            }
        }
    }

    /// Set up the channel `name` and start relaying it into `sink`
    pub(crate) async fn open_session(&self, name: &str, sink: &EventSink) -> Result<Session> {
        let channel = self.relay.setup(name).await?;
        let poll = self.relay.spawn_poll(channel.queue.clone(), sink.clone());
        debug!(channel = name, "Session opened");
        Ok(Session { channel, poll })
    }

    /// Stop polling and remove the channel, then report `result`.
    ///
    /// A body error wins over a teardown error. `Done` is only sent when
    /// both succeeded.
    pub(crate) async fn finish<T>(
        &self,
        session: Session,
        result: Result<T>,
        sink: &EventSink,
    ) -> Result<T> {
        session.poll.stop().await;
        let closed = self.relay.teardown(&session.channel.name).await;
        if let Err(e) = &closed {
            warn!(channel = %session.channel.name, "Failed to remove event channel: {}", e);
        }
        self.inventory.invalidate().await;

        let value = result?;
        closed?;
        emit(sink, ProgressEvent::Done);
        Ok(value)
    }

    /// Request for a Flightdeck stack with the standard tags
    pub(crate) fn stack_request(
        &self,
        name: &str,
        template: &str,
        stack_type: &str,
        domain: Option<&str>,
    ) -> CreateStackRequest {
        let template_url = self.config.template_url(template);
        let request = CreateStackRequest::new(name, template_url.clone())
            .with_tag(tags::TYPE, stack_type)
            .with_tag(tags::TEMPLATE, template_url);
        match domain {
            Some(domain) => request.with_tag(tags::DOMAIN, domain),
            None => request,
        }
    }

    /// Create a stack notifying the session's topic and wait for it
    pub(crate) async fn create_stack(
        &self,
        session: &Session,
        request: CreateStackRequest,
    ) -> Result<StackDescriptor> {
        let request = request.with_topic(session.topic());
        let name = request.name.as_str();
        let stacks = &self.clients.stacks;

        info!(stack = name, "Creating stack");
        self.gate.execute(|| stacks.create_stack(&request)).await?;
        self.gate
            .execute(|| stacks.wait_until_create_complete(name))
            .await?;
        Ok(self.gate.execute(|| stacks.describe_stack(name)).await?)
    }

    /// Delete a stack and wait until it is gone
    pub(crate) async fn delete_stack(&self, name: &str) -> Result<()> {
        let stacks = &self.clients.stacks;
        info!(stack = name, "Deleting stack");
        self.gate.execute(|| stacks.delete_stack(name)).await?;
        self.gate
            .execute(|| stacks.wait_until_delete_complete(name))
            .await?;
        Ok(())
    }

    /// Describe a stack, `None` when it does not exist
    pub(crate) async fn find_stack(&self, name: &str) -> Result<Option<StackDescriptor>> {
        let stacks = &self.clients.stacks;
        match self.gate.execute(|| stacks.describe_stack(name)).await {
            Ok(stack) => Ok(Some(stack)),
            Err(CloudError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
