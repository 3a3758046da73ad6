//! In-memory provider used by the orchestration tests

use async_trait::async_trait;
use flightdeck_cloud::{
    AutoscalingGroup, CloudClients, CloudError, ComputeApi, CreateStackRequest, EntityStore,
    MemoryEntityStore, MessagingApi, QueueMessage, QueueRef, Result, StackApi, StackDescriptor,
    StackResource, StackStatus, StackSummary, TopicRef, tags,
};
use flightdeck_config::Configuration;
use flightdeck_core::{
    EventStream, Orchestrator, OrchestratorOptions, ProgressEvent, notification,
};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ACCOUNT: &str = "000000000000";

#[derive(Default)]
struct State {
    stacks: BTreeMap<String, StackDescriptor>,
    topics: BTreeSet<String>,
    queues: BTreeMap<String, VecDeque<QueueMessage>>,
    /// subscription id -> (topic name, queue name)
    subscriptions: BTreeMap<String, (String, String)>,
    /// subnet -> detached interface ids
    interfaces: HashMap<String, Vec<String>>,
    key_pairs: HashSet<String>,
    resources: HashMap<String, Vec<StackResource>>,
    groups: HashMap<String, AutoscalingGroup>,
    next_id: u64,
}

/// Provider fake recording every mutating call in order
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    trace: Mutex<Vec<String>>,
    failing_creates: Mutex<HashSet<String>>,
    delete_jitter_ms: u64,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack deletions complete after a random delay of up to `max_ms`
    pub fn with_delete_jitter(mut self, max_ms: u64) -> Self {
        self.delete_jitter_ms = max_ms;
        self
    }

    pub fn fail_create(&self, stack: &str) {
        self.failing_creates.lock().unwrap().insert(stack.to_string());
    }

    pub fn seed_stack(&self, stack: StackDescriptor) {
        self.state
            .lock()
            .unwrap()
            .stacks
            .insert(stack.name.clone(), stack);
    }

    pub fn add_key_pair(&self, name: &str) {
        self.state.lock().unwrap().key_pairs.insert(name.to_string());
    }

    pub fn add_detached_interface(&self, subnet: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .interfaces
            .entry(subnet.to_string())
            .or_default()
            .push(id.to_string());
    }

    pub fn add_autoscaling_group(&self, stack: &str, group: AutoscalingGroup) {
        let mut state = self.state.lock().unwrap();
        state.resources.insert(
            stack.to_string(),
            vec![StackResource {
                logical_id: "ComputeGroup".to_string(),
                physical_id: group.name.clone(),
                resource_type: "AWS::AutoScaling::AutoScalingGroup".to_string(),
                status: "CREATE_COMPLETE".to_string(),
            }],
        );
        state.groups.insert(group.name.clone(), group);
    }

    pub fn stack(&self, name: &str) -> Option<StackDescriptor> {
        self.state.lock().unwrap().stacks.get(name).cloned()
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.state.lock().unwrap().stacks.keys().cloned().collect()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.state.lock().unwrap().topics.iter().cloned().collect()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.state.lock().unwrap().queues.keys().cloned().collect()
    }

    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }

    /// Index of the first trace entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.trace().iter().position(|e| e == entry)
    }

    /// Deliver a stack notification to every queue subscribed to `topic`
    pub fn publish(&self, topic: &str, logical: &str, physical: &str, status: &str) {
        let body = serde_json::json!({
            "Type": "Notification",
            "Subject": notification::NOTIFICATION_SUBJECT,
            "Message": format!(
                "StackId='arn:aws:cloudformation:eu-west-1:{}:stack/x'\nLogicalResourceId='{}'\nPhysicalResourceId='{}'\nResourceStatus='{}'\n",
                ACCOUNT, logical, physical, status
            ),
        })
        .to_string();
        self.push_raw(topic, &body);
    }

    /// Deliver an arbitrary body to every queue subscribed to `topic`
    pub fn push_raw(&self, topic: &str, body: &str) {
        let mut state = self.state.lock().unwrap();
        let targets: Vec<String> = state
            .subscriptions
            .values()
            .filter(|(t, _)| t == topic)
            .map(|(_, q)| q.clone())
            .collect();
        for queue in targets {
            state.next_id += 1;
            let id = state.next_id.to_string();
            if let Some(messages) = state.queues.get_mut(&queue) {
                messages.push_back(QueueMessage {
                    message_id: id.clone(),
                    receipt_handle: format!("receipt-{}", id),
                    body: body.to_string(),
                });
            }
        }
    }

    fn record(&self, entry: String) {
        self.trace.lock().unwrap().push(entry);
    }

    fn name_of(reference: &str, separator: char) -> String {
        reference.rsplit(separator).next().unwrap_or(reference).to_string()
    }
}

#[async_trait]
impl StackApi for FakeCloud {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<()> {
        self.record(format!("create:{}", request.name));
        if self.failing_creates.lock().unwrap().contains(&request.name) {
            return Err(CloudError::Api {
                status: Some(400),
                code: Some("ValidationError".to_string()),
                message: format!("Template error in {}", request.name),
            });
        }
        let mut state = self.state.lock().unwrap();
        if state.stacks.contains_key(&request.name) {
            return Err(CloudError::AlreadyExists(request.name.clone()));
        }
        let mut stack = StackDescriptor::new(&request.name, StackStatus::CreateComplete);
        stack.parameters = request.parameters.clone();
        stack.tags = request.tags.clone();
        if stack.tag(tags::TYPE) == Some("network") {
            stack = stack.with_output("MgtSubnet", format!("subnet-{}-mgt", request.name));
        }
        if stack.tag(tags::TYPE) == Some("master") {
            stack = stack
                .with_output("AccessIP", "203.0.113.10")
                .with_output("Username", "alces");
        }
        state.stacks.insert(request.name.clone(), stack);
        Ok(())
    }

    async fn wait_until_create_complete(&self, name: &str) -> Result<()> {
        self.record(format!("created:{}", name));
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.record(format!("delete:{}", name));
        Ok(())
    }

    async fn wait_until_delete_complete(&self, name: &str) -> Result<()> {
        if self.delete_jitter_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=self.delete_jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let removed = self.state.lock().unwrap().stacks.remove(name).is_some();
        if removed {
            self.record(format!("deleted:{}", name));
        }
        Ok(())
    }

    async fn describe_stack(&self, name: &str) -> Result<StackDescriptor> {
        self.stack(name)
            .ok_or_else(|| CloudError::NotFound(format!("Stack with id {} does not exist", name)))
    }

    async fn list_stacks(&self, statuses: &[StackStatus]) -> Result<Vec<StackSummary>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .stacks
            .values()
            .filter(|s| statuses.contains(&s.status))
            .map(|s| StackSummary {
                name: s.name.clone(),
                status: s.status.clone(),
            })
            .collect())
    }

    async fn list_stack_resources(&self, name: &str) -> Result<Vec<StackResource>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .resources
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn check_access(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl MessagingApi for FakeCloud {
    async fn create_topic(&self, name: &str) -> Result<TopicRef> {
        self.state.lock().unwrap().topics.insert(name.to_string());
        Ok(TopicRef(format!("arn:aws:sns:eu-west-1:{}:{}", ACCOUNT, name)))
    }

    async fn create_queue(&self, name: &str) -> Result<QueueRef> {
        self.state
            .lock()
            .unwrap()
            .queues
            .entry(name.to_string())
            .or_default();
        Ok(QueueRef(format!(
            "https://sqs.eu-west-1.amazonaws.com/{}/{}",
            ACCOUNT, name
        )))
    }

    async fn queue_arn(&self, queue: &QueueRef) -> Result<String> {
        Ok(format!(
            "arn:aws:sqs:eu-west-1:{}:{}",
            ACCOUNT,
            Self::name_of(&queue.0, '/')
        ))
    }

    async fn set_queue_policy(&self, _queue: &QueueRef, _policy: &str) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, topic: &TopicRef, queue_arn: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{}:sub-{}", topic.0, state.next_id);
        state.subscriptions.insert(
            id.clone(),
            (topic.name().to_string(), Self::name_of(queue_arn, ':')),
        );
        Ok(id)
    }

    async fn list_subscriptions(&self, topic: &TopicRef) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|(_, (t, _))| t == topic.name())
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<()> {
        self.state.lock().unwrap().subscriptions.remove(subscription);
        Ok(())
    }

    async fn delete_topic(&self, topic: &TopicRef) -> Result<()> {
        self.record(format!("delete-topic:{}", topic.name()));
        self.state.lock().unwrap().topics.remove(topic.name());
        Ok(())
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<()> {
        self.record(format!("delete-queue:{}", queue.name()));
        self.state.lock().unwrap().queues.remove(queue.name());
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<TopicRef>> {
        Ok(self
            .topic_names()
            .into_iter()
            .map(|t| TopicRef(format!("arn:aws:sns:eu-west-1:{}:{}", ACCOUNT, t)))
            .collect())
    }

    async fn list_queues(&self) -> Result<Vec<QueueRef>> {
        Ok(self
            .queue_names()
            .into_iter()
            .map(|q| QueueRef(format!("https://sqs.eu-west-1.amazonaws.com/{}/{}", ACCOUNT, q)))
            .collect())
    }

    async fn receive_messages(&self, queue: &QueueRef, max: i32) -> Result<Vec<QueueMessage>> {
        let mut state = self.state.lock().unwrap();
        let messages = state
            .queues
            .get_mut(queue.name())
            .ok_or_else(|| CloudError::QueueDeleted(queue.0.clone()))?;
        let count = messages.len().min(usize::try_from(max).unwrap_or(0));
        Ok(messages.drain(..count).collect())
    }

    async fn delete_message(&self, _queue: &QueueRef, _receipt_handle: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ComputeApi for FakeCloud {
    async fn detached_network_interfaces(&self, subnet_id: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .interfaces
            .get(subnet_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_network_interface(&self, interface_id: &str) -> Result<()> {
        self.record(format!("delete-interface:{}", interface_id));
        for interfaces in self.state.lock().unwrap().interfaces.values_mut() {
            interfaces.retain(|i| i != interface_id);
        }
        Ok(())
    }

    async fn describe_autoscaling_group(&self, name: &str) -> Result<AutoscalingGroup> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("Autoscaling group {} not found", name)))
    }

    async fn key_pair_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().key_pairs.contains(name))
    }
}

/// A fake provider, the entity store and an orchestrator wired to both
pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub store: Arc<MemoryEntityStore>,
    pub orchestrator: Orchestrator,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_cloud(FakeCloud::new())
    }

    pub fn with_cloud(cloud: FakeCloud) -> Self {
        let cloud = Arc::new(cloud);
        let store = Arc::new(MemoryEntityStore::new());
        let options = OrchestratorOptions {
            poll_interval: Duration::from_millis(10),
            ..OrchestratorOptions::default()
        };
        let orchestrator = Orchestrator::with_options(
            CloudClients::from_provider(cloud.clone()),
            store.clone() as Arc<dyn EntityStore>,
            Configuration::default(),
            options,
        );
        Self {
            cloud,
            store,
            orchestrator,
        }
    }

    /// Create a domain through the orchestrator
    pub async fn domain(&self, name: &str) {
        let (sink, _events) = flightdeck_core::event_channel();
        self.orchestrator
            .create_domain(name, name, None, &sink)
            .await
            .unwrap();
    }

    /// Launch a domain cluster with `queues` compute groups and `components`
    /// component stacks, each added through the orchestrator
    pub async fn cluster(&self, domain: &str, name: &str, queues: &[&str], components: &[&str]) {
        let (sink, _events) = flightdeck_core::event_channel();
        self.orchestrator
            .launch_cluster(domain, name, &Default::default(), &sink)
            .await
            .unwrap();
        for queue in queues {
            self.orchestrator
                .add_queue(domain, name, queue, &Default::default(), &sink)
                .await
                .unwrap();
        }
        for component in components {
            self.orchestrator
                .expand_cluster(domain, name, component, None, None, &sink)
                .await
                .unwrap();
        }
    }
}

/// Everything sent on a sink once all senders are gone
#[allow(dead_code)]
pub fn collect(mut events: EventStream) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
