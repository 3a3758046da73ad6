//! Per-operation event channels
//!
//! Every orchestration call owns a topic and a queue named after its stack
//! prefix. Stacks publish resource notifications to the topic; a background
//! task polls the queue and forwards decoded transitions to the progress
//! sink.

use crate::events::{EventSink, ProgressEvent, emit};
use crate::notification::parse_notification;
use flightdeck_cloud::{CloudError, MessagingApi, QueueRef, Result, RetryGate, TopicRef};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Interval between queue receives
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Messages fetched per receive
const RECEIVE_BATCH: i32 = 10;

/// An established topic/queue pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChannel {
    pub name: String,
    pub topic: TopicRef,
    pub queue: QueueRef,
}

/// Access policy letting only `topic_arn` deliver to the queue
pub fn queue_policy(queue_arn: &str, topic_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Id": format!("{}/SQSDefaultPolicy", queue_arn),
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "AWS": "*" },
                "Action": "SQS:SendMessage",
                "Resource": queue_arn,
                "Condition": {
                    "ArnEquals": { "aws:SourceArn": topic_arn }
                }
            }
        ]
    })
    .to_string()
}

#[derive(Clone)]
pub struct EventRelay {
    messaging: Arc<dyn MessagingApi>,
    gate: RetryGate,
    poll_interval: Duration,
}

impl EventRelay {
    pub fn new(messaging: Arc<dyn MessagingApi>, gate: RetryGate) -> Self {
        Self {
            messaging,
            gate,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create (or fetch) the topic and queue for `name` and wire them up.
    ///
    /// On failure whatever was created is removed again, best effort.
    pub async fn setup(&self, name: &str) -> Result<EventChannel> {
        let messaging = &self.messaging;
        let topic = self.gate.execute(|| messaging.create_topic(name)).await?;

        let queue = match self.gate.execute(|| messaging.create_queue(name)).await {
            Ok(queue) => queue,
            Err(e) => {
                self.discard(Some(&topic), None).await;
                return Err(e);
            }
        };

        if let Err(e) = self.connect(&topic, &queue).await {
            self.discard(Some(&topic), Some(&queue)).await;
            return Err(e);
        }

        debug!(channel = name, "Event channel ready");
        Ok(EventChannel {
            name: name.to_string(),
            topic,
            queue,
        })
    }

    async fn connect(&self, topic: &TopicRef, queue: &QueueRef) -> Result<()> {
        let messaging = &self.messaging;
        let queue_arn = self.gate.execute(|| messaging.queue_arn(queue)).await?;
        let policy = queue_policy(&queue_arn, &topic.0);
        self.gate
            .execute(|| messaging.set_queue_policy(queue, &policy))
            .await?;
        self.gate
            .execute(|| messaging.subscribe(topic, &queue_arn))
            .await?;
        Ok(())
    }

    async fn discard(&self, topic: Option<&TopicRef>, queue: Option<&QueueRef>) {
        let messaging = &self.messaging;
        if let Some(topic) = topic {
            if let Err(e) = self.gate.execute(|| messaging.delete_topic(topic)).await {
                warn!(topic = %topic, "Failed to remove topic during setup cleanup: {}", e);
            }
        }
        if let Some(queue) = queue {
            if let Err(e) = self.gate.execute(|| messaging.delete_queue(queue)).await {
                warn!(queue = %queue, "Failed to remove queue during setup cleanup: {}", e);
            }
        }
    }

    /// Remove the channel for `name`: unsubscribe everything, delete the
    /// topic, delete the queue. Individual removal failures are logged and
    /// skipped.
    pub async fn teardown(&self, name: &str) -> Result<()> {
        let messaging = &self.messaging;
        let topic = self.gate.execute(|| messaging.create_topic(name)).await?;
        let queue = self.gate.execute(|| messaging.create_queue(name)).await?;
        self.remove_topic(&topic).await?;
        if let Err(e) = self.gate.execute(|| messaging.delete_queue(&queue)).await {
            warn!(queue = %queue, "Failed to delete queue: {}", e);
        }
        debug!(channel = name, "Event channel removed");
        Ok(())
    }

    /// Unsubscribe every subscription of `topic`, then delete it
    pub(crate) async fn remove_topic(&self, topic: &TopicRef) -> Result<()> {
        let messaging = &self.messaging;
        let subscriptions = self
            .gate
            .execute(|| messaging.list_subscriptions(topic))
            .await?;
        for subscription in &subscriptions {
            if let Err(e) = self
                .gate
                .execute(|| messaging.unsubscribe(subscription))
                .await
            {
                warn!(subscription, "Failed to unsubscribe: {}", e);
            }
        }
        if let Err(e) = self.gate.execute(|| messaging.delete_topic(topic)).await {
            warn!(topic = %topic, "Failed to delete topic: {}", e);
        }
        Ok(())
    }

    pub(crate) async fn remove_queue(&self, queue: &QueueRef) -> Result<()> {
        let messaging = &self.messaging;
        self.gate.execute(|| messaging.delete_queue(queue)).await
    }

    pub(crate) async fn list_channels(&self) -> Result<(Vec<TopicRef>, Vec<QueueRef>)> {
        let messaging = &self.messaging;
        let topics = self.gate.execute(|| messaging.list_topics()).await?;
        let queues = self.gate.execute(|| messaging.list_queues()).await?;
        Ok((topics, queues))
    }

    /// Start polling `queue`, forwarding transitions to `sink` until the
    /// returned handle is stopped, the sink closes or the queue disappears.
    pub fn spawn_poll(&self, queue: QueueRef, sink: EventSink) -> PollHandle {
        let (shutdown, signal) = watch::channel(false);
        let poller = Poller {
            messaging: self.messaging.clone(),
            gate: self.gate.clone(),
            queue,
            sink,
        };
        let task = tokio::spawn(poller.run(self.poll_interval, signal));
        PollHandle { shutdown, task }
    }
}

/// Owned handle on a running poll task
#[derive(Debug)]
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signal the task and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Event poller ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct Poller {
    messaging: Arc<dyn MessagingApi>,
    gate: RetryGate,
    queue: QueueRef,
    sink: EventSink,
}

impl Poller {
    async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if *shutdown.borrow() || self.sink.is_closed() {
                break;
            }
            match self.poll_once().await {
                Ok(()) => {}
                Err(CloudError::QueueDeleted(_)) => {
                    debug!(queue = %self.queue, "Queue removed; poller stopping");
                    break;
                }
                Err(e) => warn!(queue = %self.queue, "Failed to receive notifications: {}", e),
            }
        }
    }

    async fn poll_once(&self) -> Result<()> {
        let messaging = &self.messaging;
        let queue = &self.queue;
        let messages = self
            .gate
            .execute(|| messaging.receive_messages(queue, RECEIVE_BATCH))
            .await?;

        for message in messages {
            match parse_notification(&message.body) {
                Ok(Some(transition)) => {
                    emit(&self.sink, ProgressEvent::Transition(transition));
                }
                Ok(None) => {}
                Err(e) => warn!(message_id = %message.message_id, "Dropping notification: {}", e),
            }
            let receipt = &message.receipt_handle;
            if let Err(e) = self
                .gate
                .execute(|| messaging.delete_message(queue, receipt))
                .await
            {
                warn!(message_id = %message.message_id, "Failed to delete message: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_policy() {
        let policy = queue_policy(
            "arn:aws:sqs:eu-west-1:1:flight-lab",
            "arn:aws:sns:eu-west-1:1:flight-lab",
        );
        let doc: serde_json::Value = serde_json::from_str(&policy).unwrap();
        assert_eq!(doc["Version"], "2012-10-17");
        assert_eq!(doc["Id"], "arn:aws:sqs:eu-west-1:1:flight-lab/SQSDefaultPolicy");
        let statement = &doc["Statement"][0];
        assert_eq!(statement["Action"], "SQS:SendMessage");
        assert_eq!(statement["Resource"], "arn:aws:sqs:eu-west-1:1:flight-lab");
        assert_eq!(
            statement["Condition"]["ArnEquals"]["aws:SourceArn"],
            "arn:aws:sns:eu-west-1:1:flight-lab"
        );
    }
}
