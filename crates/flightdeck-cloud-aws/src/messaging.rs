//! SNS/SQS-backed [`MessagingApi`]

use crate::error::{AwsError, from_sdk, text};
use crate::provider::AwsCloud;
use async_trait::async_trait;
use aws_sdk_sqs::types::QueueAttributeName;
use flightdeck_cloud::{MessagingApi, QueueMessage, QueueRef, Result, TopicRef};

#[async_trait]
impl MessagingApi for AwsCloud {
    async fn create_topic(&self, name: &str) -> Result<TopicRef> {
        let output = self
            .sns
            .create_topic()
            .name(name)
            .send()
            .await
            .map_err(from_sdk)?;
        let arn = output.topic_arn().ok_or(AwsError::MissingField("TopicArn"))?;
        tracing::debug!(topic = arn, "CreateTopic");
        Ok(TopicRef(arn.to_string()))
    }

    async fn create_queue(&self, name: &str) -> Result<QueueRef> {
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(from_sdk)?;
        let url = output.queue_url().ok_or(AwsError::MissingField("QueueUrl"))?;
        tracing::debug!(queue = url, "CreateQueue");
        Ok(QueueRef(url.to_string()))
    }

    async fn queue_arn(&self, queue: &QueueRef) -> Result<String> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(&queue.0)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(from_sdk)?;
        output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| AwsError::MissingField("QueueArn").into())
    }

    async fn set_queue_policy(&self, queue: &QueueRef, policy: &str) -> Result<()> {
        self.sqs
            .set_queue_attributes()
            .queue_url(&queue.0)
            .attributes(QueueAttributeName::Policy, policy)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &TopicRef, queue_arn: &str) -> Result<String> {
        let output = self
            .sns
            .subscribe()
            .topic_arn(&topic.0)
            .protocol("sqs")
            .endpoint(queue_arn)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(text(output.subscription_arn()))
    }

    async fn list_subscriptions(&self, topic: &TopicRef) -> Result<Vec<String>> {
        let mut subscriptions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .sns
                .list_subscriptions_by_topic()
                .topic_arn(&topic.0)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            subscriptions.extend(
                output
                    .subscriptions()
                    .iter()
                    .filter_map(|s| s.subscription_arn().map(str::to_string)),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(subscriptions)
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<()> {
        self.sns
            .unsubscribe()
            .subscription_arn(subscription)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn delete_topic(&self, topic: &TopicRef) -> Result<()> {
        tracing::debug!(topic = %topic, "DeleteTopic");
        self.sns
            .delete_topic()
            .topic_arn(&topic.0)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<()> {
        tracing::debug!(queue = %queue, "DeleteQueue");
        self.sqs
            .delete_queue()
            .queue_url(&queue.0)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<TopicRef>> {
        let mut topics = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .sns
                .list_topics()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            topics.extend(
                output
                    .topics()
                    .iter()
                    .filter_map(|t| t.topic_arn().map(|arn| TopicRef(arn.to_string()))),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(topics)
    }

    async fn list_queues(&self) -> Result<Vec<QueueRef>> {
        let mut queues = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .sqs
                .list_queues()
                .max_results(1000)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(from_sdk)?;

            queues.extend(output.queue_urls().iter().map(|url| QueueRef(url.clone())));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(queues)
    }

    async fn receive_messages(&self, queue: &QueueRef, max: i32) -> Result<Vec<QueueMessage>> {
        let output = self
            .sqs
            .receive_message()
            .queue_url(&queue.0)
            .max_number_of_messages(max)
            .send()
            .await
            .map_err(from_sdk)?;

        Ok(output
            .messages()
            .iter()
            .map(|m| QueueMessage {
                message_id: text(m.message_id()),
                receipt_handle: text(m.receipt_handle()),
                body: text(m.body()),
            })
            .collect())
    }

    async fn delete_message(&self, queue: &QueueRef, receipt_handle: &str) -> Result<()> {
        self.sqs
            .delete_message()
            .queue_url(&queue.0)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}
