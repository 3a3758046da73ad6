//! Removal of event channels left behind by interrupted operations

use super::Orchestrator;
use crate::error::Result;
use crate::model::DomainStatus;
use crate::naming;
use flightdeck_cloud::{
    Action, ActionType, ApplyResult, NAME_PREFIX, Plan, QueueRef, ResourceKind, TopicRef,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Channel names in use by the given domains and solo clusters.
///
/// A domain owns the channel named after its stack, one per cluster and one
/// per appliance.
pub fn active_channels<'a>(
    domains: impl IntoIterator<Item = (&'a str, &'a DomainStatus)>,
    solo: &DomainStatus,
) -> Vec<String> {
    let mut names = Vec::new();
    for (domain, status) in domains {
        names.push(naming::domain_stack(domain));
        for cluster in status.clusters.keys() {
            names.push(naming::cluster_channel(domain, cluster));
        }
        for appliance in status.appliances.values() {
            names.push(naming::appliance_stack(domain, appliance.kind.name()));
        }
    }
    for cluster in solo.clusters.keys() {
        names.push(naming::solo_stack(cluster));
    }
    names
}

fn plan_channels(topics: &[TopicRef], queues: &[QueueRef], active: &HashSet<&str>) -> Plan {
    let topic_actions = topics
        .iter()
        .filter(|t| t.name().starts_with(NAME_PREFIX))
        .map(|t| {
            if active.contains(t.name()) {
                Action::keep(ResourceKind::Topic, &t.0, "in use").with_detail("name", t.name())
            } else {
                Action::delete(ResourceKind::Topic, &t.0, "orphaned").with_detail("name", t.name())
            }
        });
    let queue_actions = queues
        .iter()
        .filter(|q| q.name().starts_with(NAME_PREFIX))
        .map(|q| {
            if active.contains(q.name()) {
                Action::keep(ResourceKind::Queue, &q.0, "in use").with_detail("name", q.name())
            } else {
                Action::delete(ResourceKind::Queue, &q.0, "orphaned").with_detail("name", q.name())
            }
        });
    Plan::new(topic_actions.chain(queue_actions).collect())
}

fn report_line(action: &Action) -> String {
    let name = action
        .details
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(&action.resource_id);
    match action.action_type {
        ActionType::Delete => format!("🗑  Remove {}: {}", action.resource_type, name),
        ActionType::NoOp => format!("✅  Retain {}: {}", action.resource_type, name),
    }
}

impl Orchestrator {
    /// Names of every channel a running domain, cluster or appliance owns
    pub async fn active_channel_names(&self) -> Result<Vec<String>> {
        let domains = self.inventory.domains().await?;
        let mut statuses = Vec::with_capacity(domains.len());
        for domain in &domains {
            statuses.push((domain.name.clone(), self.inventory.domain_status(domain).await?));
        }
        let solo = self.inventory.solo_status().await?;
        Ok(active_channels(
            statuses.iter().map(|(name, status)| (name.as_str(), status)),
            &solo,
        ))
    }

    /// Plan the removal of every `flight-` topic and queue not named in
    /// `active` and, unless `dry_run`, carry it out.
    ///
    /// Each planned action is passed to `report` as a display line before
    /// it is applied. Individual removal failures are recorded in the
    /// returned [`ApplyResult`] rather than aborting the sweep.
    pub async fn cleanup(
        &self,
        active: &[String],
        dry_run: bool,
        mut report: impl FnMut(&str),
    ) -> Result<(Plan, ApplyResult)> {
        let (topics, queues) = self.relay.list_channels().await?;
        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        let plan = plan_channels(&topics, &queues, &active);
        info!(summary = %plan.summary(), dry_run, "Event channel cleanup planned");

        let mut applied = ApplyResult::new();
        for action in &plan.actions {
            report(&report_line(action));
            if dry_run || action.action_type != ActionType::Delete {
                continue;
            }
            let removed = match action.resource_type {
                ResourceKind::Topic => {
                    self.relay
                        .remove_topic(&TopicRef(action.resource_id.clone()))
                        .await
                }
                ResourceKind::Queue => {
                    self.relay
                        .remove_queue(&QueueRef(action.resource_id.clone()))
                        .await
                }
            };
            match removed {
                Ok(()) => {
                    debug!(resource = %action.resource_id, "Removed");
                    applied.add_success(action.id.clone(), action.description.clone());
                }
                Err(e) => {
                    warn!(resource = %action.resource_id, "Removal failed: {}", e);
                    applied.add_failure(action.id.clone(), e.to_string());
                }
            }
        }
        Ok((plan, applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_channels() {
        let topics = vec![
            TopicRef("arn:aws:sns:eu-west-1:1:flight-lab".to_string()),
            TopicRef("arn:aws:sns:eu-west-1:1:flight-lab-cluster-old".to_string()),
            TopicRef("arn:aws:sns:eu-west-1:1:billing".to_string()),
        ];
        let queues = vec![QueueRef(
            "https://sqs.eu-west-1.amazonaws.com/1/flight-lab-cluster-old".to_string(),
        )];
        let active: HashSet<&str> = ["flight-lab"].into_iter().collect();

        let plan = plan_channels(&topics, &queues, &active);
        assert_eq!(plan.actions.len(), 3);
        assert!(plan.has_changes);
        let lines: Vec<String> = plan.actions.iter().map(report_line).collect();
        assert_eq!(
            lines,
            vec![
                "✅  Retain topic: flight-lab",
                "🗑  Remove topic: flight-lab-cluster-old",
                "🗑  Remove queue: flight-lab-cluster-old",
            ]
        );
    }

    #[test]
    fn test_active_channels_solo_only() {
        let solo = DomainStatus::default();
        assert!(active_channels(std::iter::empty(), &solo).is_empty());
    }
}
