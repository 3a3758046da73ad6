//! Bulk teardown
//!
//! Independent children are deleted concurrently, one task each, and report
//! back over a completion channel. Draining that channel is the barrier:
//! nothing that depends on the children starts until every one of them has
//! reported.

use super::Orchestrator;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ProgressEvent, emit, forward_nested};
use crate::naming;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Completion = (String, Result<()>);

/// Wait for `expected` completions, calling `on_success` for each one that
/// succeeded. Returns the first failure once all have reported.
async fn drain(
    mut done: mpsc::UnboundedReceiver<Completion>,
    expected: usize,
    mut on_success: impl FnMut(&str),
) -> Result<()> {
    let mut first_error = None;
    let mut received = 0;
    while let Some((label, result)) = done.recv().await {
        received += 1;
        match result {
            Ok(()) => {
                debug!(resource = %label, remaining = expected - received, "Teardown finished");
                on_success(&label);
            }
            Err(e) => {
                warn!(resource = %label, "Teardown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if received < expected {
        return Err(EngineError::Task(format!(
            "{} of {} teardown tasks did not report",
            expected - received,
            expected
        )));
    }
    Ok(())
}

async fn join_forwarders(forwarders: Vec<JoinHandle<()>>) {
    for forwarder in forwarders {
        if let Err(e) = forwarder.await {
            warn!("Progress forwarder ended abnormally: {}", e);
        }
    }
}

impl Orchestrator {
    fn spawn_delete(&self, stack: String, done: mpsc::UnboundedSender<Completion>) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.delete_stack(&stack).await;
            let _ = done.send((stack, result));
        });
    }

    /// Delete a cluster's components, compute groups and master all at once,
    /// then its network once every one of them is gone.
    pub async fn purge_cluster(&self, domain: &str, name: &str, sink: &EventSink) -> Result<()> {
        let mut children: Vec<String> = self
            .inventory
            .component_stacks(domain, name)
            .await?
            .into_iter()
            .chain(self.inventory.compute_group_stacks(domain, name).await?)
            .map(|s| s.name)
            .collect();
        let master = naming::master_stack(domain, name);
        if self.find_stack(&master).await?.is_some() {
            children.push(master);
        }
        if children.is_empty()
            && self
                .find_stack(&naming::network_stack(domain, name))
                .await?
                .is_none()
        {
            return Err(EngineError::ClusterNotFound(format!("{}/{}", domain, name)));
        }

        let session = self
            .open_session(&naming::cluster_channel(domain, name), sink)
            .await?;
        info!(domain, cluster = name, children = children.len(), "Purging cluster");

        let result = async {
            let (done_tx, done_rx) = mpsc::unbounded_channel();
            let expected = children.len();
            for stack in children {
                self.spawn_delete(stack, done_tx.clone());
            }
            drop(done_tx);
            drain(done_rx, expected, |_| {}).await?;

            self.destroy_network(domain, name).await
        }
        .await;

        let index = self.finish(session, result, sink).await?;
        self.release_cluster(domain, name, index).await
    }

    /// Tear down every cluster and appliance of a domain concurrently,
    /// leaving the domain itself in place.
    ///
    /// Each child is shown as a single resource: announced as
    /// `DELETE_IN_PROGRESS` when its task starts and `DELETE_COMPLETE` when
    /// it reports success.
    pub async fn purge_domain(&self, name: &str, sink: &EventSink) -> Result<()> {
        let domain = self.find_domain(name).await?;
        let status = self.inventory.domain_status(&domain).await?;
        if status.is_empty() {
            return Err(EngineError::NothingToPurge(name.to_string()));
        }
        info!(
            domain = name,
            clusters = status.clusters.len(),
            appliances = status.appliances.len(),
            "Purging domain"
        );

        let (done_tx, done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut forwarders = Vec::new();

        for cluster in status.clusters.keys() {
            let label = naming::cluster_label(name, cluster);
            emit(sink, ProgressEvent::transition("DELETE_IN_PROGRESS", &label, &label));
            let (nested, forwarder) = forward_nested(sink);
            forwarders.push(forwarder);

            let this = self.clone();
            let domain = name.to_string();
            let cluster = cluster.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                let result = this.purge_cluster(&domain, &cluster, &nested).await;
                let _ = done.send((label, result));
            });
        }

        for appliance in status.appliances.values() {
            let label = appliance.stack.name.clone();
            emit(sink, ProgressEvent::transition("DELETE_IN_PROGRESS", &label, &label));
            let (nested, forwarder) = forward_nested(sink);
            forwarders.push(forwarder);

            let this = self.clone();
            let domain = name.to_string();
            let kind = appliance.kind;
            let done = done_tx.clone();
            tokio::spawn(async move {
                let result = this.destroy_appliance(&domain, kind, &nested).await;
                let _ = done.send((label, result));
            });
        }
        drop(done_tx);

        let expected = status.clusters.len() + status.appliances.len();
        let result = drain(done_rx, expected, |label| {
            emit(sink, ProgressEvent::transition("DELETE_COMPLETE", label, label));
        })
        .await;

        join_forwarders(forwarders).await;
        self.inventory.invalidate().await;
        result?;
        emit(sink, ProgressEvent::Done);
        Ok(())
    }
}
