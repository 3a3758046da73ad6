//! Stack and event channel names
//!
//! Stack names are unique per account and region, so they double as
//! idempotency keys for creation and as keys for the event channel of the
//! operation that owns them.

use flightdeck_cloud::NAME_PREFIX;

/// `flight-<domain>`; also the domain's event channel
pub fn domain_stack(domain: &str) -> String {
    format!("{}{}", NAME_PREFIX, domain)
}

/// Event channel shared by every operation on a domain-attached cluster
pub fn cluster_channel(domain: &str, cluster: &str) -> String {
    format!("{}{}-cluster-{}", NAME_PREFIX, domain, cluster)
}

/// Single stack of a standalone cluster; also its event channel
pub fn solo_stack(cluster: &str) -> String {
    format!("{}cluster-{}", NAME_PREFIX, cluster)
}

/// Label used when a whole cluster is reported as one resource
pub fn cluster_label(domain: &str, cluster: &str) -> String {
    format!("{}{}-{}", NAME_PREFIX, domain, cluster)
}

pub fn network_stack(domain: &str, cluster: &str) -> String {
    format!("{}-network", cluster_label(domain, cluster))
}

pub fn master_stack(domain: &str, cluster: &str) -> String {
    format!("{}-master", cluster_label(domain, cluster))
}

pub fn compute_stack(domain: &str, cluster: &str, queue: &str) -> String {
    format!("{}-compute-{}", cluster_label(domain, cluster), queue)
}

/// `<type>` or `<type>-<name>`
pub fn component_id(component_type: &str, component_name: Option<&str>) -> String {
    match component_name.filter(|n| !n.is_empty()) {
        Some(name) => format!("{}-{}", component_type, name),
        None => component_type.to_string(),
    }
}

pub fn component_stack(
    domain: &str,
    cluster: &str,
    component_type: &str,
    component_name: Option<&str>,
) -> String {
    format!(
        "{}-component-{}",
        cluster_label(domain, cluster),
        component_id(component_type, component_name)
    )
}

/// `flight-<domain>-<appliance>`; also the appliance's event channel
pub fn appliance_stack(domain: &str, appliance: &str) -> String {
    format!("{}{}-{}", NAME_PREFIX, domain, appliance)
}

/// Queue name of a compute-group stack, if `stack` is one for this cluster
pub fn queue_from_stack<'a>(stack: &'a str, domain: &str, cluster: &str) -> Option<&'a str> {
    let prefix = format!("{}-compute-", cluster_label(domain, cluster));
    stack.strip_prefix(prefix.as_str()).filter(|q| !q.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_stack_names() {
        assert_eq!(network_stack("lab", "hpc"), "flight-lab-hpc-network");
        assert_eq!(master_stack("lab", "hpc"), "flight-lab-hpc-master");
        assert_eq!(compute_stack("lab", "hpc", "gpu"), "flight-lab-hpc-compute-gpu");
        assert_eq!(cluster_channel("lab", "hpc"), "flight-lab-cluster-hpc");
        assert_eq!(solo_stack("hpc"), "flight-cluster-hpc");
    }

    #[test]
    fn test_component_names() {
        assert_eq!(
            component_stack("lab", "hpc", "storage", None),
            "flight-lab-hpc-component-storage"
        );
        assert_eq!(
            component_stack("lab", "hpc", "storage", Some("scratch")),
            "flight-lab-hpc-component-storage-scratch"
        );
        assert_eq!(component_id("storage", Some("")), "storage");
    }

    #[test]
    fn test_queue_from_stack() {
        assert_eq!(
            queue_from_stack("flight-lab-hpc-compute-gpu", "lab", "hpc"),
            Some("gpu")
        );
        assert_eq!(queue_from_stack("flight-lab-hpc-master", "lab", "hpc"), None);
        assert_eq!(queue_from_stack("flight-lab-hpc-compute-", "lab", "hpc"), None);
    }
}
