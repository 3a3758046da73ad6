//! Views over provider stacks
//!
//! Domains, clusters and appliances are not stored anywhere besides the
//! provider: they are assembled from stack tags, parameters and outputs.

use crate::appliance::ApplianceKind;
use crate::network::NetworkIndex;
use flightdeck_cloud::{StackDescriptor, StackStatus, tags};
use std::collections::BTreeMap;
use std::fmt;

fn or_empty(value: Option<&str>) -> &str {
    value.unwrap_or_default()
}

/// A domain backed by its `flight-<name>` stack
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub stack: StackDescriptor,
}

impl Domain {
    /// Wrap `stack` if it is tagged as a domain
    pub fn from_stack(stack: StackDescriptor) -> Option<Self> {
        if stack.stack_type() != Some("domain") {
            return None;
        }
        let name = stack.tag(tags::DOMAIN)?.to_string();
        Some(Self { name, stack })
    }

    /// Short name used inside resource names
    pub fn prefix(&self) -> &str {
        or_empty(self.stack.tag(tags::PREFIX))
    }

    pub fn vpc(&self) -> &str {
        or_empty(self.stack.output("FlightVPC"))
    }

    pub fn public_subnet(&self) -> &str {
        or_empty(self.stack.output("PubSubnet"))
    }

    pub fn management_subnet(&self) -> &str {
        or_empty(self.stack.output("MgtSubnet"))
    }

    pub fn private_subnet(&self) -> &str {
        or_empty(self.stack.output("PrvSubnet"))
    }

    pub fn placement_group(&self) -> &str {
        or_empty(self.stack.output("PlacementGroup"))
    }

    pub fn public_route_table(&self) -> &str {
        or_empty(self.stack.output("PubRouteTable"))
    }

    pub fn has_internet_access(&self) -> bool {
        self.stack.parameter("AllowInternetAccess") != Some("0")
    }

    pub fn vpn_connection(&self) -> Option<&str> {
        self.stack.output("VpnConnection").filter(|v| !v.is_empty())
    }

    pub fn peer_vpc(&self) -> Option<&str> {
        self.stack.parameter("PeerVPC").filter(|v| !v.is_empty())
    }

    pub fn peer_vpc_cidr_block(&self) -> Option<&str> {
        self.stack.parameter("PeerVPCCIDRBlock").filter(|v| !v.is_empty())
    }

    /// Ready once the stack has left `CREATE_IN_PROGRESS`
    pub fn is_ready(&self) -> bool {
        self.stack.status != StackStatus::CreateInProgress
    }
}

/// A cluster's network segment
#[derive(Debug, Clone)]
pub struct ClusterNetwork {
    pub index: NetworkIndex,
    /// Absent while the network stack is being created
    pub stack: Option<StackDescriptor>,
}

impl ClusterNetwork {
    /// Rebuild from a network stack carrying a `flight:network` tag
    pub fn from_stack(stack: StackDescriptor) -> Option<Self> {
        let index = stack.tag(tags::NETWORK)?.parse().ok()?;
        Some(Self {
            index,
            stack: Some(stack),
        })
    }

    fn output(&self, key: &str) -> &str {
        or_empty(self.stack.as_ref().and_then(|s| s.output(key)))
    }

    pub fn network_pool(&self) -> String {
        self.stack
            .as_ref()
            .and_then(|s| s.parameter("NetworkingPool"))
            .map(str::to_string)
            .unwrap_or_else(|| self.index.pool().to_string())
    }

    pub fn network_index(&self) -> String {
        self.stack
            .as_ref()
            .and_then(|s| s.parameter("NetworkingIndex"))
            .map(str::to_string)
            .unwrap_or_else(|| self.index.position().to_string())
    }

    pub fn public_subnet(&self) -> &str {
        self.output("PubSubnet")
    }

    pub fn management_subnet(&self) -> &str {
        self.output("MgtSubnet")
    }

    pub fn private_subnet(&self) -> &str {
        self.output("PrvSubnet")
    }

    pub fn placement_group(&self) -> &str {
        self.output("PlacementGroup")
    }
}

/// The master node stack (or the single stack of a solo cluster)
#[derive(Debug, Clone)]
pub struct Master {
    pub stack: StackDescriptor,
}

impl Master {
    pub fn access_ip(&self) -> &str {
        or_empty(self.stack.output("AccessIP"))
    }

    pub fn private_ip(&self) -> &str {
        or_empty(self.stack.output("MasterPrivateIP"))
    }

    pub fn username(&self) -> &str {
        or_empty(self.stack.output("Username"))
    }

    pub fn web_access(&self) -> &str {
        or_empty(self.stack.output("WebAccess"))
    }

    pub fn key_pair(&self) -> &str {
        or_empty(self.stack.parameter("AccessKeyName"))
    }

    pub fn cluster_uuid(&self) -> Option<String> {
        self.stack.config_value("UUID")
    }

    pub fn security_token(&self) -> Option<String> {
        self.stack.config_value("Token")
    }
}

/// How a compute group's instances are bought
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pricing {
    OnDemand,
    Spot(String),
}

impl fmt::Display for Pricing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pricing::OnDemand => f.write_str("on-demand"),
            Pricing::Spot(price) => write!(f, "spot @ ${}", price),
        }
    }
}

/// A compute queue, read back from its stack
#[derive(Debug, Clone)]
pub struct ComputeGroup {
    pub name: String,
    pub instance_type: String,
    pub pricing: Pricing,
    /// Unix timestamp after which the queue may be reaped
    pub expiry: Option<i64>,
    pub stack: StackDescriptor,
}

impl ComputeGroup {
    pub fn from_stack(stack: StackDescriptor) -> Self {
        let name = stack
            .tag(tags::QUEUE)
            .map(str::to_string)
            .or_else(|| {
                stack
                    .name
                    .rsplit_once("-compute-")
                    .map(|(_, queue)| queue.to_string())
            })
            .unwrap_or_else(|| stack.name.clone());
        let instance_type = or_empty(stack.parameter("ComputeInstanceType")).to_string();
        let pricing = match stack.parameter("ComputeSpotPrice") {
            None | Some("") | Some("0") => Pricing::OnDemand,
            Some(price) => Pricing::Spot(price.to_string()),
        };
        let expiry = stack.tag(tags::EXPIRY).and_then(|e| e.parse().ok());
        Self {
            name,
            instance_type,
            pricing,
            expiry,
            stack,
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack.name
    }
}

/// A cluster assembled from its network, master and compute stacks
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    /// `None` for solo clusters
    pub domain: Option<String>,
    pub network: Option<ClusterNetwork>,
    pub master: Option<Master>,
    pub compute_groups: Vec<ComputeGroup>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            name: name.into(),
            domain: domain.map(str::to_string),
            network: None,
            master: None,
            compute_groups: Vec::new(),
        }
    }

    pub fn compute_group(&self, queue: &str) -> Option<&ComputeGroup> {
        self.compute_groups.iter().find(|g| g.name == queue)
    }

    /// Access details, or `None` while the master is missing
    pub fn details(&self, components: Vec<String>) -> Option<ClusterDetails> {
        let master = self.master.as_ref()?;
        Some(ClusterDetails {
            username: master.username().to_string(),
            access_ip: master.access_ip().to_string(),
            key_pair: master.key_pair().to_string(),
            web_access: master.web_access().to_string(),
            uuid: master.cluster_uuid(),
            token: master.security_token(),
            components,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDetails {
    pub username: String,
    pub access_ip: String,
    pub key_pair: String,
    pub web_access: String,
    pub uuid: Option<String>,
    pub token: Option<String>,
    /// Names of component stacks attached to the cluster
    pub components: Vec<String>,
}

impl fmt::Display for ClusterDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = "<unknown>";
        writeln!(f, "Administrator username: {}", self.username)?;
        writeln!(f, "IP address: {}", self.access_ip)?;
        writeln!(f, "Key pair: {}", self.key_pair)?;
        writeln!(f, "Access URL: {}", self.web_access)?;
        writeln!(f, "UUID: {}", self.uuid.as_deref().unwrap_or(unknown))?;
        writeln!(f, "Token: {}", self.token.as_deref().unwrap_or(unknown))?;
        if !self.components.is_empty() {
            writeln!(f, "\nComponents: {}", self.components.join(", "))?;
        }
        Ok(())
    }
}

/// An infrastructure appliance stack
#[derive(Debug, Clone)]
pub struct Appliance {
    pub kind: ApplianceKind,
    pub stack: StackDescriptor,
}

impl Appliance {
    pub fn access_details(&self) -> Vec<(&'static str, String)> {
        self.kind.access_details(&self.stack)
    }
}

/// Everything running in a domain
#[derive(Debug, Clone, Default)]
pub struct DomainStatus {
    pub clusters: BTreeMap<String, Cluster>,
    pub appliances: BTreeMap<String, Appliance>,
    pub has_internet_access: bool,
    pub vpn_connection: Option<String>,
    pub peer_vpc: Option<String>,
    pub peer_vpc_cidr_block: Option<String>,
}

impl DomainStatus {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.appliances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_stack() -> StackDescriptor {
        StackDescriptor::new("flight-lab", StackStatus::CreateComplete)
            .with_tag(tags::TYPE, "domain")
            .with_tag(tags::DOMAIN, "lab")
            .with_tag(tags::PREFIX, "lb")
            .with_output("FlightVPC", "vpc-1")
            .with_parameter("AllowInternetAccess", "1")
    }

    #[test]
    fn test_domain_from_stack() {
        let domain = Domain::from_stack(domain_stack()).unwrap();
        assert_eq!(domain.name, "lab");
        assert_eq!(domain.prefix(), "lb");
        assert_eq!(domain.vpc(), "vpc-1");
        assert_eq!(domain.public_subnet(), "");
        assert!(domain.has_internet_access());
        assert!(domain.is_ready());
        assert!(domain.peer_vpc().is_none());

        let other = StackDescriptor::new("flight-lab-hpc-master", StackStatus::CreateComplete)
            .with_tag(tags::TYPE, "master");
        assert!(Domain::from_stack(other).is_none());
    }

    #[test]
    fn test_domain_not_ready() {
        let mut stack = domain_stack();
        stack.status = StackStatus::CreateInProgress;
        assert!(!Domain::from_stack(stack).unwrap().is_ready());
    }

    #[test]
    fn test_network_pool_fallback() {
        let network = ClusterNetwork {
            index: NetworkIndex::new(33).unwrap(),
            stack: None,
        };
        assert_eq!(network.network_pool(), "2");
        assert_eq!(network.network_index(), "2");
        assert_eq!(network.management_subnet(), "");

        let stack = StackDescriptor::new("flight-lab-hpc-network", StackStatus::CreateComplete)
            .with_tag(tags::NETWORK, "33")
            .with_parameter("NetworkingPool", "7")
            .with_output("MgtSubnet", "subnet-m");
        let network = ClusterNetwork::from_stack(stack).unwrap();
        assert_eq!(network.index.get(), 33);
        assert_eq!(network.network_pool(), "7");
        assert_eq!(network.management_subnet(), "subnet-m");
    }

    #[test]
    fn test_compute_group_from_stack() {
        let stack = StackDescriptor::new("flight-lab-hpc-compute-gpu", StackStatus::CreateComplete)
            .with_parameter("ComputeInstanceType", "gpu-1GPU-8C-15GB.small-g2.2xlarge")
            .with_parameter("ComputeSpotPrice", "0.75")
            .with_tag(tags::EXPIRY, "1500000000");
        let group = ComputeGroup::from_stack(stack);
        assert_eq!(group.name, "gpu");
        assert_eq!(group.pricing.to_string(), "spot @ $0.75");
        assert_eq!(group.expiry, Some(1_500_000_000));

        let stack = StackDescriptor::new("flight-lab-hpc-compute-x", StackStatus::CreateComplete)
            .with_tag(tags::QUEUE, "batch")
            .with_parameter("ComputeSpotPrice", "0");
        let group = ComputeGroup::from_stack(stack);
        assert_eq!(group.name, "batch");
        assert_eq!(group.pricing, Pricing::OnDemand);
        assert_eq!(group.expiry, None);
    }

    #[test]
    fn test_cluster_details() {
        let mut cluster = Cluster::new("hpc", Some("lab"));
        assert!(cluster.details(Vec::new()).is_none());

        cluster.master = Some(Master {
            stack: StackDescriptor::new("flight-lab-hpc-master", StackStatus::CreateComplete)
                .with_output("AccessIP", "1.2.3.4")
                .with_output("Username", "alces")
                .with_parameter("AccessKeyName", "lab-key"),
        });
        let details = cluster
            .details(vec!["flight-lab-hpc-component-storage".into()])
            .unwrap();
        let text = details.to_string();
        assert!(text.contains("Administrator username: alces\n"));
        assert!(text.contains("IP address: 1.2.3.4\n"));
        assert!(text.contains("UUID: <unknown>\n"));
        assert!(text.ends_with("Components: flight-lab-hpc-component-storage\n"));
    }
}
