//! Launch parameter tables
//!
//! Each stack template takes a table of `Name: value` parameters. Values of
//! the form `%PLACEHOLDER%` are resolved at launch time from the
//! configuration and from stacks launched earlier in the same sequence; a
//! placeholder that resolves to nothing drops its parameter entirely so the
//! template default applies.

use crate::error::{EngineError, Result};
use crate::model::{ClusterNetwork, Domain, Master};
use flightdeck_config::Configuration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameter name to raw value (literal or placeholder)
pub type ParameterSet = BTreeMap<String, String>;

/// Fully resolved parameters handed to the provider
pub type LaunchParameters = BTreeMap<String, String>;

const DOMAIN_DEFAULTS: &[(&str, &str)] = &[
    ("AllowInternetAccess", "%ALLOW_INTERNET_ACCESS%"),
    ("PeerVPC", "%PEER_VPC%"),
    ("PeerVPCRouteTable", "%PEER_VPC_ROUTE_TABLE%"),
    ("PeerVPCCIDRBlock", "%PEER_VPC_CIDR_BLOCK%"),
    ("VPNCustomerGateway", "%VPN_CUSTOMER_GATEWAY%"),
];

const NETWORK_DEFAULTS: &[(&str, &str)] = &[
    ("ClusterName", "%CLUSTER_NAME%"),
    ("FlightDomain", "%DOMAIN%"),
    ("FlightVPC", "%VPC%"),
    ("NetworkingPool", "%NETWORK_POOL%"),
    ("NetworkingIndex", "%NETWORK_INDEX%"),
    ("PublicRouteTable", "%PUB_ROUTE_TABLE%"),
];

const MASTER_DEFAULTS: &[(&str, &str)] = &[
    ("AccessKeyName", "%ACCESS_KEY_NAME%"),
    ("AccessNetwork", "%ACCESS_NETWORK%"),
    ("AdminUserName", "%ADMIN_USER_NAME%"),
    ("ClusterName", "%CLUSTER_NAME%"),
    ("FlightDomain", "%DOMAIN%"),
    ("FlightProfileBucket", "%PROFILE_BUCKET%"),
    ("FlightProfiles", "%MASTER_PROFILES%"),
    ("FlightFeatures", "%MASTER_FEATURES%"),
    ("MasterInstanceType", "%MASTER_INSTANCE_TYPE%"),
    ("MasterInstanceTypeOther", "%MASTER_INSTANCE_OVERRIDE%"),
    ("SchedulerType", "%SCHEDULER_TYPE%"),
    ("PreloadSoftware", "%PRELOAD_SOFTWARE%"),
    ("VolumeLayout", "%MASTER_VOLUME_LAYOUT%"),
    ("VolumeEncryptionPolicy", "%MASTER_VOLUME_ENCRYPTION_POLICY%"),
    ("SystemVolumeSize", "%MASTER_SYSTEM_VOLUME_SIZE%"),
    ("SystemVolumeType", "%MASTER_SYSTEM_VOLUME_TYPE%"),
    ("HomeVolumeSize", "%MASTER_HOME_VOLUME_SIZE%"),
    ("HomeVolumeType", "%MASTER_HOME_VOLUME_TYPE%"),
    ("AppsVolumeSize", "%MASTER_APPS_VOLUME_SIZE%"),
    ("AppsVolumeType", "%MASTER_APPS_VOLUME_TYPE%"),
    ("FlightVPC", "%VPC%"),
    ("PublicSubnet", "%PUB_SUBNET%"),
    ("ManagementSubnet", "%MGT_SUBNET%"),
    ("PrivateSubnet", "%PRV_SUBNET%"),
    ("PlacementGroup", "%PLACEMENT_GROUP%"),
];

const COMPUTE_DEFAULTS: &[(&str, &str)] = &[
    ("AccessKeyName", "%ACCESS_KEY_NAME%"),
    ("ClusterName", "%CLUSTER_NAME%"),
    ("FlightDomain", "%DOMAIN%"),
    ("FlightProfileBucket", "%PROFILE_BUCKET%"),
    ("FlightProfiles", "%COMPUTE_PROFILES%"),
    ("FlightFeatures", "%COMPUTE_FEATURES%"),
    ("ComputeInstanceType", "%COMPUTE_INSTANCE_TYPE%"),
    ("ComputeInstanceTypeOther", "%COMPUTE_INSTANCE_OVERRIDE%"),
    ("ComputeSpotPrice", "%COMPUTE_SPOT_PRICE%"),
    ("AutoscalingPolicy", "%COMPUTE_AUTOSCALING_POLICY%"),
    ("ComputeInitialNodes", "%COMPUTE_INITIAL_NODES%"),
    ("ComputeGroupLabel", "%COMPUTE_GROUP_LABEL%"),
    ("SystemVolumeType", "%COMPUTE_SYSTEM_VOLUME_TYPE%"),
    ("FlightVPC", "%VPC%"),
    ("PrivateSubnet", "%PRV_SUBNET%"),
    ("PlacementGroup", "%PLACEMENT_GROUP%"),
    ("MasterIP", "%MASTER_IP%"),
    ("ClusterUUID", "%CLUSTER_UUID%"),
    ("ClusterSecurityToken", "%CLUSTER_SECURITY_TOKEN%"),
];

const SOLO_DEFAULTS: &[(&str, &str)] = &[
    ("AccessKeyName", "%ACCESS_KEY_NAME%"),
    ("AccessNetwork", "%ACCESS_NETWORK%"),
    ("AdminUserName", "%ADMIN_USER_NAME%"),
    ("ClusterName", "%CLUSTER_NAME%"),
    ("FlightProfileBucket", "%PROFILE_BUCKET%"),
    ("FlightProfiles", "%MASTER_PROFILES%"),
    ("FlightFeatures", "%MASTER_FEATURES%"),
    ("MasterInstanceType", "%MASTER_INSTANCE_TYPE%"),
    ("MasterInstanceTypeOther", "%MASTER_INSTANCE_OVERRIDE%"),
    ("SchedulerType", "%SCHEDULER_TYPE%"),
    ("PreloadSoftware", "%PRELOAD_SOFTWARE%"),
    ("SystemVolumeSize", "%MASTER_SYSTEM_VOLUME_SIZE%"),
    ("SystemVolumeType", "%MASTER_SYSTEM_VOLUME_TYPE%"),
    ("ComputeInstanceType", "%COMPUTE_INSTANCE_TYPE%"),
    ("ComputeInstanceTypeOther", "%COMPUTE_INSTANCE_OVERRIDE%"),
    ("ComputeSpotPrice", "%COMPUTE_SPOT_PRICE%"),
    ("AutoscalingPolicy", "%COMPUTE_AUTOSCALING_POLICY%"),
    ("ComputeInitialNodes", "%COMPUTE_INITIAL_NODES%"),
];

/// The named parameter tables, one per stack template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSetKind {
    Domain,
    ClusterNetwork,
    ClusterMaster,
    ClusterCompute,
    Solo,
}

impl ParameterSetKind {
    pub const ALL: [ParameterSetKind; 5] = [
        ParameterSetKind::Domain,
        ParameterSetKind::ClusterNetwork,
        ParameterSetKind::ClusterMaster,
        ParameterSetKind::ClusterCompute,
        ParameterSetKind::Solo,
    ];

    /// File stem inside a parameter directory
    pub fn name(self) -> &'static str {
        match self {
            ParameterSetKind::Domain => "domain",
            ParameterSetKind::ClusterNetwork => "cluster-network",
            ParameterSetKind::ClusterMaster => "cluster-master",
            ParameterSetKind::ClusterCompute => "cluster-compute",
            ParameterSetKind::Solo => "solo",
        }
    }

    pub fn defaults(self) -> ParameterSet {
        let table = match self {
            ParameterSetKind::Domain => DOMAIN_DEFAULTS,
            ParameterSetKind::ClusterNetwork => NETWORK_DEFAULTS,
            ParameterSetKind::ClusterMaster => MASTER_DEFAULTS,
            ParameterSetKind::ClusterCompute => COMPUTE_DEFAULTS,
            ParameterSetKind::Solo => SOLO_DEFAULTS,
        };
        table
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

fn parameter_error(path: &Path, message: impl ToString) -> EngineError {
    EngineError::Parameters {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Read a YAML `Name: value` table
pub fn load_parameter_file(path: &Path) -> Result<ParameterSet> {
    let content = std::fs::read_to_string(path).map_err(|e| parameter_error(path, e))?;
    let table: Option<BTreeMap<String, serde_yaml::Value>> =
        serde_yaml::from_str(&content).map_err(|e| parameter_error(path, e))?;

    table
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| -> Result<(String, String)> {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => return Err(parameter_error(path, format!("'{}' is not a scalar", key))),
            };
            Ok((key, value))
        })
        .collect()
}

/// The table for `kind`: the parameter directory's `<kind>.yml` when it
/// exists and is non-empty, else the built-in defaults
pub fn load_parameter_set(config: &Configuration, kind: ParameterSetKind) -> Result<ParameterSet> {
    if let Some(dir) = &config.parameter_directory {
        let path = dir.join(format!("{}.yml", kind.name()));
        if path.exists() {
            let set = load_parameter_file(&path)?;
            if !set.is_empty() {
                tracing::debug!(path = %path.display(), "Using parameter file");
                return Ok(set);
            }
        }
    }
    Ok(kind.defaults())
}

/// An explicit parameter file if given, else the configured set
pub fn parameters_for(
    config: &Configuration,
    kind: ParameterSetKind,
    file: Option<&Path>,
) -> Result<ParameterSet> {
    match file {
        Some(path) => load_parameter_file(path),
        None => load_parameter_set(config, kind),
    }
}

/// Write every default table into `dir`, which must not exist yet
pub fn write_parameter_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir(dir)?;
    ParameterSetKind::ALL
        .into_iter()
        .map(|kind| -> Result<PathBuf> {
            let path = dir.join(format!("{}.yml", kind.name()));
            let yaml = serde_yaml::to_string(&kind.defaults())
                .map_err(|e| parameter_error(&path, e))?;
            std::fs::write(&path, yaml)?;
            Ok(path)
        })
        .collect()
}

fn placeholder(value: &str) -> Option<&str> {
    value
        .strip_prefix('%')
        .and_then(|v| v.strip_suffix('%'))
        .filter(|v| !v.is_empty())
}

/// `%PEER_VPC%` -> setting `peer-vpc`
fn setting_for(config: &Configuration, name: &str) -> Option<String> {
    let key = name.to_lowercase().replace('_', "-");
    config.setting(&key).map(str::to_string)
}

/// Resolve placeholders that only read the configuration
pub fn resolve_domain_parameters(config: &Configuration, set: &ParameterSet) -> LaunchParameters {
    set.iter()
        .filter_map(|(key, value)| {
            let resolved = match placeholder(value) {
                Some(name) => setting_for(config, name)?,
                None => value.clone(),
            };
            Some((key.clone(), resolved))
        })
        .collect()
}

/// What has been launched so far for the cluster being built
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub cluster: &'a str,
    pub domain: Option<&'a Domain>,
    pub network: Option<&'a ClusterNetwork>,
    pub master: Option<&'a Master>,
}

impl<'a> LaunchContext<'a> {
    pub fn new(cluster: &'a str) -> Self {
        Self {
            cluster,
            domain: None,
            network: None,
            master: None,
        }
    }

    pub fn with_domain(mut self, domain: &'a Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_network(mut self, network: &'a ClusterNetwork) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_master(mut self, master: &'a Master) -> Self {
        self.master = Some(master);
        self
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn compute_override(config: &Configuration) -> Option<&str> {
    config
        .setting("compute-instance-override")
        .or_else(|| config.setting("queue-instance-override"))
}

/// Resolve one cluster placeholder; `None` drops the parameter
fn resolve_cluster_placeholder(
    config: &Configuration,
    ctx: &LaunchContext<'_>,
    name: &str,
) -> Option<String> {
    match name {
        "CLUSTER_NAME" => Some(ctx.cluster.to_string()),
        "ACCESS_KEY_NAME" => non_empty(&config.access_key_name),
        "MASTER_INSTANCE_TYPE" => match config.setting("master-instance-override") {
            Some(_) => Some("other".to_string()),
            None => setting_for(config, "MASTER_INSTANCE_TYPE"),
        },
        "MASTER_INSTANCE_OVERRIDE" => setting_for(config, name),
        "MASTER_FEATURES" => Some(match config.setting("master-features") {
            Some(features) => format!("{} password-auth", features),
            None => "password-auth".to_string(),
        }),
        "COMPUTE_INSTANCE_TYPE" => match compute_override(config) {
            Some(_) => Some("other".to_string()),
            None => config
                .setting("compute-instance-type")
                .or_else(|| config.setting("queue-instance-type"))
                .or_else(|| config.setting("default-queue-instance-type"))
                .map(str::to_string),
        },
        "COMPUTE_INSTANCE_OVERRIDE" => compute_override(config).map(str::to_string),
        "VPC" => ctx.domain.and_then(|d| non_empty(d.vpc())),
        "PUB_ROUTE_TABLE" => ctx.domain.and_then(|d| non_empty(d.public_route_table())),
        "DOMAIN" => ctx.domain.and_then(|d| non_empty(d.prefix())),
        "NETWORK_POOL" => ctx.network.map(ClusterNetwork::network_pool),
        "NETWORK_INDEX" => ctx.network.map(ClusterNetwork::network_index),
        "PUB_SUBNET" => ctx.network.and_then(|n| non_empty(n.public_subnet())),
        "MGT_SUBNET" => ctx.network.and_then(|n| non_empty(n.management_subnet())),
        "PRV_SUBNET" => ctx.network.and_then(|n| non_empty(n.private_subnet())),
        "PLACEMENT_GROUP" => ctx.network.and_then(|n| non_empty(n.placement_group())),
        "MASTER_IP" => ctx.master.and_then(|m| non_empty(m.private_ip())),
        "CLUSTER_UUID" => ctx.master.and_then(Master::cluster_uuid),
        "CLUSTER_SECURITY_TOKEN" => ctx.master.and_then(Master::security_token),
        _ => setting_for(config, name),
    }
}

/// Resolve a cluster-side table (network, master, compute, solo, component)
pub fn resolve_cluster_parameters(
    config: &Configuration,
    set: &ParameterSet,
    ctx: &LaunchContext<'_>,
) -> LaunchParameters {
    set.iter()
        .filter_map(|(key, value)| {
            let resolved = match placeholder(value) {
                Some(name) => resolve_cluster_placeholder(config, ctx, name)?,
                None => value.clone(),
            };
            Some((key.clone(), resolved))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkIndex;
    use flightdeck_cloud::{StackDescriptor, StackStatus, tags};

    fn domain() -> Domain {
        Domain::from_stack(
            StackDescriptor::new("flight-lab", StackStatus::CreateComplete)
                .with_tag(tags::TYPE, "domain")
                .with_tag(tags::DOMAIN, "lab")
                .with_tag(tags::PREFIX, "lb")
                .with_output("FlightVPC", "vpc-1")
                .with_output("PubRouteTable", "rtb-1"),
        )
        .unwrap()
    }

    #[test]
    fn test_domain_parameters_drop_unset() {
        let config = Configuration::default();
        let params = resolve_domain_parameters(&config, &ParameterSetKind::Domain.defaults());
        assert_eq!(params.get("AllowInternetAccess").map(String::as_str), Some("1"));
        assert!(!params.contains_key("PeerVPC"));
        assert!(!params.contains_key("VPNCustomerGateway"));
    }

    #[test]
    fn test_literal_values_pass_through() {
        let config = Configuration::default();
        let set = ParameterSet::from([("Custom".to_string(), "literal".to_string())]);
        let params = resolve_domain_parameters(&config, &set);
        assert_eq!(params["Custom"], "literal");
    }

    #[test]
    fn test_network_parameters() {
        let config = Configuration::default();
        let domain = domain();
        let network = ClusterNetwork {
            index: NetworkIndex::new(40).unwrap(),
            stack: None,
        };
        let ctx = LaunchContext::new("hpc").with_domain(&domain).with_network(&network);
        let params = resolve_cluster_parameters(
            &config,
            &ParameterSetKind::ClusterNetwork.defaults(),
            &ctx,
        );
        assert_eq!(params["ClusterName"], "hpc");
        assert_eq!(params["FlightDomain"], "lb");
        assert_eq!(params["FlightVPC"], "vpc-1");
        assert_eq!(params["NetworkingPool"], "2");
        assert_eq!(params["NetworkingIndex"], "9");
        assert_eq!(params["PublicRouteTable"], "rtb-1");
    }

    #[test]
    fn test_master_instance_override() {
        let mut config = Configuration::default();
        let ctx = LaunchContext::new("hpc");
        let set = ParameterSetKind::ClusterMaster.defaults();

        let params = resolve_cluster_parameters(&config, &set, &ctx);
        assert_eq!(params["MasterInstanceType"], "small-t2.large");
        assert!(!params.contains_key("MasterInstanceTypeOther"));
        assert_eq!(params["FlightFeatures"], "password-auth");
        // no network yet
        assert!(!params.contains_key("PublicSubnet"));

        config.set_setting("master-instance-override", "c4.large-2C-3.75GB");
        config.set_setting("master-features", "vpn");
        let params = resolve_cluster_parameters(&config, &set, &ctx);
        assert_eq!(params["MasterInstanceType"], "other");
        assert_eq!(params["MasterInstanceTypeOther"], "c4.large-2C-3.75GB");
        assert_eq!(params["FlightFeatures"], "vpn password-auth");
    }

    #[test]
    fn test_compute_instance_type_fallback() {
        let mut config = Configuration::default();
        let ctx = LaunchContext::new("hpc");
        let set = ParameterSetKind::ClusterCompute.defaults();

        let params = resolve_cluster_parameters(&config, &set, &ctx);
        assert_eq!(params["ComputeInstanceType"], "compute-2C-3.75GB.small-c4.large");

        config.set_setting("queue-instance-type", "memory-4C-30GB.small-r3.xlarge");
        let params = resolve_cluster_parameters(&config, &set, &ctx);
        assert_eq!(params["ComputeInstanceType"], "memory-4C-30GB.small-r3.xlarge");

        config.set_setting("compute-instance-type", "gpu-1GPU-8C-15GB.small-g2.2xlarge");
        let params = resolve_cluster_parameters(&config, &set, &ctx);
        assert_eq!(params["ComputeInstanceType"], "gpu-1GPU-8C-15GB.small-g2.2xlarge");
    }

    #[test]
    fn test_compute_reads_master_outputs() {
        let config = Configuration::default();
        let master = Master {
            stack: StackDescriptor::new("flight-lab-hpc-master", StackStatus::CreateComplete)
                .with_output("MasterPrivateIP", "10.75.0.10")
                .with_output(
                    "ConfigurationResult",
                    "{&quot;Data&quot;:&quot;UUID:u-1;Token:t-1&quot;}",
                ),
        };
        let ctx = LaunchContext::new("hpc").with_master(&master);
        let params = resolve_cluster_parameters(
            &config,
            &ParameterSetKind::ClusterCompute.defaults(),
            &ctx,
        );
        assert_eq!(params["MasterIP"], "10.75.0.10");
        assert_eq!(params["ClusterUUID"], "u-1");
        assert_eq!(params["ClusterSecurityToken"], "t-1");
    }

    #[test]
    fn test_parameter_directory_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let params_dir = dir.path().join("params");
        let written = write_parameter_directory(&params_dir).unwrap();
        assert_eq!(written.len(), 5);

        std::fs::write(params_dir.join("domain.yml"), "AllowInternetAccess: '0'\n").unwrap();
        // empty files fall back to defaults
        std::fs::write(params_dir.join("solo.yml"), "").unwrap();

        let mut config = Configuration::default();
        config.parameter_directory = Some(params_dir.clone());

        let domain = load_parameter_set(&config, ParameterSetKind::Domain).unwrap();
        assert_eq!(domain.len(), 1);
        assert_eq!(domain["AllowInternetAccess"], "0");

        let solo = load_parameter_set(&config, ParameterSetKind::Solo).unwrap();
        assert_eq!(solo, ParameterSetKind::Solo.defaults());

        let network = load_parameter_set(&config, ParameterSetKind::ClusterNetwork).unwrap();
        assert_eq!(network, ParameterSetKind::ClusterNetwork.defaults());

        assert!(write_parameter_directory(&params_dir).is_err());
    }

    #[test]
    fn test_bad_parameter_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "Nested:\n  - a\n").unwrap();
        assert!(matches!(
            load_parameter_file(&path),
            Err(EngineError::Parameters { .. })
        ));
        assert!(load_parameter_file(&dir.path().join("missing.yml")).is_err());
    }
}
