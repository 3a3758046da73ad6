//! Infrastructure appliance descriptors

use crate::catalog::APPLIANCE_INSTANCE_TYPES;
use crate::error::EngineError;
use crate::model::Domain;
use flightdeck_cloud::StackDescriptor;
use flightdeck_config::Configuration;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The appliances a domain can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplianceKind {
    Directory,
    StorageManager,
    AccessManager,
}

impl ApplianceKind {
    pub const ALL: [ApplianceKind; 3] = [
        ApplianceKind::Directory,
        ApplianceKind::StorageManager,
        ApplianceKind::AccessManager,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ApplianceKind::Directory => "directory",
            ApplianceKind::StorageManager => "storage-manager",
            ApplianceKind::AccessManager => "access-manager",
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            ApplianceKind::Directory => "directory.json",
            ApplianceKind::StorageManager => "storage-manager.json",
            ApplianceKind::AccessManager => "access-manager.json",
        }
    }

    /// Resources the template creates
    pub fn resource_count(self) -> usize {
        match self {
            ApplianceKind::Directory => 11,
            ApplianceKind::StorageManager | ApplianceKind::AccessManager => 9,
        }
    }

    /// `<name>-instance-type`, then `appliance-instance-type`, then the
    /// smallest catalog size
    pub fn instance_type(self, config: &Configuration) -> String {
        config
            .setting(&format!("{}-instance-type", self.name()))
            .or_else(|| config.setting("appliance-instance-type"))
            .unwrap_or(APPLIANCE_INSTANCE_TYPES[0])
            .to_string()
    }

    pub fn launch_parameters(self, config: &Configuration, domain: &Domain) -> BTreeMap<String, String> {
        let setting = |key: &str| config.setting(key).unwrap_or_default().to_string();
        let mut params = BTreeMap::from([
            ("AccessKeyName".to_string(), config.access_key_name.clone()),
            ("AccessNetwork".to_string(), setting("access-network")),
            ("FlightProfileBucket".to_string(), setting("profile-bucket")),
            (
                "FlightProfiles".to_string(),
                setting(&format!("{}-profiles", self.name())),
            ),
            ("ApplianceInstanceType".to_string(), self.instance_type(config)),
            ("FlightDomain".to_string(), domain.prefix().to_string()),
            ("FlightVPC".to_string(), domain.vpc().to_string()),
            ("FlightPublicSubnet".to_string(), domain.public_subnet().to_string()),
        ]);
        match self {
            ApplianceKind::Directory => {
                params.insert(
                    "FlightManagementSubnet".to_string(),
                    domain.management_subnet().to_string(),
                );
            }
            ApplianceKind::StorageManager | ApplianceKind::AccessManager => {
                params.insert(
                    "FlightFeatures".to_string(),
                    setting(&format!("{}-features", self.name())),
                );
            }
        }
        params
    }

    /// Labelled access details read from a launched appliance stack
    pub fn access_details(self, stack: &StackDescriptor) -> Vec<(&'static str, String)> {
        let output = |key: &str| stack.output(key).unwrap_or_default().to_string();
        match self {
            ApplianceKind::Directory => vec![
                ("IP address", output("DirectoryAccessIP")),
                ("Key pair", stack.parameter("AccessKeyName").unwrap_or_default().to_string()),
                ("Access URL", output("DirectoryWebAccess")),
                ("Administrator password", directory_password(stack).unwrap_or_default()),
            ],
            ApplianceKind::StorageManager => {
                vec![("Access URL", output("StorageManagerWebAccess"))]
            }
            ApplianceKind::AccessManager => {
                vec![("Access URL", output("AccessManagerWebAccess"))]
            }
        }
    }
}

/// Third word of the `Data` payload of the configuration result
fn directory_password(stack: &StackDescriptor) -> Option<String> {
    let raw = stack.output("ConfigurationResult")?;
    let data = raw.split('"').nth(3)?;
    data.split(' ').nth(2).map(str::to_string)
}

impl fmt::Display for ApplianceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApplianceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplianceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| EngineError::UnknownAppliance(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightdeck_cloud::{StackStatus, tags};

    fn domain() -> Domain {
        let stack = StackDescriptor::new("flight-lab", StackStatus::CreateComplete)
            .with_tag(tags::TYPE, "domain")
            .with_tag(tags::DOMAIN, "lab")
            .with_tag(tags::PREFIX, "lab")
            .with_output("FlightVPC", "vpc-1")
            .with_output("PubSubnet", "subnet-p")
            .with_output("MgtSubnet", "subnet-m");
        Domain::from_stack(stack).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "storage-manager".parse::<ApplianceKind>().unwrap(),
            ApplianceKind::StorageManager
        );
        assert!(matches!(
            "monitor".parse::<ApplianceKind>(),
            Err(EngineError::UnknownAppliance(_))
        ));
    }

    #[test]
    fn test_directory_parameters() {
        let config = Configuration::default();
        let params = ApplianceKind::Directory.launch_parameters(&config, &domain());
        assert_eq!(params["FlightManagementSubnet"], "subnet-m");
        assert_eq!(params["FlightVPC"], "vpc-1");
        assert_eq!(params["ApplianceInstanceType"], "small-t2.large");
        assert!(!params.contains_key("FlightFeatures"));
    }

    #[test]
    fn test_instance_type_fallback() {
        let mut config = Configuration::default();
        config.set_setting("access-manager-instance-type", "");
        config.set_setting("appliance-instance-type", "large-c4.8xlarge");
        let params = ApplianceKind::AccessManager.launch_parameters(&config, &domain());
        assert_eq!(params["ApplianceInstanceType"], "large-c4.8xlarge");
        assert!(params.contains_key("FlightFeatures"));
    }

    #[test]
    fn test_directory_access_details() {
        let stack = StackDescriptor::new("flight-lab-directory", StackStatus::CreateComplete)
            .with_output("DirectoryAccessIP", "10.0.0.5")
            .with_output("ConfigurationResult", "{\"Data\":\"admin password s3cret\"}")
            .with_parameter("AccessKeyName", "lab-key");
        let details = ApplianceKind::Directory.access_details(&stack);
        assert_eq!(details[0], ("IP address", "10.0.0.5".to_string()));
        assert_eq!(details[3], ("Administrator password", "s3cret".to_string()));
    }
}
