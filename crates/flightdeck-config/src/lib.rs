//! Flightdeck configuration
//!
//! Settings come from a YAML file, then `FLIGHT_*` environment variables,
//! then the standard AWS variables for credentials and region.

pub mod error;

pub use error::*;

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Template bucket used when no `template-root` is configured
pub const DEFAULT_TEMPLATE_ROOT: &str = "https://s3-eu-west-1.amazonaws.com/alces-flight/Templates";

pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_KEY_PAIR: &str = "flight-admin";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "FLIGHTDECK_CONFIG";

const ENV_PREFIX: &str = "FLIGHT_";

const REGION_PATTERN: &str = r"^[a-z]{2}-[a-z]+-[1-9]$";

/// Launch tunables and their defaults
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("admin-user-name", "alces"),
    ("access-network", "0.0.0.0/0"),
    ("scheduler-type", "gridscheduler"),
    ("profile-bucket", ""),
    ("appliance-instance-type", ""),
    ("directory-profiles", ""),
    ("directory-features", ""),
    ("directory-instance-type", "small-t2.large"),
    ("access-manager-profiles", ""),
    ("access-manager-features", ""),
    ("access-manager-instance-type", "small-t2.large"),
    ("storage-manager-profiles", ""),
    ("storage-manager-features", ""),
    ("storage-manager-instance-type", "small-t2.large"),
    ("master-profiles", ""),
    ("master-features", ""),
    ("master-instance-type", "small-t2.large"),
    ("master-instance-override", ""),
    ("preload-software", ""),
    ("master-volume-layout", "standard"),
    ("master-volume-encryption-policy", "unencrypted"),
    ("master-system-volume-size", "500"),
    ("master-system-volume-type", "magnetic.standard"),
    ("master-home-volume-size", "400"),
    ("master-home-volume-type", "magnetic.standard"),
    ("master-apps-volume-size", "100"),
    ("master-apps-volume-type", "magnetic.standard"),
    ("compute-profiles", ""),
    ("compute-features", ""),
    ("default-queue-instance-type", "compute-2C-3.75GB.small-c4.large"),
    ("queue-instance-type", ""),
    ("queue-instance-override", ""),
    ("compute-spot-price", "0.5"),
    ("compute-autoscaling-policy", "enabled"),
    ("compute-group-label", ""),
    ("compute-initial-nodes", "1"),
    ("compute-system-volume-type", "magnetic.standard"),
    ("peer-vpc", ""),
    ("peer-vpc-route-table", ""),
    ("peer-vpc-cidr-block", ""),
    ("vpn-customer-gateway", ""),
    ("allow-internet-access", "1"),
];

/// File layout; anything not named here lands in `settings`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    region: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    key_pair: Option<String>,
    domain: Option<String>,
    template_root: Option<String>,
    template_set: Option<String>,
    parameter_directory: Option<PathBuf>,
    #[serde(flatten)]
    settings: BTreeMap<String, serde_yaml::Value>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// EC2 key pair installed on cluster instances
    pub access_key_name: String,
    /// Domain used when a command does not name one
    pub domain: Option<String>,
    pub template_root: String,
    pub template_set: String,
    pub parameter_directory: Option<PathBuf>,
    pub settings: BTreeMap<String, String>,
    /// Region came from the file rather than the default
    explicit_region: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            access_key: None,
            secret_key: None,
            access_key_name: DEFAULT_KEY_PAIR.to_string(),
            domain: None,
            template_root: DEFAULT_TEMPLATE_ROOT.to_string(),
            template_set: String::new(),
            parameter_directory: None,
            settings: DEFAULT_SETTINGS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            explicit_region: false,
        }
    }
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Value of `FLIGHT_<KEY>` with dashes turned into underscores
fn env_override(key: &str) -> Option<String> {
    let var = format!("{}{}", ENV_PREFIX, key.replace('-', "_").to_uppercase());
    non_empty(std::env::var(var).ok())
}

impl Configuration {
    /// Discover, read and resolve the configuration.
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file()? {
            Some(path) => {
                tracing::debug!("Using config file: {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let file: Option<ConfigFile> = serde_yaml::from_str(content)?;
        let file = file.unwrap_or_default();
        let mut config = Self::default();

        if let Some(region) = non_empty(file.region) {
            config.region = region;
            config.explicit_region = true;
        }
        config.access_key = non_empty(file.access_key);
        config.secret_key = non_empty(file.secret_key);
        if let Some(key_pair) = non_empty(file.key_pair) {
            config.access_key_name = key_pair;
        }
        config.domain = non_empty(file.domain);
        if let Some(root) = non_empty(file.template_root) {
            config.template_root = root;
        }
        if let Some(set) = file.template_set {
            config.template_set = set;
        }
        config.parameter_directory = file.parameter_directory;

        for (key, value) in &file.settings {
            match scalar(value) {
                Some(v) => {
                    config.settings.insert(key.clone(), v);
                }
                None => tracing::warn!("Ignoring non-scalar setting '{}'", key),
            }
        }
        Ok(config)
    }

    /// Apply `FLIGHT_*` overrides, then the AWS fallbacks for unset values
    pub fn apply_env(&mut self) {
        if let Some(v) = env_override("region") {
            self.region = v;
            self.explicit_region = true;
        }
        if let Some(v) = env_override("access-key") {
            self.access_key = Some(v);
        }
        if let Some(v) = env_override("secret-key") {
            self.secret_key = Some(v);
        }
        if let Some(v) = env_override("key-pair") {
            self.access_key_name = v;
        }
        if let Some(v) = env_override("domain") {
            self.domain = Some(v);
        }
        if let Some(v) = env_override("template-root") {
            self.template_root = v;
        }
        if let Some(v) = env_override("template-set") {
            self.template_set = v;
        }
        for (key, value) in self.settings.iter_mut() {
            if let Some(v) = env_override(key) {
                *value = v;
            }
        }

        if !self.explicit_region {
            if let Some(v) = non_empty(std::env::var("AWS_REGION").ok()) {
                self.region = v;
            }
        }
        if self.access_key.is_none() {
            self.access_key = non_empty(std::env::var("AWS_ACCESS_KEY_ID").ok());
        }
        if self.secret_key.is_none() {
            self.secret_key = non_empty(std::env::var("AWS_SECRET_ACCESS_KEY").ok());
        }
    }

    /// Check the region looks like `eu-west-1` before any provider call
    pub fn validate_region(&self) -> Result<()> {
        let pattern = Regex::new(REGION_PATTERN).map_err(|e| ConfigError::InvalidValue {
            key: "region".to_string(),
            message: e.to_string(),
        })?;
        if pattern.is_match(&self.region) {
            Ok(())
        } else {
            Err(ConfigError::InvalidRegion(self.region.clone()))
        }
    }

    /// URL of a template file under the configured root and set
    pub fn template_url(&self, name: &str) -> String {
        if self.template_set.is_empty() {
            format!("{}/{}", self.template_root, name)
        } else {
            format!("{}/{}/{}", self.template_root, self.template_set, name)
        }
    }

    /// A launch tunable; empty values count as unset
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Static credentials, when both halves are configured
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.access_key, &self.secret_key) {
            (Some(k), Some(s)) => Some((k.clone(), s.clone())),
            _ => None,
        }
    }

    /// Defaults rendered as a YAML document, for `config init`-style output
    pub fn render_defaults() -> std::result::Result<String, serde_yaml::Error> {
        let mut doc = BTreeMap::new();
        doc.insert("region".to_string(), DEFAULT_REGION.to_string());
        doc.insert("key-pair".to_string(), DEFAULT_KEY_PAIR.to_string());
        doc.insert("template-root".to_string(), DEFAULT_TEMPLATE_ROOT.to_string());
        for (k, v) in DEFAULT_SETTINGS {
            doc.insert(k.to_string(), v.to_string());
        }
        serde_yaml::to_string(&doc)
    }
}

/// Flightdeck's configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("flightdeck"))
}

/// Locate the configuration file
///
/// Search order:
/// 1. `FLIGHTDECK_CONFIG` (direct path)
/// 2. `./flightdeck.yml`
/// 3. `~/.flightdeck.yml`
/// 4. `<config dir>/flightdeck/config.yml`
///
/// No file at all is not an error; defaults apply.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let local = std::env::current_dir()?.join("flightdeck.yml");
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join(".flightdeck.yml");
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("flightdeck").join("config.yml");
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
