//! Stack descriptors as read back from the infrastructure provider

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag keys written on every stack created by Flightdeck
pub mod tags {
    pub const TYPE: &str = "flight:type";
    pub const TEMPLATE: &str = "flight:template";
    pub const DOMAIN: &str = "flight:domain";
    pub const PREFIX: &str = "flight:prefix";
    pub const CLUSTER: &str = "flight:cluster";
    pub const NETWORK: &str = "flight:network";
    pub const APPLIANCE: &str = "flight:appliance";
    pub const QUEUE: &str = "flight:queue";
    pub const EXPIRY: &str = "flight:expiry";
}

/// Prefix shared by every stack name, topic and queue Flightdeck owns
pub const NAME_PREFIX: &str = "flight-";

/// Provider stack status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    RollbackInProgress,
    RollbackComplete,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    /// Any status Flightdeck does not act on
    Other(String),
}

impl StackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::Other(s) => s,
        }
    }

    /// Statuses considered "running" when listing stacks
    pub fn running() -> [StackStatus; 2] {
        [StackStatus::CreateComplete, StackStatus::CreateInProgress]
    }
}

impl From<&str> for StackStatus {
    fn from(s: &str) -> Self {
        match s {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => StackStatus::RollbackInProgress,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            other => StackStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for StackStatus {
    fn from(s: String) -> Self {
        StackStatus::from(s.as_str())
    }
}

impl From<StackStatus> for String {
    fn from(status: StackStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stack as described by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDescriptor {
    pub name: String,
    pub status: StackStatus,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
}

impl StackDescriptor {
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            status,
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    /// Value of the `flight:type` tag
    pub fn stack_type(&self) -> Option<&str> {
        self.tag(tags::TYPE)
    }

    /// Whether the stack was launched by Flightdeck
    pub fn is_flight_stack(&self) -> bool {
        self.name.starts_with(NAME_PREFIX)
    }

    /// Look up a value in the `ConfigurationResult` output
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.config_values()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Decode the `ConfigurationResult` output.
    ///
    /// The output holds an HTML-escaped JSON object whose `Data` string is a
    /// `;`-separated list of `key:value` or `key=value` entries. A bare key
    /// means `true`.
    pub fn config_values(&self) -> Vec<(String, String)> {
        let Some(raw) = self.output("ConfigurationResult") else {
            return Vec::new();
        };
        let result: ConfigurationResult = match serde_json::from_str(&unescape_html(raw)) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(stack = %self.name, "Unreadable ConfigurationResult: {}", e);
                return Vec::new();
            }
        };
        result
            .data
            .split(';')
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut tuple: Vec<&str> = entry.split(':').collect();
                if tuple.len() != 2 {
                    tuple = entry.split('=').collect();
                }
                if tuple.len() == 1 {
                    (tuple[0].to_string(), "true".to_string())
                } else {
                    (tuple[0].to_string(), tuple[1].trim().to_string())
                }
            })
            .collect()
    }
}

/// Body of the `ConfigurationResult` output
#[derive(Debug, Deserialize)]
struct ConfigurationResult {
    #[serde(rename = "Data")]
    data: String,
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Summary row returned when listing stacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSummary {
    pub name: String,
    pub status: StackStatus,
}

/// A physical resource belonging to a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackResource {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
    pub status: String,
}

/// Request to create a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStackRequest {
    pub name: String,
    pub template_url: String,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    /// Topic that receives the stack's resource notifications
    pub notification_topic: Option<String>,
}

impl CreateStackRequest {
    pub fn new(name: impl Into<String>, template_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_url: template_url.into(),
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            notification_topic: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.notification_topic = Some(topic.into());
        self
    }
}
