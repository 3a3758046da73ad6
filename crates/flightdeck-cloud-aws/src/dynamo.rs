//! DynamoDB-backed [`EntityStore`]

use crate::error::{build_error, enum_text, from_sdk};
use crate::provider::AwsCloud;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ScalarAttributeType, TableStatus,
};
use flightdeck_cloud::{
    CLUSTERS_TABLE, CloudError, ClusterEntity, DOMAINS_TABLE, DomainEntity, EntityStore, Result,
};
use std::collections::HashMap;
use std::time::Duration;

const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";
const RESOURCE_IN_USE: &str = "ResourceInUseException";
const TABLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const TABLE_POLL_ATTEMPTS: u32 = 60;
const GROUP_COUNT_ATTEMPTS: u32 = 3;

type Item = HashMap<String, AttributeValue>;

/// Entity store over the `FlightDomains` and `FlightClusters` tables
#[derive(Debug, Clone)]
pub struct DynamoEntityStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoEntityStore {
    pub fn new(cloud: &AwsCloud) -> Self {
        Self {
            client: cloud.dynamodb.clone(),
        }
    }

    async fn create_table(&self, table: &str) -> Result<()> {
        let attribute = AttributeDefinition::builder()
            .attribute_name("Name")
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| build_error("AttributeDefinition", e))?;
        let key = KeySchemaElement::builder()
            .attribute_name("Name")
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| build_error("KeySchemaElement", e))?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(1)
            .write_capacity_units(1)
            .build()
            .map_err(|e| build_error("ProvisionedThroughput", e))?;

        let result = self
            .client
            .create_table()
            .table_name(table)
            .attribute_definitions(attribute)
            .key_schema(key)
            .provisioned_throughput(throughput)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(table, "Created entity table");
                self.wait_until_active(table).await
            }
            Err(err) => match from_sdk(err) {
                CloudError::Api { code: Some(c), .. } if c == RESOURCE_IN_USE => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn wait_until_active(&self, table: &str) -> Result<()> {
        for _ in 0..TABLE_POLL_ATTEMPTS {
            let output = self
                .client
                .describe_table()
                .table_name(table)
                .send()
                .await
                .map_err(from_sdk)?;
            let status = output.table().map(|t| enum_text(t.table_status())).unwrap_or_default();
            if status == TableStatus::Active.as_str() {
                return Ok(());
            }
            tokio::time::sleep(TABLE_POLL_INTERVAL).await;
        }
        Err(CloudError::StateError(format!("Table {} did not become active", table)))
    }

    async fn get_item(&self, table: &str, name: &str) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key("Name", AttributeValue::S(name.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(output.item().cloned())
    }

    async fn delete_item(&self, table: &str, name: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(table)
            .key("Name", AttributeValue::S(name.to_string()))
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    /// Apply a set update guarded by `condition`; a failed guard maps to
    /// `ConditionFailed`.
    async fn update_bookings(
        &self,
        domain: &str,
        index: u8,
        update: &str,
        condition: &str,
    ) -> Result<()> {
        let result = self
            .client
            .update_item()
            .table_name(DOMAINS_TABLE)
            .key("Name", AttributeValue::S(domain.to_string()))
            .update_expression(update)
            .condition_expression(condition)
            .expression_attribute_names("#b", "NetBookings")
            .expression_attribute_values(":set", AttributeValue::Ns(vec![index.to_string()]))
            .expression_attribute_values(":idx", AttributeValue::N(index.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match from_sdk(err) {
                CloudError::Api { code: Some(c), message, .. } if c == CONDITIONAL_CHECK_FAILED => {
                    Err(CloudError::ConditionFailed(format!(
                        "{} (domain {}, network {})",
                        message, domain, index
                    )))
                }
                other => Err(other),
            },
        }
    }
}

impl DynamoEntityStore {
    /// `ADD GroupCount :delta` on an existing cluster item. A decrement is
    /// guarded so the count never drops below zero; `false` means the guard
    /// failed.
    async fn add_to_group_count(&self, name: &str, delta: i64) -> Result<bool> {
        let mut request = self
            .client
            .update_item()
            .table_name(CLUSTERS_TABLE)
            .key("Name", AttributeValue::S(name.to_string()))
            .update_expression("ADD #g :delta")
            .expression_attribute_names("#n", "Name")
            .expression_attribute_names("#g", "GroupCount")
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()));
        request = if delta < 0 {
            request
                .condition_expression("attribute_exists(#n) AND #g >= :floor")
                .expression_attribute_values(":floor", AttributeValue::N((-delta).to_string()))
        } else {
            request.condition_expression("attribute_exists(#n)")
        };
        conditional(request.send().await.map(|_| ()).map_err(from_sdk))
    }

    /// Clamp an existing cluster's group count to zero when it is below `floor`
    async fn zero_group_count(&self, name: &str, floor: i64) -> Result<bool> {
        let result = self
            .client
            .update_item()
            .table_name(CLUSTERS_TABLE)
            .key("Name", AttributeValue::S(name.to_string()))
            .update_expression("SET #g = :zero")
            .condition_expression("attribute_exists(#n) AND #g < :floor")
            .expression_attribute_names("#n", "Name")
            .expression_attribute_names("#g", "GroupCount")
            .expression_attribute_values(":zero", AttributeValue::N("0".to_string()))
            .expression_attribute_values(":floor", AttributeValue::N(floor.to_string()))
            .send()
            .await;
        conditional(result.map(|_| ()).map_err(from_sdk))
    }
}

/// Map a failed condition to `Ok(false)`
fn conditional(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(CloudError::Api { code: Some(c), .. }) if c == CONDITIONAL_CHECK_FAILED => Ok(false),
        Err(e) => Err(e),
    }
}

fn string_attr(item: &Item, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default()
}

fn number_attr<T: std::str::FromStr + Default>(item: &Item, key: &str) -> T {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .unwrap_or_default()
}

fn domain_from_item(item: &Item) -> DomainEntity {
    let mut domain = DomainEntity::new(string_attr(item, "Name"), string_attr(item, "Prefix"));
    if let Some(bookings) = item.get("NetBookings").and_then(|v| v.as_ns().ok()) {
        domain.net_bookings = bookings.iter().filter_map(|n| n.parse().ok()).collect();
    }
    domain
}

fn cluster_from_item(item: &Item) -> ClusterEntity {
    ClusterEntity {
        name: string_attr(item, "Name"),
        domain: string_attr(item, "Domain"),
        network_index: number_attr(item, "NetworkIndex"),
        group_count: number_attr(item, "GroupCount"),
    }
}

#[async_trait]
impl EntityStore for DynamoEntityStore {
    async fn ensure_tables(&self) -> Result<()> {
        self.create_table(DOMAINS_TABLE).await?;
        self.create_table(CLUSTERS_TABLE).await
    }

    async fn put_domain(&self, domain: &DomainEntity) -> Result<()> {
        let mut request = self
            .client
            .put_item()
            .table_name(DOMAINS_TABLE)
            .item("Name", AttributeValue::S(domain.name.clone()))
            .item("Prefix", AttributeValue::S(domain.prefix.clone()));
        // Empty sets cannot be stored
        if !domain.net_bookings.is_empty() {
            request = request.item(
                "NetBookings",
                AttributeValue::Ns(domain.net_bookings.iter().map(u8::to_string).collect()),
            );
        }
        request.send().await.map_err(from_sdk)?;
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> Result<Option<DomainEntity>> {
        Ok(self
            .get_item(DOMAINS_TABLE, name)
            .await?
            .map(|item| domain_from_item(&item)))
    }

    async fn delete_domain(&self, name: &str) -> Result<()> {
        self.delete_item(DOMAINS_TABLE, name).await
    }

    async fn set_domain_prefix(&self, name: &str, prefix: &str) -> Result<()> {
        self.client
            .update_item()
            .table_name(DOMAINS_TABLE)
            .key("Name", AttributeValue::S(name.to_string()))
            .update_expression("SET #p = :prefix")
            .expression_attribute_names("#p", "Prefix")
            .expression_attribute_values(":prefix", AttributeValue::S(prefix.to_string()))
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn add_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.update_bookings(
            domain,
            index,
            "ADD #b :set",
            "attribute_not_exists(#b) OR NOT contains(#b, :idx)",
        )
        .await
    }

    async fn remove_net_booking(&self, domain: &str, index: u8) -> Result<()> {
        self.update_bookings(domain, index, "DELETE #b :set", "contains(#b, :idx)")
            .await
    }

    async fn put_cluster(&self, cluster: &ClusterEntity) -> Result<()> {
        self.client
            .put_item()
            .table_name(CLUSTERS_TABLE)
            .item("Name", AttributeValue::S(cluster.name.clone()))
            .item("Domain", AttributeValue::S(cluster.domain.clone()))
            .item("NetworkIndex", AttributeValue::N(cluster.network_index.to_string()))
            .item("GroupCount", AttributeValue::N(cluster.group_count.to_string()))
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ClusterEntity>> {
        Ok(self
            .get_item(CLUSTERS_TABLE, name)
            .await?
            .map(|item| cluster_from_item(&item)))
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.delete_item(CLUSTERS_TABLE, name).await
    }

    async fn add_group_count(&self, name: &str, delta: i64) -> Result<()> {
        for _ in 0..GROUP_COUNT_ATTEMPTS {
            if self.add_to_group_count(name, delta).await? {
                return Ok(());
            }
            if delta >= 0 || self.zero_group_count(name, -delta).await? {
                return Ok(());
            }
            // Both guards failed: the item is gone or the count moved in between
            if self.get_item(CLUSTERS_TABLE, name).await?.is_none() {
                return Ok(());
            }
        }
        Err(CloudError::ConditionFailed(format!(
            "group count of {} kept changing",
            name
        )))
    }
}
