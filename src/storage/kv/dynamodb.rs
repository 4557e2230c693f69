//! DynamoDB client.
//!
//! The AWS SDK is async; this client owns a small tokio runtime and blocks
//! on each request so it can sit behind the synchronous [`KvClient`] seam.
//! Do not call it from inside another tokio runtime.

use super::client::{Item, ItemUpdate, KvClient, ScanFilter, TableSpec};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, KeyType, ProvisionedThroughput,
    ReturnValue, ScalarAttributeType, TableStatus,
};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::debug;

type AttributeMap = HashMap<String, AttributeValue>;

/// A [`KvClient`] backed by Amazon DynamoDB (or a compatible endpoint).
pub struct DynamoDbClient {
    runtime: Runtime,
    client: Client,
}

impl DynamoDbClient {
    /// Build a client from the region, optional endpoint and credentials
    /// in `config`. Missing credentials fall back to the SDK default chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` without a region and `Error::Io` if the
    /// runtime cannot start.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let region = config
            .aws_region
            .clone()
            .ok_or_else(|| Error::Config("dynamodb requires awsRegion".to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).region(Region::new(region));
        if let Some(endpoint) = &config.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some((key, secret)) = config.aws_credentials() {
            loader =
                loader.credentials_provider(Credentials::new(key, secret, None, None, "commentary"));
        }
        let sdk_config = runtime.block_on(loader.load());
        let client = Client::new(&sdk_config);

        debug!(endpoint = ?config.dynamodb_endpoint, "DynamoDB client ready");
        Ok(Self { runtime, client })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

fn backend_error<E: std::error::Error>(err: E) -> Error {
    Error::Backend(DisplayErrorContext(err).to_string())
}

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attributes(map)),
    }
}

fn to_attributes(item: &Item) -> AttributeMap {
    item.iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

fn from_attribute(value: &AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => {
            let number = n
                .parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| n.parse::<f64>().ok().and_then(Number::from_f64))
                .ok_or_else(|| Error::Backend(format!("invalid number attribute {n}")))?;
            Value::Number(number)
        }
        AttributeValue::L(values) => {
            Value::Array(values.iter().map(from_attribute).collect::<Result<_>>()?)
        }
        AttributeValue::M(map) => Value::Object(from_attributes(map)?),
        other => {
            return Err(Error::Backend(format!(
                "unsupported attribute type {other:?}"
            )));
        }
    })
}

fn from_attributes(map: &AttributeMap) -> Result<Item> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect()
}

/// Build `SET #s0 = :s0, ... REMOVE #r0, ...` with its placeholder maps.
fn update_expression(update: &ItemUpdate) -> (String, HashMap<String, String>, AttributeMap) {
    let mut names = HashMap::new();
    let mut values = HashMap::new();
    let mut sets = Vec::new();
    let mut removes = Vec::new();

    for (i, (attribute, value)) in update.set.iter().enumerate() {
        names.insert(format!("#s{i}"), attribute.clone());
        values.insert(format!(":s{i}"), to_attribute(value));
        sets.push(format!("#s{i} = :s{i}"));
    }
    for (i, attribute) in update.remove.iter().enumerate() {
        names.insert(format!("#r{i}"), attribute.clone());
        removes.push(format!("#r{i}"));
    }

    let mut expression = String::new();
    if !sets.is_empty() {
        expression.push_str("SET ");
        expression.push_str(&sets.join(", "));
    }
    if !removes.is_empty() {
        if !expression.is_empty() {
            expression.push(' ');
        }
        expression.push_str("REMOVE ");
        expression.push_str(&removes.join(", "));
    }
    (expression, names, values)
}

impl KvClient for DynamoDbClient {
    const NAME: &'static str = "dynamodb";

    fn list_tables(&self) -> Result<Vec<String>> {
        self.block_on(async {
            let mut tables = Vec::new();
            let mut start: Option<String> = None;
            loop {
                let page = self
                    .client
                    .list_tables()
                    .set_exclusive_start_table_name(start.take())
                    .send()
                    .await
                    .map_err(backend_error)?;
                tables.extend(page.table_names().iter().cloned());
                match page.last_evaluated_table_name() {
                    Some(last) => start = Some(last.to_string()),
                    None => return Ok(tables),
                }
            }
        })
    }

    fn create_table(&self, table: &TableSpec) -> Result<()> {
        let attribute = AttributeDefinition::builder()
            .attribute_name(table.key)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(backend_error)?;
        let key = KeySchemaElement::builder()
            .attribute_name(table.key)
            .key_type(KeyType::Hash)
            .build()
            .map_err(backend_error)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(table.read_units)
            .write_capacity_units(table.write_units)
            .build()
            .map_err(backend_error)?;

        self.block_on(
            self.client
                .create_table()
                .table_name(&table.name)
                .attribute_definitions(attribute)
                .key_schema(key)
                .provisioned_throughput(throughput)
                .send(),
        )
        .map_err(backend_error)?;
        Ok(())
    }

    fn table_ready(&self, table: &str) -> Result<bool> {
        let output = self
            .block_on(self.client.describe_table().table_name(table).send())
            .map_err(backend_error)?;
        Ok(output
            .table()
            .and_then(|t| t.table_status())
            .is_some_and(|status| *status == TableStatus::Active))
    }

    fn get_item(&self, table: &str, key: &str, value: &str) -> Result<Option<Item>> {
        let output = self
            .block_on(
                self.client
                    .get_item()
                    .table_name(table)
                    .key(key, AttributeValue::S(value.to_string()))
                    .consistent_read(true)
                    .send(),
            )
            .map_err(backend_error)?;
        output.item().map(from_attributes).transpose()
    }

    fn put_item_if_absent(&self, table: &str, key: &str, item: Item) -> Result<bool> {
        let result = self.block_on(
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(to_attributes(&item)))
                .condition_expression("attribute_not_exists(#k)")
                .expression_attribute_names("#k", key)
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    fn update_item(
        &self,
        table: &str,
        key: &str,
        value: &str,
        update: &ItemUpdate,
    ) -> Result<bool> {
        let (expression, mut names, values) = update_expression(update);
        names.insert("#k".to_string(), key.to_string());

        let result = self.block_on(
            self.client
                .update_item()
                .table_name(table)
                .key(key, AttributeValue::S(value.to_string()))
                .update_expression(expression)
                .condition_expression("attribute_exists(#k)")
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values((!values.is_empty()).then_some(values))
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    fn delete_item(&self, table: &str, key: &str, value: &str) -> Result<bool> {
        let output = self
            .block_on(
                self.client
                    .delete_item()
                    .table_name(table)
                    .key(key, AttributeValue::S(value.to_string()))
                    .return_values(ReturnValue::AllOld)
                    .send(),
            )
            .map_err(backend_error)?;
        Ok(output.attributes().is_some_and(|old| !old.is_empty()))
    }

    fn scan(&self, table: &str, filter: ScanFilter<'_>) -> Result<Vec<Item>> {
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut conditions = Vec::new();
        for (i, (attribute, value)) in filter.iter().enumerate() {
            names.insert(format!("#f{i}"), (*attribute).to_string());
            values.insert(format!(":f{i}"), to_attribute(value));
            conditions.push(format!("#f{i} = :f{i}"));
        }
        let expression = (!conditions.is_empty()).then(|| conditions.join(" AND "));

        self.block_on(async {
            let mut items = Vec::new();
            let mut start: Option<AttributeMap> = None;
            loop {
                let page = self
                    .client
                    .scan()
                    .table_name(table)
                    .consistent_read(true)
                    .set_filter_expression(expression.clone())
                    .set_expression_attribute_names((!names.is_empty()).then(|| names.clone()))
                    .set_expression_attribute_values((!values.is_empty()).then(|| values.clone()))
                    .set_exclusive_start_key(start.take())
                    .send()
                    .await
                    .map_err(backend_error)?;
                for item in page.items() {
                    items.push(from_attributes(item)?);
                }
                match page.last_evaluated_key() {
                    Some(last) if !last.is_empty() => start = Some(last.clone()),
                    _ => return Ok(items),
                }
            }
        })
    }
}
