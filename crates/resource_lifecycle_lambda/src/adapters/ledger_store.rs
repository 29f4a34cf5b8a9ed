use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, KeyType};
use serde_json::{Map, Number, Value};

use crate::adapters::block_on;

pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub primary_key: String,
    pub sort_key: String,
    pub attributes: Attributes,
}

/// Two-part-key record store.
pub trait LedgerStore {
    fn put_item(
        &self,
        primary_key: &str,
        sort_key: &str,
        attributes: &Attributes,
    ) -> Result<(), String>;

    fn get_item(&self, primary_key: &str, sort_key: &str) -> Result<Option<Attributes>, String>;

    fn query(&self, primary_key: &str) -> Result<Vec<LedgerRecord>, String>;

    fn delete_item(&self, primary_key: &str, sort_key: &str) -> Result<(), String>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn put_item(
        &self,
        primary_key: &str,
        sort_key: &str,
        attributes: &Attributes,
    ) -> Result<(), String> {
        (**self).put_item(primary_key, sort_key, attributes)
    }

    fn get_item(&self, primary_key: &str, sort_key: &str) -> Result<Option<Attributes>, String> {
        (**self).get_item(primary_key, sort_key)
    }

    fn query(&self, primary_key: &str) -> Result<Vec<LedgerRecord>, String> {
        (**self).query(primary_key)
    }

    fn delete_item(&self, primary_key: &str, sort_key: &str) -> Result<(), String> {
        (**self).delete_item(primary_key, sort_key)
    }
}

/// Resolves a table name into a usable store handle.
pub trait LedgerConnector {
    type Store: LedgerStore;

    fn connect(&self, table_name: &str) -> Result<Self::Store, String>;
}

#[derive(Debug, Clone)]
pub struct DynamoDbLedgerConnector {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoDbLedgerConnector {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }
}

impl LedgerConnector for DynamoDbLedgerConnector {
    type Store = DynamoDbLedgerStore;

    fn connect(&self, table_name: &str) -> Result<DynamoDbLedgerStore, String> {
        let client = self.client.clone();
        let table = table_name.to_string();

        let (primary_key_name, sort_key_name) = block_on(async {
            let output = client
                .describe_table()
                .table_name(&table)
                .send()
                .await
                .map_err(|error| {
                    format!(
                        "failed to describe ledger table {table}: {}",
                        DisplayErrorContext(&error)
                    )
                })?;
            let description = output
                .table()
                .ok_or_else(|| format!("ledger table {table} returned no description"))?;

            let mut primary_key_name = None;
            let mut sort_key_name = None;
            for element in description.key_schema() {
                match element.key_type() {
                    KeyType::Hash => primary_key_name = Some(element.attribute_name().to_string()),
                    KeyType::Range => sort_key_name = Some(element.attribute_name().to_string()),
                    _ => {}
                }
            }

            match (primary_key_name, sort_key_name) {
                (Some(primary), Some(sort)) => Ok((primary, sort)),
                _ => Err(format!(
                    "ledger table {table} must have both a partition key and a sort key"
                )),
            }
        })?;

        Ok(DynamoDbLedgerStore {
            client,
            table_name: table,
            primary_key_name,
            sort_key_name,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbLedgerStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    primary_key_name: String,
    sort_key_name: String,
}

impl DynamoDbLedgerStore {
    fn key_item(&self, primary_key: &str, sort_key: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                self.primary_key_name.clone(),
                AttributeValue::S(primary_key.to_string()),
            ),
            (
                self.sort_key_name.clone(),
                AttributeValue::S(sort_key.to_string()),
            ),
        ])
    }

    fn split_item(&self, item: &HashMap<String, AttributeValue>) -> Result<LedgerRecord, String> {
        let mut attributes = Map::new();
        let mut primary_key = None;
        let mut sort_key = None;
        for (name, value) in item {
            if name == &self.primary_key_name {
                primary_key = value.as_s().ok().cloned();
            } else if name == &self.sort_key_name {
                sort_key = value.as_s().ok().cloned();
            } else {
                attributes.insert(name.clone(), attribute_to_json(value)?);
            }
        }

        match (primary_key, sort_key) {
            (Some(primary_key), Some(sort_key)) => Ok(LedgerRecord {
                primary_key,
                sort_key,
                attributes,
            }),
            _ => Err(format!(
                "ledger item in {} is missing string key attributes",
                self.table_name
            )),
        }
    }
}

impl LedgerStore for DynamoDbLedgerStore {
    fn put_item(
        &self,
        primary_key: &str,
        sort_key: &str,
        attributes: &Attributes,
    ) -> Result<(), String> {
        let mut item = self.key_item(primary_key, sort_key);
        for (name, value) in attributes {
            if name == &self.primary_key_name || name == &self.sort_key_name {
                return Err(format!("attribute name {name} collides with a key attribute"));
            }
            item.insert(name.clone(), json_to_attribute(value));
        }

        block_on(
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .send(),
        )
        .map(|_| ())
        .map_err(|error| format!("failed to put ledger item: {}", DisplayErrorContext(&error)))
    }

    fn get_item(&self, primary_key: &str, sort_key: &str) -> Result<Option<Attributes>, String> {
        let output = block_on(
            self.client
                .get_item()
                .table_name(&self.table_name)
                .set_key(Some(self.key_item(primary_key, sort_key)))
                .consistent_read(true)
                .send(),
        )
        .map_err(|error| format!("failed to get ledger item: {}", DisplayErrorContext(&error)))?;

        output
            .item()
            .map(|item| self.split_item(item).map(|record| record.attributes))
            .transpose()
    }

    fn query(&self, primary_key: &str) -> Result<Vec<LedgerRecord>, String> {
        let mut records = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let output = block_on(
                self.client
                    .query()
                    .table_name(&self.table_name)
                    .key_condition_expression("#pk = :pk")
                    .expression_attribute_names("#pk", &self.primary_key_name)
                    .expression_attribute_values(":pk", AttributeValue::S(primary_key.to_string()))
                    .consistent_read(true)
                    .set_exclusive_start_key(exclusive_start_key.take())
                    .send(),
            )
            .map_err(|error| {
                format!("failed to query ledger items: {}", DisplayErrorContext(&error))
            })?;

            for item in output.items() {
                records.push(self.split_item(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    fn delete_item(&self, primary_key: &str, sort_key: &str) -> Result<(), String> {
        block_on(
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .set_key(Some(self.key_item(primary_key, sort_key)))
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!("failed to delete ledger item: {}", DisplayErrorContext(&error))
        })
    }
}

pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(entries) => AttributeValue::M(
            entries
                .iter()
                .map(|(name, value)| (name.clone(), json_to_attribute(value)))
                .collect(),
        ),
    }
}

pub fn attribute_to_json(value: &AttributeValue) -> Result<Value, String> {
    match value {
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Bool(flag) => Ok(Value::Bool(*flag)),
        AttributeValue::S(text) => Ok(Value::String(text.clone())),
        AttributeValue::N(raw) => parse_number(raw).map(Value::Number),
        AttributeValue::Ss(texts) => Ok(Value::Array(
            texts.iter().cloned().map(Value::String).collect(),
        )),
        AttributeValue::Ns(raws) => raws
            .iter()
            .map(|raw| parse_number(raw).map(Value::Number))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::L(items) => items
            .iter()
            .map(attribute_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::M(entries) => entries
            .iter()
            .map(|(name, value)| attribute_to_json(value).map(|value| (name.clone(), value)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        other => Err(format!("unsupported ledger attribute type: {other:?}")),
    }
}

fn parse_number(raw: &str) -> Result<Number, String> {
    serde_json::from_str::<Number>(raw)
        .map_err(|error| format!("invalid numeric ledger attribute '{raw}': {error}"))
}
