//! Durable two-part-key ledger bridging state between a Create and a later
//! Delete of the same resource.

use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::adapters::ledger_store::{Attributes, LedgerConnector, LedgerRecord, LedgerStore};
use crate::config::{required_from, ConfigurationError};

pub const LEDGER_TABLE_ENV: &str = "LEDGER_TABLE_NAME";
const SELF_CHECK_SORT_KEY: &str = "probe";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to resolve ledger table {table}: {message}")]
    Resolve { table: String, message: String },
    #[error("ledger {operation} failed: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },
    #[error("ledger self-check failed: {0}")]
    SelfCheck(String),
}

pub struct KeyedResourceLedger<C: LedgerConnector> {
    table_name: String,
    connector: C,
    store: OnceLock<C::Store>,
}

impl<C: LedgerConnector> KeyedResourceLedger<C> {
    pub fn new(table_name: impl Into<String>, connector: C) -> Self {
        Self {
            table_name: table_name.into(),
            connector,
            store: OnceLock::new(),
        }
    }

    /// Reads the table name from `var_name`, failing fast when it is unset.
    pub fn from_env(var_name: &str, connector: C) -> Result<Self, ConfigurationError> {
        Self::from_lookup(var_name, connector, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        var_name: &str,
        connector: C,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let table_name = required_from(var_name, lookup)?;
        Ok(Self::new(table_name, connector))
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Resolves the store handle on first use and returns the cached handle after.
    fn store(&self) -> Result<&C::Store, LedgerError> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }
        let store = self
            .connector
            .connect(&self.table_name)
            .map_err(|message| LedgerError::Resolve {
                table: self.table_name.clone(),
                message,
            })?;
        tracing::debug!(table = %self.table_name, "resolved ledger table");
        Ok(self.store.get_or_init(|| store))
    }

    pub fn put_item(
        &self,
        primary_key: &str,
        sort_key: &str,
        attributes: &Attributes,
    ) -> Result<(), LedgerError> {
        self.store()?
            .put_item(primary_key, sort_key, attributes)
            .map_err(|message| LedgerError::Store {
                operation: "put",
                message,
            })
    }

    pub fn get_item(
        &self,
        primary_key: &str,
        sort_key: &str,
    ) -> Result<Option<Attributes>, LedgerError> {
        self.store()?
            .get_item(primary_key, sort_key)
            .map_err(|message| LedgerError::Store {
                operation: "get",
                message,
            })
    }

    pub fn query(&self, primary_key: &str) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.store()?
            .query(primary_key)
            .map_err(|message| LedgerError::Store {
                operation: "query",
                message,
            })
    }

    pub fn delete_item(&self, primary_key: &str, sort_key: &str) -> Result<(), LedgerError> {
        self.store()?
            .delete_item(primary_key, sort_key)
            .map_err(|message| LedgerError::Store {
                operation: "delete",
                message,
            })
    }

    /// Exercises put, get, query and delete against a throwaway key derived
    /// from `now_ms` to confirm the execution role can use the table.
    pub fn self_check(&self, now_ms: i64) -> Result<(), LedgerError> {
        let primary_key = format!("self-check-{now_ms}");
        let mut attributes = Map::new();
        attributes.insert("WrittenAt".to_string(), Value::from(now_ms));

        self.put_item(&primary_key, SELF_CHECK_SORT_KEY, &attributes)?;
        let verified = self.verify_probe(&primary_key, &attributes);
        let deleted = self.delete_item(&primary_key, SELF_CHECK_SORT_KEY);
        verified?;
        deleted?;

        if self.get_item(&primary_key, SELF_CHECK_SORT_KEY)?.is_some() {
            return Err(LedgerError::SelfCheck(format!(
                "{primary_key} is still readable after delete"
            )));
        }

        tracing::debug!(table = %self.table_name, key = %primary_key, "ledger self-check passed");
        Ok(())
    }

    fn verify_probe(&self, primary_key: &str, expected: &Attributes) -> Result<(), LedgerError> {
        match self.get_item(primary_key, SELF_CHECK_SORT_KEY)? {
            Some(found) if &found == expected => {}
            other => {
                return Err(LedgerError::SelfCheck(format!(
                    "read back {other:?} for {primary_key}, expected {expected:?}"
                )))
            }
        }

        let records = self.query(primary_key)?;
        let listed = records.iter().any(|record| {
            record.sort_key == SELF_CHECK_SORT_KEY && &record.attributes == expected
        });
        if !listed {
            return Err(LedgerError::SelfCheck(format!(
                "query for {primary_key} did not return the probe record"
            )));
        }
        Ok(())
    }
}
