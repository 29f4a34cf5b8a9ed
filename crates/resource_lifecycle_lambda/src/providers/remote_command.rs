//! Resource whose lifecycle is a pair of shell command batches run on a
//! managed instance. The ledger remembers which instances ran the create
//! batch so a later delete targets exactly those.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::adapters::command::{CommandService, RemoteCommand};
use crate::adapters::ledger_store::LedgerConnector;
use crate::command_runner::{run_with_interval, POLL_INTERVAL};
use crate::config::EngineConfig;
use crate::handlers::lifecycle::{ProviderError, ResourceProvider};
use crate::ledger::KeyedResourceLedger;
use crate::runtime::contract::Properties;

pub const INSTANCE_ID: &str = "InstanceId";
pub const CREATE_COMMANDS: &str = "CreateCommands";
pub const DELETE_COMMANDS: &str = "DeleteCommands";
pub const COMMAND_ID: &str = "CommandId";

const CREATE_RECORD: &str = "create";

pub struct RemoteCommandProvider<C: LedgerConnector, S> {
    ledger: KeyedResourceLedger<C>,
    commands: S,
    poll_interval: Duration,
    ledger_self_check: bool,
}

impl<C: LedgerConnector, S: CommandService> RemoteCommandProvider<C, S> {
    pub fn new(ledger: KeyedResourceLedger<C>, commands: S, config: &EngineConfig) -> Self {
        Self {
            ledger,
            commands,
            poll_interval: POLL_INTERVAL,
            ledger_self_check: config.ledger_self_check,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn ledger(&self) -> &KeyedResourceLedger<C> {
        &self.ledger
    }

    fn run(&self, instance_id: &str, commands: Vec<String>) -> Result<String, ProviderError> {
        let command = RemoteCommand {
            instance_id: instance_id.to_string(),
            commands,
        };
        run_with_interval(&self.commands, &command, self.poll_interval)
            .map(|result| result.command_id)
            .map_err(|error| {
                ProviderError::with_source(format!("commands failed on {instance_id}"), error)
            })
    }
}

impl<C: LedgerConnector, S: CommandService> ResourceProvider for RemoteCommandProvider<C, S> {
    fn validate_input(&self, properties: &Properties) -> bool {
        if instance_id(properties).is_none() {
            tracing::warn!("{} must be a non-empty string", INSTANCE_ID);
            return false;
        }
        match string_list(properties.get(CREATE_COMMANDS)) {
            Some(commands) if !commands.is_empty() => {}
            _ => {
                tracing::warn!("{} must be a non-empty list of strings", CREATE_COMMANDS);
                return false;
            }
        }
        if properties.contains_key(DELETE_COMMANDS)
            && string_list(properties.get(DELETE_COMMANDS)).is_none()
        {
            tracing::warn!("{} must be a list of strings", DELETE_COMMANDS);
            return false;
        }
        true
    }

    fn create(
        &self,
        physical_id: &str,
        properties: &Properties,
    ) -> Result<Option<Properties>, ProviderError> {
        if self.ledger_self_check {
            self.ledger
                .self_check(Utc::now().timestamp_millis())
                .map_err(|error| ProviderError::with_source("ledger self-check failed", error))?;
        }

        let instance_id = instance_id(properties)
            .ok_or_else(|| ProviderError::new(format!("{INSTANCE_ID} is missing")))?;
        let commands = string_list(properties.get(CREATE_COMMANDS))
            .ok_or_else(|| ProviderError::new(format!("{CREATE_COMMANDS} is missing")))?;

        let command_id = self.run(instance_id, commands)?;

        let mut record = Map::new();
        record.insert(INSTANCE_ID.to_string(), Value::from(instance_id));
        record.insert(COMMAND_ID.to_string(), Value::from(command_id.clone()));
        self.ledger
            .put_item(physical_id, CREATE_RECORD, &record)
            .map_err(|error| ProviderError::with_source("failed to record created resource", error))?;

        let mut data = Map::new();
        data.insert(COMMAND_ID.to_string(), Value::from(command_id));
        Ok(Some(data))
    }

    fn delete(&self, physical_id: &str, properties: &Properties) -> Result<(), ProviderError> {
        let records = self
            .ledger
            .query(physical_id)
            .map_err(|error| ProviderError::with_source("failed to look up created resources", error))?;
        if records.is_empty() {
            tracing::info!(physical_id, "no recorded resources; nothing to delete");
            return Ok(());
        }

        let delete_commands = match string_list(properties.get(DELETE_COMMANDS)) {
            Some(commands) => commands,
            None => {
                if properties.contains_key(DELETE_COMMANDS) {
                    tracing::warn!("{} is malformed; skipping remote cleanup", DELETE_COMMANDS);
                }
                Vec::new()
            }
        };

        for record in &records {
            if !delete_commands.is_empty() {
                let instance_id = record
                    .attributes
                    .get(INSTANCE_ID)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProviderError::new(format!(
                            "ledger record {}/{} has no {INSTANCE_ID}",
                            record.primary_key, record.sort_key
                        ))
                    })?;
                self.run(instance_id, delete_commands.clone())?;
            }
            self.ledger
                .delete_item(&record.primary_key, &record.sort_key)
                .map_err(|error| ProviderError::with_source("failed to forget deleted resource", error))?;
        }
        Ok(())
    }
}

fn instance_id(properties: &Properties) -> Option<&str> {
    properties
        .get(INSTANCE_ID)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
