//! In-memory fakes for exercising the engine, ledger and command runner
//! without AWS.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::adapters::callback::{CallbackRequest, CallbackTransport};
use crate::adapters::command::{CommandPoll, CommandService, CommandStatus, RemoteCommand};
use crate::adapters::ledger_store::{Attributes, LedgerConnector, LedgerRecord, LedgerStore};
use crate::handlers::lifecycle::{ProviderError, ResourceProvider};
use crate::runtime::contract::{
    InvocationContext, Properties, RequestType, ResourceRequest, ResourceResponse,
};

pub fn properties(value: Value) -> Properties {
    match value {
        Value::Object(entries) => entries,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn sample_context() -> InvocationContext {
    InvocationContext {
        log_group_name: "/aws/lambda/handler".to_string(),
        log_stream_name: "2026/10/16/[$LATEST]abc".to_string(),
        deadline_ms: 1_792_000_000_000,
    }
}

pub fn sample_request(request_type: RequestType, resource_properties: Value) -> ResourceRequest {
    ResourceRequest {
        request_type,
        response_url: "https://callbacks.example/presigned?signature=abc".to_string(),
        stack_id: "arn:aws:cloudformation:us-west-2:123456789012:stack/sample/1".to_string(),
        request_id: "request-1".to_string(),
        resource_type: "Custom::Sample".to_string(),
        logical_resource_id: "Sample".to_string(),
        physical_resource_id: None,
        resource_properties: properties(resource_properties),
        old_resource_properties: None,
    }
}

pub struct RecordingTransport {
    requests: Mutex<Vec<CallbackRequest>>,
    failure: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn requests(&self) -> Vec<CallbackRequest> {
        self.requests.lock().expect("poisoned mutex").clone()
    }

    pub fn responses(&self) -> Vec<ResourceResponse> {
        self.requests()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).expect("response body should parse"))
            .collect()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackTransport for RecordingTransport {
    fn put(&self, request: &CallbackRequest) -> Result<(), String> {
        self.requests
            .lock()
            .expect("poisoned mutex")
            .push(request.clone());
        match &self.failure {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Validate,
    Create(String),
    Delete(String),
}

pub struct ScriptedProvider {
    valid: bool,
    create_data: Option<Properties>,
    create_failure: Option<String>,
    delete_failure: Option<String>,
    panic_on_create: bool,
    calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn accepting() -> Self {
        Self {
            valid: true,
            create_data: None,
            create_failure: None,
            delete_failure: None,
            panic_on_create: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            valid: false,
            ..Self::accepting()
        }
    }

    pub fn with_create_data(mut self, data: Value) -> Self {
        self.create_data = Some(properties(data));
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_failure = Some(message.to_string());
        self
    }

    pub fn failing_delete(mut self, message: &str) -> Self {
        self.delete_failure = Some(message.to_string());
        self
    }

    pub fn panicking_create(mut self) -> Self {
        self.panic_on_create = true;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("poisoned mutex").clone()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().expect("poisoned mutex").push(call);
    }
}

impl ResourceProvider for ScriptedProvider {
    fn validate_input(&self, _properties: &Properties) -> bool {
        self.record(ProviderCall::Validate);
        self.valid
    }

    fn create(
        &self,
        physical_id: &str,
        _properties: &Properties,
    ) -> Result<Option<Properties>, ProviderError> {
        self.record(ProviderCall::Create(physical_id.to_string()));
        if self.panic_on_create {
            panic!("scripted panic");
        }
        match &self.create_failure {
            Some(message) => Err(ProviderError::with_source(
                "create failed",
                std::io::Error::other(message.clone()),
            )),
            None => Ok(self.create_data.clone()),
        }
    }

    fn delete(&self, physical_id: &str, _properties: &Properties) -> Result<(), ProviderError> {
        self.record(ProviderCall::Delete(physical_id.to_string()));
        match &self.delete_failure {
            Some(message) => Err(ProviderError::with_source(
                "delete failed",
                std::io::Error::other(message.clone()),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    records: Mutex<BTreeMap<(String, String), Attributes>>,
    failing_operation: Mutex<Option<&'static str>>,
}

impl InMemoryLedgerStore {
    pub fn is_empty(&self) -> bool {
        self.records.lock().expect("poisoned mutex").is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("poisoned mutex").len()
    }

    /// Makes every later call of `operation` ("put", "get", "query" or "delete") fail.
    pub fn fail_operation(&self, operation: &'static str) {
        *self.failing_operation.lock().expect("poisoned mutex") = Some(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), String> {
        match *self.failing_operation.lock().expect("poisoned mutex") {
            Some(failing) if failing == operation => {
                Err(format!("simulated {operation} failure"))
            }
            _ => Ok(()),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn put_item(
        &self,
        primary_key: &str,
        sort_key: &str,
        attributes: &Attributes,
    ) -> Result<(), String> {
        self.check("put")?;
        self.records.lock().expect("poisoned mutex").insert(
            (primary_key.to_string(), sort_key.to_string()),
            attributes.clone(),
        );
        Ok(())
    }

    fn get_item(&self, primary_key: &str, sort_key: &str) -> Result<Option<Attributes>, String> {
        self.check("get")?;
        Ok(self
            .records
            .lock()
            .expect("poisoned mutex")
            .get(&(primary_key.to_string(), sort_key.to_string()))
            .cloned())
    }

    fn query(&self, primary_key: &str) -> Result<Vec<LedgerRecord>, String> {
        self.check("query")?;
        Ok(self
            .records
            .lock()
            .expect("poisoned mutex")
            .iter()
            .filter(|((primary, _), _)| primary == primary_key)
            .map(|((primary, sort), attributes)| LedgerRecord {
                primary_key: primary.clone(),
                sort_key: sort.clone(),
                attributes: attributes.clone(),
            })
            .collect())
    }

    fn delete_item(&self, primary_key: &str, sort_key: &str) -> Result<(), String> {
        self.check("delete")?;
        self.records
            .lock()
            .expect("poisoned mutex")
            .remove(&(primary_key.to_string(), sort_key.to_string()));
        Ok(())
    }
}

/// Hands out one shared in-memory store and counts resolutions.
#[derive(Clone, Default)]
pub struct InMemoryLedgerConnector {
    store: Arc<InMemoryLedgerStore>,
    connected_tables: Arc<Mutex<Vec<String>>>,
    first_failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryLedgerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first_connect(self, message: &str) -> Self {
        *self.first_failure.lock().expect("poisoned mutex") = Some(message.to_string());
        self
    }

    pub fn store(&self) -> Arc<InMemoryLedgerStore> {
        Arc::clone(&self.store)
    }

    pub fn connect_count(&self) -> usize {
        self.connected_tables.lock().expect("poisoned mutex").len()
    }

    pub fn connected_tables(&self) -> Vec<String> {
        self.connected_tables.lock().expect("poisoned mutex").clone()
    }
}

impl LedgerConnector for InMemoryLedgerConnector {
    type Store = Arc<InMemoryLedgerStore>;

    fn connect(&self, table_name: &str) -> Result<Self::Store, String> {
        self.connected_tables
            .lock()
            .expect("poisoned mutex")
            .push(table_name.to_string());
        if let Some(message) = self.first_failure.lock().expect("poisoned mutex").take() {
            return Err(message);
        }
        Ok(Arc::clone(&self.store))
    }
}

pub struct ScriptedCommandService {
    polls: Mutex<VecDeque<CommandPoll>>,
    submitted: Mutex<Vec<RemoteCommand>>,
    poll_count: Mutex<usize>,
    full_output: String,
    full_output_fetches: Mutex<usize>,
    submit_failure: Option<String>,
}

impl ScriptedCommandService {
    pub fn new(polls: Vec<CommandPoll>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            submitted: Mutex::new(Vec::new()),
            poll_count: Mutex::new(0),
            full_output: String::new(),
            full_output_fetches: Mutex::new(0),
            submit_failure: None,
        }
    }

    pub fn pending() -> CommandPoll {
        CommandPoll {
            status: CommandStatus::Pending,
            output: String::new(),
            truncated: false,
        }
    }

    pub fn succeeded(output: &str) -> CommandPoll {
        CommandPoll {
            status: CommandStatus::Success,
            output: output.to_string(),
            truncated: false,
        }
    }

    pub fn failed(output: &str) -> CommandPoll {
        CommandPoll {
            status: CommandStatus::Failed,
            output: output.to_string(),
            truncated: false,
        }
    }

    pub fn with_full_output(mut self, output: &str) -> Self {
        self.full_output = output.to_string();
        self
    }

    pub fn rejecting_submit(mut self, message: &str) -> Self {
        self.submit_failure = Some(message.to_string());
        self
    }

    pub fn submitted(&self) -> Vec<RemoteCommand> {
        self.submitted.lock().expect("poisoned mutex").clone()
    }

    pub fn poll_count(&self) -> usize {
        *self.poll_count.lock().expect("poisoned mutex")
    }

    pub fn full_output_fetches(&self) -> usize {
        *self.full_output_fetches.lock().expect("poisoned mutex")
    }
}

impl CommandService for ScriptedCommandService {
    fn submit(&self, command: &RemoteCommand) -> Result<String, String> {
        if let Some(message) = &self.submit_failure {
            return Err(message.clone());
        }
        let mut submitted = self.submitted.lock().expect("poisoned mutex");
        submitted.push(command.clone());
        Ok(format!("command-{}", submitted.len()))
    }

    fn poll(&self, command_id: &str, _instance_id: &str) -> Result<CommandPoll, String> {
        *self.poll_count.lock().expect("poisoned mutex") += 1;
        self.polls
            .lock()
            .expect("poisoned mutex")
            .pop_front()
            .ok_or_else(|| format!("no scripted poll left for {command_id}"))
    }

    fn fetch_full_output(&self, _command_id: &str, _instance_id: &str) -> Result<String, String> {
        *self.full_output_fetches.lock().expect("poisoned mutex") += 1;
        Ok(self.full_output.clone())
    }
}

/// Properties accepted by the remote command provider.
pub fn remote_command_properties(instance_id: &str) -> Value {
    json!({
        "InstanceId": instance_id,
        "CreateCommands": ["install.sh"],
        "DeleteCommands": ["uninstall.sh"]
    })
}
