use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::adapters::callback::CallbackTransport;
use crate::config::EngineConfig;
use crate::handlers::notifier::{
    build_response, default_physical_id, default_reason, NetworkError, Outcome, ResponseNotifier,
};
use crate::runtime::contract::{
    InvocationContext, Properties, RequestType, ResourceRequest, ResourceResponse,
};
use crate::runtime::hashing::{properties_hash, HashError};

/// Provisioning hooks a concrete resource plugs into the engine.
pub trait ResourceProvider {
    fn validate_input(&self, properties: &Properties) -> bool;

    fn create(
        &self,
        physical_id: &str,
        properties: &Properties,
    ) -> Result<Option<Properties>, ProviderError>;

    fn delete(&self, physical_id: &str, properties: &Properties) -> Result<(), ProviderError>;
}

impl<P: ResourceProvider + ?Sized> ResourceProvider for &P {
    fn validate_input(&self, properties: &Properties) -> bool {
        (**self).validate_input(properties)
    }

    fn create(
        &self,
        physical_id: &str,
        properties: &Properties,
    ) -> Result<Option<Properties>, ProviderError> {
        (**self).create(physical_id, properties)
    }

    fn delete(&self, physical_id: &str, properties: &Properties) -> Result<(), ProviderError> {
        (**self).delete(physical_id, properties)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(
        "Input did not pass validation check. Check log group \"{log_group}\" for log stream {log_stream} for additional information."
    )]
    Validation {
        log_group: String,
        log_stream: String,
    },
    #[error("failed to derive physical identity from resource properties")]
    Identity(#[from] HashError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("provider panicked: {0}")]
    Panicked(String),
}

/// Drives one Create/Update/Delete request through a provider and reports
/// the outcome to the orchestrator exactly once.
pub struct LifecycleEngine<P, T> {
    provider: P,
    notifier: ResponseNotifier<T>,
    config: EngineConfig,
}

impl<P: ResourceProvider, T: CallbackTransport> LifecycleEngine<P, T> {
    pub fn new(provider: P, transport: T, config: EngineConfig) -> Self {
        Self {
            provider,
            notifier: ResponseNotifier::new(transport),
            config,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handles `request` and returns the reported status string.
    ///
    /// Provider failures, validation failures and provider panics all become
    /// a `FAILED` response. The only error returned is a failure to deliver
    /// that response.
    pub fn handle(
        &self,
        request: &ResourceRequest,
        context: &InvocationContext,
    ) -> Result<String, NetworkError> {
        if self.config.debug_enabled() {
            tracing::debug!(
                request_id = %request.request_id,
                event = %serde_json::to_string(request).unwrap_or_default(),
                "handling lifecycle event"
            );
        }

        let obligation = ResponseObligation::acquire(&self.notifier, request, context);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_lifecycle(request, context)))
            .unwrap_or_else(|payload| {
                let physical_id = properties_hash(&request.resource_properties).ok();
                let error = LifecycleError::Panicked(panic_message(payload.as_ref()));
                self.failed(physical_id, &error, context)
            });

        let summary = outcome.summary();
        obligation.discharge(&outcome)?;
        tracing::info!(
            request_id = %request.request_id,
            request_type = request.request_type.as_str(),
            status = outcome.status.as_str(),
            "handled lifecycle request"
        );
        Ok(summary)
    }

    /// Answers a payload that could not be read as a [`ResourceRequest`].
    ///
    /// Whichever identifying fields are present are echoed back in a `FAILED`
    /// response. Returns `Ok(None)` when the payload carries no callback URL.
    pub fn reject_malformed(
        &self,
        payload: &Value,
        parse_error: &str,
        context: &InvocationContext,
    ) -> Result<Option<String>, NetworkError> {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let Some(response_url) = field("ResponseURL") else {
            tracing::error!(
                error = parse_error,
                "malformed lifecycle request has no ResponseURL; nothing to answer"
            );
            return Ok(None);
        };

        let outcome = Outcome::failed(
            None,
            format!(
                "Malformed lifecycle request: {parse_error}\n{}",
                default_reason(context)
            ),
        );
        let response = ResourceResponse {
            status: outcome.status,
            reason: outcome.reason.clone().unwrap_or_default(),
            physical_resource_id: default_physical_id(context),
            stack_id: field("StackId").unwrap_or_default(),
            request_id: field("RequestId").unwrap_or_default(),
            logical_resource_id: field("LogicalResourceId").unwrap_or_default(),
            data: None,
        };
        tracing::error!(
            request_id = %response.request_id,
            error = parse_error,
            "rejecting malformed lifecycle request"
        );
        self.notifier.notify(&response_url, &response)?;
        Ok(Some(outcome.summary()))
    }

    fn run_lifecycle(&self, request: &ResourceRequest, context: &InvocationContext) -> Outcome {
        let physical_id = match properties_hash(&request.resource_properties) {
            Ok(value) => value,
            Err(error) => return self.failed(None, &LifecycleError::from(error), context),
        };

        match self.dispatch(request, &physical_id, context) {
            Ok(data) => Outcome::success(physical_id, data),
            Err(error) => self.failed(Some(physical_id), &error, context),
        }
    }

    fn dispatch(
        &self,
        request: &ResourceRequest,
        physical_id: &str,
        context: &InvocationContext,
    ) -> Result<Option<Properties>, LifecycleError> {
        let properties = &request.resource_properties;
        match request.request_type {
            RequestType::Create => {
                self.ensure_valid(properties, context)?;
                let data = self.provider.create(physical_id, properties)?;
                self.log_create_data(physical_id, data.as_ref());
                Ok(data)
            }
            RequestType::Update => {
                self.ensure_valid(properties, context)?;
                let old_physical_id = match &request.old_resource_properties {
                    Some(old_properties) => properties_hash(old_properties)?,
                    None => properties_hash(&Properties::new())?,
                };
                if old_physical_id == physical_id {
                    tracing::info!(physical_id, "resource properties unchanged; nothing to update");
                    return Ok(None);
                }

                // The old identity is removed by the orchestrator's own Delete request.
                tracing::info!(
                    physical_id,
                    old_physical_id = %old_physical_id,
                    "resource properties differ; creating replacement"
                );
                let data = self.provider.create(physical_id, properties)?;
                self.log_create_data(physical_id, data.as_ref());
                Ok(data)
            }
            RequestType::Delete => {
                self.provider.delete(physical_id, properties)?;
                Ok(None)
            }
        }
    }

    fn ensure_valid(
        &self,
        properties: &Properties,
        context: &InvocationContext,
    ) -> Result<(), LifecycleError> {
        if self.provider.validate_input(properties) {
            return Ok(());
        }
        Err(LifecycleError::Validation {
            log_group: context.log_group_name.clone(),
            log_stream: context.log_stream_name.clone(),
        })
    }

    fn log_create_data(&self, physical_id: &str, data: Option<&Properties>) {
        if self.config.debug_enabled() {
            tracing::debug!(
                physical_id,
                data = %data.map(|value| serde_json::Value::Object(value.clone())).unwrap_or_default(),
                "create data response"
            );
        }
    }

    fn failed(
        &self,
        physical_id: Option<String>,
        error: &LifecycleError,
        context: &InvocationContext,
    ) -> Outcome {
        tracing::error!(error = %error, physical_id = ?physical_id, "lifecycle request failed");
        Outcome::failed(physical_id, failure_reason(error, context))
    }
}

/// Error message, its cause chain, then where to find the logs.
pub fn failure_reason(error: &LifecycleError, context: &InvocationContext) -> String {
    let mut reason = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        reason.push_str("\ncaused by: ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason.push('\n');
    reason.push_str(&default_reason(context));
    reason
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Duty to report exactly one outcome for a request.
///
/// Discharged explicitly with the real outcome; if dropped undischarged the
/// guard reports a failure instead.
struct ResponseObligation<'a, T: CallbackTransport> {
    notifier: &'a ResponseNotifier<T>,
    request: &'a ResourceRequest,
    context: &'a InvocationContext,
    discharged: bool,
}

impl<'a, T: CallbackTransport> ResponseObligation<'a, T> {
    fn acquire(
        notifier: &'a ResponseNotifier<T>,
        request: &'a ResourceRequest,
        context: &'a InvocationContext,
    ) -> Self {
        Self {
            notifier,
            request,
            context,
            discharged: false,
        }
    }

    fn discharge(mut self, outcome: &Outcome) -> Result<(), NetworkError> {
        self.discharged = true;
        self.send(outcome)
    }

    fn send(&self, outcome: &Outcome) -> Result<(), NetworkError> {
        let response = build_response(self.request, self.context, outcome);
        self.notifier.notify(&self.request.response_url, &response)
    }
}

impl<T: CallbackTransport> Drop for ResponseObligation<'_, T> {
    fn drop(&mut self) {
        if self.discharged {
            return;
        }
        self.discharged = true;
        tracing::error!(
            request_id = %self.request.request_id,
            "handler exited without reporting; sending failure response"
        );
        let outcome = Outcome::failed(
            properties_hash(&self.request.resource_properties).ok(),
            format!(
                "Handler exited before reporting an outcome.\n{}",
                default_reason(self.context)
            ),
        );
        if let Err(error) = self.send(&outcome) {
            tracing::error!(error = %error, "failed to deliver fallback failure response");
        }
    }
}
