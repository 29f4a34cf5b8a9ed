use crate::adapters::callback::{CallbackRequest, CallbackTransport};
use crate::runtime::contract::{
    InvocationContext, Properties, ResourceRequest, ResourceResponse, ResponseStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to deliver response to callback endpoint: {message}")]
pub struct NetworkError {
    pub message: String,
}

/// Final result of one invocation, before defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: ResponseStatus,
    pub reason: Option<String>,
    pub physical_resource_id: Option<String>,
    pub data: Option<Properties>,
}

impl Outcome {
    pub fn success(physical_resource_id: String, data: Option<Properties>) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id: Some(physical_resource_id),
            data,
        }
    }

    pub fn failed(physical_resource_id: Option<String>, reason: String) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(reason),
            physical_resource_id,
            data: None,
        }
    }

    /// Status followed by the failure reason, if any.
    pub fn summary(&self) -> String {
        format!(
            "{}{}",
            self.status.as_str(),
            self.reason.as_deref().unwrap_or_default()
        )
    }
}

pub fn default_reason(context: &InvocationContext) -> String {
    format!(
        "See the details in CloudWatch Log Group: {} Log Stream: {}",
        context.log_group_name, context.log_stream_name
    )
}

pub fn default_physical_id(context: &InvocationContext) -> String {
    format!("{}/{}", context.log_group_name, context.log_stream_name)
}

pub fn build_response(
    request: &ResourceRequest,
    context: &InvocationContext,
    outcome: &Outcome,
) -> ResourceResponse {
    ResourceResponse {
        status: outcome.status,
        reason: outcome
            .reason
            .clone()
            .unwrap_or_else(|| default_reason(context)),
        physical_resource_id: outcome
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| default_physical_id(context)),
        stack_id: request.stack_id.clone(),
        request_id: request.request_id.clone(),
        logical_resource_id: request.logical_resource_id.clone(),
        data: outcome.data.clone(),
    }
}

/// Delivers the single outcome document for an invocation.
pub struct ResponseNotifier<T> {
    transport: T,
}

impl<T: CallbackTransport> ResponseNotifier<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn notify(&self, callback_url: &str, response: &ResourceResponse) -> Result<(), NetworkError> {
        let body = serde_json::to_vec(response).map_err(|error| NetworkError {
            message: format!("failed to serialize response: {error}"),
        })?;
        let request = CallbackRequest {
            url: callback_url.to_string(),
            content_type: String::new(),
            content_length: body.len(),
            body,
        };

        tracing::info!(
            request_id = %response.request_id,
            status = response.status.as_str(),
            physical_id = %response.physical_resource_id,
            content_length = request.content_length,
            "delivering lifecycle response"
        );
        self.transport
            .put(&request)
            .map_err(|message| NetworkError { message })
    }
}
