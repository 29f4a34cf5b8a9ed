use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Lifecycle request delivered by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Properties>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// Canonical outcome document PUT to the request's callback URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Properties>,
}

/// Identifies the execution handling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub log_group_name: String,
    pub log_stream_name: String,
    /// Absolute deadline in milliseconds since the Unix epoch.
    pub deadline_ms: u64,
}

impl InvocationContext {
    pub fn remaining_execution_time(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.deadline_ms.saturating_sub(now_ms))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_orchestrator_request_document() {
        let request: ResourceRequest = serde_json::from_value(json!({
            "RequestType": "Update",
            "ServiceToken": "arn:aws:lambda:us-west-2:123456789012:function:handler",
            "ResponseURL": "https://callback.example/presigned",
            "StackId": "stack-1",
            "RequestId": "request-1",
            "ResourceType": "Custom::Thing",
            "LogicalResourceId": "Thing",
            "PhysicalResourceId": "abc",
            "ResourceProperties": {"Name": "b"},
            "OldResourceProperties": {"Name": "a"}
        }))
        .expect("request should parse");

        assert_eq!(request.request_type, RequestType::Update);
        assert_eq!(request.response_url, "https://callback.example/presigned");
        assert_eq!(request.physical_resource_id.as_deref(), Some("abc"));
        assert_eq!(request.resource_properties["Name"], json!("b"));
        assert_eq!(
            request
                .old_resource_properties
                .expect("old properties should exist")["Name"],
            json!("a")
        );
    }

    #[test]
    fn missing_properties_default_to_empty_mapping() {
        let request: ResourceRequest = serde_json::from_value(json!({
            "RequestType": "Delete",
            "ResponseURL": "https://callback.example/presigned",
            "StackId": "stack-1",
            "RequestId": "request-1",
            "ResourceType": "Custom::Thing",
            "LogicalResourceId": "Thing"
        }))
        .expect("request should parse");

        assert!(request.resource_properties.is_empty());
        assert!(request.old_resource_properties.is_none());
    }

    #[test]
    fn rejects_unknown_request_type() {
        let result = serde_json::from_value::<ResourceRequest>(json!({
            "RequestType": "Rollback",
            "ResponseURL": "u",
            "StackId": "s",
            "RequestId": "r",
            "ResourceType": "t",
            "LogicalResourceId": "l"
        }));

        assert!(result.is_err());
    }

    #[test]
    fn response_serializes_with_orchestrator_field_names() {
        let response = ResourceResponse {
            status: ResponseStatus::Failed,
            reason: "boom".to_string(),
            physical_resource_id: "id".to_string(),
            stack_id: "stack-1".to_string(),
            request_id: "request-1".to_string(),
            logical_resource_id: "Thing".to_string(),
            data: None,
        };

        let value = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(
            value,
            json!({
                "Status": "FAILED",
                "Reason": "boom",
                "PhysicalResourceId": "id",
                "StackId": "stack-1",
                "RequestId": "request-1",
                "LogicalResourceId": "Thing"
            })
        );
    }

    #[test]
    fn remaining_time_saturates_at_zero() {
        let context = InvocationContext {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            deadline_ms: 10_000,
        };

        assert_eq!(
            context.remaining_execution_time(4_000),
            Duration::from_millis(6_000)
        );
        assert_eq!(context.remaining_execution_time(20_000), Duration::ZERO);
    }
}
