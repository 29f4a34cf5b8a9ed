use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use resource_lifecycle_lambda::adapters::callback::{CallbackTransport, HttpCallbackTransport};
use resource_lifecycle_lambda::adapters::command::{CommandOutputLocation, SsmCommandService};
use resource_lifecycle_lambda::adapters::ledger_store::DynamoDbLedgerConnector;
use resource_lifecycle_lambda::config::EngineConfig;
use resource_lifecycle_lambda::handlers::lifecycle::{LifecycleEngine, ResourceProvider};
use resource_lifecycle_lambda::ledger::{KeyedResourceLedger, LEDGER_TABLE_ENV};
use resource_lifecycle_lambda::providers::remote_command::RemoteCommandProvider;
use resource_lifecycle_lambda::runtime::contract::{InvocationContext, ResourceRequest};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

type Engine = LifecycleEngine<
    RemoteCommandProvider<DynamoDbLedgerConnector, SsmCommandService>,
    HttpCallbackTransport,
>;

async fn handle_request(engine: &Engine, event: LambdaEvent<Value>) -> Result<String, Error> {
    let context = invocation_context(&event.context);
    respond(engine, &event.payload, &context)
}

/// Runs a raw event through the engine. Payloads that do not parse are still
/// answered when they carry a callback URL.
fn respond<P: ResourceProvider, T: CallbackTransport>(
    engine: &LifecycleEngine<P, T>,
    payload: &Value,
    context: &InvocationContext,
) -> Result<String, Error> {
    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(error) => {
            return match engine.reject_malformed(payload, &error, context) {
                Ok(Some(status)) => Ok(status),
                Ok(None) => Err(error.into()),
                Err(delivery) => Err(Error::from(delivery.to_string())),
            };
        }
    };
    engine
        .handle(&request, context)
        .map_err(|error| Error::from(error.to_string()))
}

fn parse_request(payload: &Value) -> Result<ResourceRequest, String> {
    serde_json::from_value(payload.clone())
        .map_err(|error| format!("invalid lifecycle request: {error}"))
}

fn invocation_context(context: &lambda_runtime::Context) -> InvocationContext {
    InvocationContext {
        log_group_name: context.env_config.log_group.clone(),
        log_stream_name: context.env_config.log_stream.clone(),
        deadline_ms: context.deadline,
    }
}

fn output_location(lookup: impl Fn(&str) -> Option<String>) -> Option<CommandOutputLocation> {
    let bucket = lookup("COMMAND_OUTPUT_BUCKET")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    Some(CommandOutputLocation {
        bucket,
        prefix: lookup("COMMAND_OUTPUT_PREFIX").unwrap_or_default(),
    })
}

fn init_tracing(config: &EngineConfig) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = EngineConfig::from_env();
    init_tracing(&config);

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ledger = KeyedResourceLedger::from_env(
        LEDGER_TABLE_ENV,
        DynamoDbLedgerConnector::new(aws_sdk_dynamodb::Client::new(&aws_config)),
    )?;
    let commands = SsmCommandService::new(
        aws_sdk_ssm::Client::new(&aws_config),
        aws_sdk_s3::Client::new(&aws_config),
        output_location(|name| std::env::var(name).ok()),
    );
    let provider = RemoteCommandProvider::new(ledger, commands, &config);
    let engine: Engine = LifecycleEngine::new(provider, HttpCallbackTransport::default(), config);

    let engine = Arc::new(engine);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let engine = Arc::clone(&engine);
        async move { handle_request(&engine, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use resource_lifecycle_lambda::runtime::contract::ResponseStatus;
    use resource_lifecycle_lambda::test_support::{
        sample_context, RecordingTransport, ScriptedProvider,
    };
    use serde_json::json;

    use super::*;

    #[test]
    fn rejects_request_without_callback_url() {
        let error = parse_request(&json!({
            "RequestType": "Create",
            "StackId": "stack-1",
            "RequestId": "request-1",
            "ResourceType": "Custom::RemoteCommand",
            "LogicalResourceId": "Setup"
        }))
        .expect_err("missing ResponseURL should fail");

        assert!(error.contains("invalid lifecycle request"));
    }

    #[test]
    fn unparseable_request_with_callback_url_gets_failed_response() {
        let provider = ScriptedProvider::accepting();
        let transport = RecordingTransport::new();
        let engine = LifecycleEngine::new(&provider, &transport, EngineConfig::default());
        let payload = json!({
            "RequestType": "Create",
            "ResponseURL": "https://callback.example/presigned",
            "RequestId": "request-1",
            "ResourceType": "Custom::RemoteCommand",
            "LogicalResourceId": "Setup"
        });

        let status = respond(&engine, &payload, &sample_context()).expect("response delivered");

        assert!(status.starts_with("FAILED"));
        assert!(status.contains("missing field `StackId`"));
        assert!(provider.calls().is_empty());
        let responses = transport.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, ResponseStatus::Failed);
        assert_eq!(responses[0].request_id, "request-1");
    }

    #[test]
    fn unparseable_request_without_callback_url_is_an_invocation_error() {
        let provider = ScriptedProvider::accepting();
        let transport = RecordingTransport::new();
        let engine = LifecycleEngine::new(&provider, &transport, EngineConfig::default());

        let error = respond(&engine, &json!({"RequestType": "Create"}), &sample_context())
            .expect_err("nothing to answer");

        assert!(error.to_string().contains("invalid lifecycle request"));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn output_location_requires_bucket() {
        assert_eq!(output_location(|_| None), None);
        assert_eq!(output_location(|_| Some(" ".to_string())), None);
    }

    #[test]
    fn output_location_uses_optional_prefix() {
        let location = output_location(|name| match name {
            "COMMAND_OUTPUT_BUCKET" => Some("outputs".to_string()),
            "COMMAND_OUTPUT_PREFIX" => Some("runs".to_string()),
            _ => None,
        })
        .expect("bucket is configured");

        assert_eq!(
            location,
            CommandOutputLocation {
                bucket: "outputs".to_string(),
                prefix: "runs".to_string(),
            }
        );
    }
}
