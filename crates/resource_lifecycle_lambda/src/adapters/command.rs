use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::CommandInvocationStatus;

use crate::adapters::block_on;

/// Suffix the command service appends when it cuts polled output short.
pub const TRUNCATION_MARKER: &str = "--output truncated--";

const RUN_SHELL_DOCUMENT: &str = "AWS-RunShellScript";
const RUN_SHELL_STEP: &str = "awsrunShellScript";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Success,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPoll {
    pub status: CommandStatus,
    pub output: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub instance_id: String,
    pub commands: Vec<String>,
}

pub trait CommandService {
    fn submit(&self, command: &RemoteCommand) -> Result<String, String>;

    fn poll(&self, command_id: &str, instance_id: &str) -> Result<CommandPoll, String>;

    fn fetch_full_output(&self, command_id: &str, instance_id: &str) -> Result<String, String>;
}

impl<S: CommandService + ?Sized> CommandService for &S {
    fn submit(&self, command: &RemoteCommand) -> Result<String, String> {
        (**self).submit(command)
    }

    fn poll(&self, command_id: &str, instance_id: &str) -> Result<CommandPoll, String> {
        (**self).poll(command_id, instance_id)
    }

    fn fetch_full_output(&self, command_id: &str, instance_id: &str) -> Result<String, String> {
        (**self).fetch_full_output(command_id, instance_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutputLocation {
    pub bucket: String,
    pub prefix: String,
}

impl CommandOutputLocation {
    /// Prefix without surrounding slashes, as both SSM and the S3 lookup use it.
    pub fn key_prefix(&self) -> Option<&str> {
        Some(self.prefix.trim_matches('/')).filter(|prefix| !prefix.is_empty())
    }

    /// Object key SSM writes the step's standard output to.
    pub fn stdout_key(&self, command_id: &str, instance_id: &str) -> String {
        let suffix = format!("{command_id}/{instance_id}/{RUN_SHELL_STEP}/0.{RUN_SHELL_STEP}/stdout");
        match self.key_prefix() {
            Some(prefix) => format!("{prefix}/{suffix}"),
            None => suffix,
        }
    }
}

/// Runs shell commands on managed instances through SSM Run Command.
#[derive(Debug, Clone)]
pub struct SsmCommandService {
    ssm_client: aws_sdk_ssm::Client,
    s3_client: aws_sdk_s3::Client,
    output_location: Option<CommandOutputLocation>,
}

impl SsmCommandService {
    pub fn new(
        ssm_client: aws_sdk_ssm::Client,
        s3_client: aws_sdk_s3::Client,
        output_location: Option<CommandOutputLocation>,
    ) -> Self {
        Self {
            ssm_client,
            s3_client,
            output_location,
        }
    }
}

impl CommandService for SsmCommandService {
    fn submit(&self, command: &RemoteCommand) -> Result<String, String> {
        let output = block_on(
            self.ssm_client
                .send_command()
                .instance_ids(&command.instance_id)
                .document_name(RUN_SHELL_DOCUMENT)
                .parameters("commands", command.commands.clone())
                .set_output_s3_bucket_name(
                    self.output_location
                        .as_ref()
                        .map(|location| location.bucket.clone()),
                )
                .set_output_s3_key_prefix(
                    self.output_location
                        .as_ref()
                        .and_then(CommandOutputLocation::key_prefix)
                        .map(str::to_string),
                )
                .send(),
        )
        .map_err(|error| format!("failed to send command: {}", DisplayErrorContext(&error)))?;

        output
            .command()
            .and_then(|sent| sent.command_id())
            .map(str::to_string)
            .ok_or_else(|| "send command response carried no command id".to_string())
    }

    fn poll(&self, command_id: &str, instance_id: &str) -> Result<CommandPoll, String> {
        let result = block_on(
            self.ssm_client
                .get_command_invocation()
                .command_id(command_id)
                .instance_id(instance_id)
                .send(),
        );

        let output = match result {
            Ok(output) => output,
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_invocation_does_not_exist()) =>
            {
                // The invocation is not visible until the agent picks it up.
                return Ok(CommandPoll {
                    status: CommandStatus::Pending,
                    output: String::new(),
                    truncated: false,
                });
            }
            Err(error) => {
                return Err(format!(
                    "failed to poll command {command_id}: {}",
                    DisplayErrorContext(&error)
                ))
            }
        };

        let status = match output.status() {
            Some(CommandInvocationStatus::Success) => CommandStatus::Success,
            Some(
                CommandInvocationStatus::Pending
                | CommandInvocationStatus::InProgress
                | CommandInvocationStatus::Delayed
                | CommandInvocationStatus::Cancelling,
            )
            | None => CommandStatus::Pending,
            Some(_) => CommandStatus::Failed,
        };
        let text = output
            .standard_output_content()
            .unwrap_or_default()
            .to_string();
        let truncated = text.trim_end().ends_with(TRUNCATION_MARKER);

        Ok(CommandPoll {
            status,
            output: text,
            truncated,
        })
    }

    fn fetch_full_output(&self, command_id: &str, instance_id: &str) -> Result<String, String> {
        let location = self.output_location.as_ref().ok_or_else(|| {
            format!("output of command {command_id} is truncated and no output bucket is configured")
        })?;
        let key = location.stdout_key(command_id, instance_id);
        let client = self.s3_client.clone();
        let bucket = location.bucket.clone();

        block_on(async move {
            let object = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|error| {
                    format!(
                        "failed to read full command output from s3: {}",
                        aws_sdk_s3::error::DisplayErrorContext(&error)
                    )
                })?;
            let bytes = object
                .body
                .collect()
                .await
                .map_err(|error| format!("failed to stream command output: {error}"))?
                .into_bytes();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}
