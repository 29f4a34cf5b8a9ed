use std::thread;
use std::time::Duration;

use crate::adapters::command::{CommandPoll, CommandService, CommandStatus, RemoteCommand};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command_id: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("failed to submit command to {instance_id}: {message}")]
    Submit { instance_id: String, message: String },
    #[error("failed to poll command {command_id}: {message}")]
    Poll { command_id: String, message: String },
    #[error("failed to fetch full output of command {command_id}: {message}")]
    Output { command_id: String, message: String },
    #[error("command {command_id} failed on {instance_id}: {output}")]
    Failed {
        command_id: String,
        instance_id: String,
        output: String,
    },
}

/// Submits `command` and polls once per second until it reaches a terminal
/// status. There is no timeout beyond the host's execution budget.
pub fn run_to_completion(
    service: &impl CommandService,
    command: &RemoteCommand,
) -> Result<CommandResult, CommandError> {
    run_with_interval(service, command, POLL_INTERVAL)
}

pub fn run_with_interval(
    service: &impl CommandService,
    command: &RemoteCommand,
    interval: Duration,
) -> Result<CommandResult, CommandError> {
    let command_id = service
        .submit(command)
        .map_err(|message| CommandError::Submit {
            instance_id: command.instance_id.clone(),
            message,
        })?;
    tracing::info!(
        command_id = %command_id,
        instance_id = %command.instance_id,
        "submitted remote command"
    );

    let CommandPoll {
        status,
        output,
        truncated,
    } = loop {
        let poll = service
            .poll(&command_id, &command.instance_id)
            .map_err(|message| CommandError::Poll {
                command_id: command_id.clone(),
                message,
            })?;
        if poll.status.is_terminal() {
            break poll;
        }
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    };

    let output = if truncated {
        tracing::debug!(command_id = %command_id, "polled output truncated; fetching full output");
        service
            .fetch_full_output(&command_id, &command.instance_id)
            .map_err(|message| CommandError::Output {
                command_id: command_id.clone(),
                message,
            })?
    } else {
        output
    };

    match status {
        CommandStatus::Success => Ok(CommandResult { command_id, output }),
        _ => Err(CommandError::Failed {
            command_id,
            instance_id: command.instance_id.clone(),
            output,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::command::TRUNCATION_MARKER;
    use crate::test_support::ScriptedCommandService;

    fn sample_command() -> RemoteCommand {
        RemoteCommand {
            instance_id: "i-123".to_string(),
            commands: vec!["echo hello".to_string()],
        }
    }

    #[test]
    fn polls_until_terminal_status() {
        let service = ScriptedCommandService::new(vec![
            ScriptedCommandService::pending(),
            ScriptedCommandService::pending(),
            ScriptedCommandService::succeeded("hello"),
        ]);

        let result = run_with_interval(&service, &sample_command(), Duration::ZERO)
            .expect("command should succeed");

        assert_eq!(result.output, "hello");
        assert_eq!(service.poll_count(), 3);
        assert_eq!(service.submitted(), vec![sample_command()]);
    }

    #[test]
    fn fetches_full_output_when_truncated() {
        let service = ScriptedCommandService::new(vec![CommandPoll {
            status: CommandStatus::Success,
            output: format!("partial\n{TRUNCATION_MARKER}"),
            truncated: true,
        }])
        .with_full_output("the complete output");

        let result = run_with_interval(&service, &sample_command(), Duration::ZERO)
            .expect("command should succeed");

        assert_eq!(result.output, "the complete output");
        assert_eq!(service.full_output_fetches(), 1);
    }

    #[test]
    fn failed_status_carries_output() {
        let service = ScriptedCommandService::new(vec![ScriptedCommandService::failed("exit 1")]);

        let error = run_with_interval(&service, &sample_command(), Duration::ZERO)
            .expect_err("command should fail");

        match error {
            CommandError::Failed {
                instance_id,
                output,
                ..
            } => {
                assert_eq!(instance_id, "i-123");
                assert_eq!(output, "exit 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn submit_failure_is_reported() {
        let service = ScriptedCommandService::new(Vec::new()).rejecting_submit("access denied");

        let error = run_with_interval(&service, &sample_command(), Duration::ZERO)
            .expect_err("submit should fail");

        assert!(error.to_string().contains("access denied"));
        assert_eq!(service.poll_count(), 0);
    }
}
