//! Running service-manager commands (`systemctl`, `launchctl`)

use async_trait::async_trait;

use crate::error::ServiceError;

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion. A non-zero exit is reported
    /// in [`CommandOutput::success`], not as an error.
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError>;
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        tracing::debug!(program, ?args, "Running service command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ServiceError::Command {
                command: program.to_string(),
                message: e.to_string(),
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit into [`ServiceError::Command`].
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, ServiceError> {
    let output = runner.run(program, args).await?;
    if output.success {
        return Ok(output);
    }
    let message = match output.stderr.trim() {
        "" => "exited with non-zero status".to_string(),
        stderr => stderr.to_string(),
    };
    Err(ServiceError::Command {
        command: command_line(program, args),
        message,
    })
}

pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by full command line; unknown commands succeed with no output.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: Mutex<HashMap<String, CommandOutput>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn respond(&self, line: &str, output: CommandOutput) {
            self.responses
                .lock()
                .unwrap()
                .insert(line.to_string(), output);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
            let line = command_line(program, args);
            self.calls.lock().unwrap().push(line.clone());
            let response = self.responses.lock().unwrap().get(&line).cloned();
            Ok(response.unwrap_or_else(|| CommandOutput::ok("")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeRunner;
    use super::*;

    #[tokio::test]
    async fn test_run_checked_reports_stderr() {
        let runner = FakeRunner::default();
        runner.respond(
            "systemctl --user start ughd.service",
            CommandOutput::failed("Unit not found.\n"),
        );

        let err = run_checked(&runner, "systemctl", &["--user", "start", "ughd.service"])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "systemctl --user start ughd.service failed: Unit not found."
        );
    }

    #[tokio::test]
    async fn test_run_checked_passes_output() {
        let runner = FakeRunner::default();
        runner.respond("launchctl list", CommandOutput::ok("PID\tStatus\tLabel\n"));
        let out = run_checked(&runner, "launchctl", &["list"]).await.unwrap();
        assert!(out.stdout.starts_with("PID"));
        assert_eq!(runner.calls(), vec!["launchctl list"]);
    }
}
