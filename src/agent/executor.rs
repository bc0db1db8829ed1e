use std::borrow::Cow;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output, Stdio};

use tokio::process::Command;

use crate::config::ExecutionConfig;

/// A command addressed to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Correlation id, unique per dispatch attempt. Not used for deduplication.
    pub request_id: String,
    pub command: String,
}

impl CommandRequest {
    pub fn new(request_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            command: command.into(),
        }
    }
}

/// Result of running a command on an agent.
///
/// A nonzero `exit_code` is data, not a failure of the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub request_id: String,
    /// Combined stdout and stderr in the order the process wrote them.
    pub output: Vec<u8>,
    pub exit_code: i32,
    /// Name the answering agent gave for itself, when the transport carries it.
    pub node_name: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// Runs commands through a shell, optionally inside another filesystem root.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecutionConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute `request` and wait for the process to finish.
    ///
    /// Never fails: a process that cannot be started is reported as exit
    /// code 1 with a diagnostic line appended to the output.
    pub async fn execute(&self, request: &CommandRequest) -> ExecutionResult {
        tracing::info!(
            request_id = %request.request_id,
            command = %request.command,
            execution_root = ?self.config.execution_root,
            "Executing command"
        );

        let result = self.build_command(&request.command).output().await;
        Self::process_output(&request.request_id, result)
    }

    /// `sh -c` (or `chroot <root> sh -c`) with stderr folded into stdout by
    /// the shell itself, so both streams keep their relative order. Whatever
    /// the launcher writes to its own stderr is appended afterwards.
    fn build_command(&self, command_text: &str) -> Command {
        let mut command = match &self.config.execution_root {
            Some(root) => {
                let mut chroot = Command::new("chroot");
                chroot.arg(root).arg(&self.config.shell);
                chroot
            }
            None => Command::new(&self.config.shell),
        };

        command
            .arg("-c")
            .arg(format!("exec 2>&1\n{command_text}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn process_output(request_id: &str, result: std::io::Result<Output>) -> ExecutionResult {
        match result {
            Ok(output) => {
                let exit_code = exit_code(output.status);
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);

                tracing::info!(
                    request_id,
                    exit_code,
                    output_bytes = combined.len(),
                    "Command executed"
                );

                ExecutionResult {
                    request_id: request_id.to_string(),
                    output: combined,
                    exit_code,
                    node_name: None,
                }
            }
            Err(e) => {
                tracing::error!(request_id, error = %e, "Failed to start command");
                ExecutionResult {
                    request_id: request_id.to_string(),
                    output: format!("failed to execute command: {e}").into_bytes(),
                    exit_code: 1,
                    node_name: None,
                }
            }
        }
    }
}

/// Exit status as an integer; death by signal follows the shell's `128 + n`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}
