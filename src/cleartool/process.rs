use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{CommandLine, CommandOutput, VersionControl};
use crate::error::ToolError;
use crate::signatures::{tool_signal, ToolSignal};

/// Process-backed cleartool proxy
#[derive(Debug, Clone)]
pub struct Cleartool {
    executable: PathBuf,
}

impl Default for Cleartool {
    fn default() -> Self {
        Self::new("cleartool")
    }
}

impl Cleartool {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }
}

impl VersionControl for Cleartool {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, ToolError> {
        tracing::debug!("Running {}", command);

        let mut process = Command::new(&self.executable);
        process
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.working_dir() {
            process.current_dir(dir);
        }

        let output = process.output().map_err(|source| ToolError::Launch {
            command: command.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let message = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(failure(command, status, message));
        }

        let stdout = if command.merges_stderr() && !stderr.is_empty() {
            format!("{}{}", stdout, stderr)
        } else {
            stdout
        };

        Ok(CommandOutput { status, stdout })
    }
}

/// Turn a non-zero exit into the matching [`ToolError`] variant
pub(crate) fn failure(command: &CommandLine, status: i32, message: String) -> ToolError {
    let command = command.to_string();
    match tool_signal(&message) {
        ToolSignal::NotFound => ToolError::NotFound { command, message },
        ToolSignal::AlreadyExists => ToolError::AlreadyExists { command, message },
        ToolSignal::Other => ToolError::Abnormal {
            command,
            status,
            message,
        },
    }
}
