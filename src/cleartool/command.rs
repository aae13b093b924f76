use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A cleartool invocation as an argument vector.
///
/// Arguments are never joined into a shell string; `Display` renders a
/// quoted form for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    args: Vec<String>,
    cwd: Option<PathBuf>,
    merge_stderr: bool,
}

impl CommandLine {
    /// Start a command with its cleartool subcommand
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            args: vec![subcommand.into()],
            cwd: None,
            merge_stderr: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `arg` only when `condition` holds
    pub fn arg_if(self, condition: bool, arg: impl Into<String>) -> Self {
        if condition {
            self.arg(arg)
        } else {
            self
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Capture stderr together with stdout
    pub fn merged(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    pub fn subcommand(&self) -> &str {
        &self.args[0]
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn merges_stderr(&self) -> bool {
        self.merge_stderr
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleartool")?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
        }
    }

    /// Stdout split into lines, line endings removed
    pub fn lines(&self) -> Vec<String> {
        self.stdout.lines().map(str::to_string).collect()
    }

    /// Stdout without surrounding whitespace
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}
