#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use snapview::{CommandLine, CommandOutput, ToolError, VersionControl};

pub const MODEL_RO: &str =
    r#"element "[8d2e4f10.b3a711e2.9a5c.00:50:56:a5:51:84=\Model]/..." Model_1.0@\PVOB -nocheckout"#;
pub const TOOLS_RW: &str =
    r#"element "[71a0e5c2.b3a711e2.9a5c.00:50:56:a5:51:84=\Tools]/Build/..." .../rel_2_int/LATEST -mkbranch rel_2_int"#;

pub const REBASING: &str = r#"cleartool: Error: This view is currently being used to rebase stream "rel_2_int".
cleartool: Error: Unable to change configuration specification."#;

#[derive(Debug, Clone)]
pub enum Reply {
    Out(String),
    Fail(String),
    Missing(String),
    Unlaunchable,
}

/// Scripted cleartool that records every command it is asked to run.
///
/// Replies are looked up by the full argument list first, then by
/// subcommand. A queue of replies is consumed front to back and its last
/// entry repeats. Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct FakeTool {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<CommandLine>>,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, key: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn config_spec(self, lines: &[&str]) -> Self {
        self.reply("catcs", Reply::Out(lines.join("\n")))
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.subcommand().to_string())
            .collect()
    }

    pub fn call(&self, subcommand: &str) -> Option<CommandLine> {
        self.calls()
            .into_iter()
            .find(|call| call.subcommand() == subcommand)
    }

    fn next_reply(&self, command: &CommandLine) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let full = command.arguments().join(" ");
        let queue = match replies.contains_key(&full) {
            true => replies.get_mut(&full),
            false => replies.get_mut(command.subcommand()),
        }?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl VersionControl for FakeTool {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, ToolError> {
        self.calls.lock().unwrap().push(command.clone());

        match self.next_reply(command) {
            None => Ok(CommandOutput::new("")),
            Some(Reply::Out(stdout)) => Ok(CommandOutput::new(stdout)),
            Some(Reply::Fail(message)) => Err(ToolError::Abnormal {
                command: command.to_string(),
                status: 1,
                message,
            }),
            Some(Reply::Missing(message)) => Err(ToolError::NotFound {
                command: command.to_string(),
                message,
            }),
            Some(Reply::Unlaunchable) => Err(ToolError::Launch {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "cleartool not found"),
            }),
        }
    }
}

pub fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Loaded (versioned) content is read-only on disk
pub fn write_versioned(path: &Path, content: &str) {
    write(path, content);
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions).unwrap();
}
