//! External version-control tool boundary
//!
//! Everything the engine needs from cleartool goes through [`VersionControl`]:
//! implementors provide `run`, the service calls are built on top of it.

pub mod command;
pub mod process;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use command::{CommandLine, CommandOutput};
pub use process::Cleartool;

use crate::error::ToolError;
use crate::signatures::is_not_a_vob;
use crate::workspace::{Stream, Workspace};

pub trait VersionControl {
    /// Run one command, returning captured stdout on a zero exit
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, ToolError>;

    /// Text of the workspace's active configuration specification
    fn config_spec(&self, root: &Path) -> Result<Vec<String>, ToolError> {
        Ok(self
            .run(&CommandLine::new("catcs").current_dir(root))?
            .lines())
    }

    /// Stream the workspace is attached to
    fn current_stream(&self, workspace: &Workspace) -> Result<Stream, ToolError> {
        let command = CommandLine::new("lsstream").arg("-fmt").arg("%Xn");
        let command = match workspace.tag() {
            Some(tag) => command.arg("-view").arg(tag),
            None => command.current_dir(workspace.root()),
        };
        Ok(Stream::new(self.run(&command)?.trimmed()))
    }

    /// Regenerate the stream's configuration
    fn generate_stream(&self, stream: &Stream) -> Result<(), ToolError> {
        self.run(
            &CommandLine::new("chstream")
                .arg("-generate")
                .arg(stream.selector()),
        )?;
        Ok(())
    }

    /// Point the workspace's config spec back at its stream
    fn set_config_spec_to_stream(&self, root: &Path) -> Result<CommandOutput, ToolError> {
        self.run(&CommandLine::new("setcs").arg("-stream").current_dir(root))
    }

    /// Refresh the workspace; output has stderr merged in
    fn update(
        &self,
        root: &Path,
        overwrite: bool,
        load_rules: &[String],
    ) -> Result<CommandOutput, ToolError> {
        let command = CommandLine::new("update")
            .arg("-force")
            .arg_if(overwrite, "-overwrite")
            .arg_if(!load_rules.is_empty(), "-add_loadrules")
            .args(load_rules.iter().cloned())
            .current_dir(root)
            .merged();
        self.run(&command)
    }

    /// Absolute paths of everything checked out in this workspace
    fn list_checkouts(&self, root: &Path) -> Result<BTreeSet<PathBuf>, ToolError> {
        let output = self.run(
            &CommandLine::new("lsco")
                .arg("-short")
                .arg("-recurse")
                .arg("-cview")
                .current_dir(root),
        )?;

        Ok(output
            .lines()
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(|line| {
                let path = Path::new(line);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    root.join(path)
                }
            })
            .collect())
    }

    /// Whether `path` is a vob root. Only an explicit "not a vob" answer is
    /// `Ok(false)`; any other failure is returned as an error.
    fn is_vob(&self, path: &Path) -> Result<bool, ToolError> {
        let command = CommandLine::new("describe")
            .arg("-short")
            .arg(format!("vob:{}", path.display()));
        match self.run(&command) {
            Ok(_) => Ok(true),
            Err(err) if err.message().is_some_and(is_not_a_vob) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Root of the view containing `path`
    fn working_view_root(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let output = self.run(&CommandLine::new("pwv").arg("-root").current_dir(path))?;
        Ok(PathBuf::from(output.trimmed()))
    }

    /// View tag registered for a view uuid
    fn view_tag_for_uuid(&self, uuid: &str) -> Result<String, ToolError> {
        let output = self.run(
            &CommandLine::new("lsview")
                .arg("-short")
                .arg("-uuid")
                .arg(uuid),
        )?;
        Ok(output.trimmed().to_string())
    }
}
