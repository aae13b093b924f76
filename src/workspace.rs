//! Explicit workspace handle
//!
//! Callers create a [`Workspace`] and pass it into every engine call. Nothing
//! is cached between calls.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cleartool::VersionControl;

static VIEW_UUID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"view_uuid:(\S+)").expect("view uuid pattern"));

/// Name of the hidden identity file at the root of a snapshot view
pub fn default_identity_file() -> &'static str {
    if cfg!(windows) {
        "view.dat"
    } else {
        ".view.dat"
    }
}

/// Fully qualified stream identifier, e.g. `rel_2_int@\PVOB`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stream(String);

impl Stream {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// Object selector form accepted by cleartool
    pub fn selector(&self) -> String {
        if self.0.starts_with("stream:") {
            self.0.clone()
        } else {
            format!("stream:{}", self.0)
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A snapshot workspace on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    root: PathBuf,
    identity_file: String,
    tag: Option<String>,
    stream: Option<Stream>,
}

impl Workspace {
    /// Handle for `root` with the platform's identity file name
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity_file: default_identity_file().to_string(),
            tag: None,
            stream: None,
        }
    }

    pub fn with_identity_file(mut self, name: impl Into<String>) -> Self {
        self.identity_file = name.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Discover the workspace containing `path`.
    ///
    /// Resolves the view root, reads the view uuid from the identity file,
    /// then asks the tool for the view tag and the attached stream.
    pub fn open<T>(tool: &T, path: &Path, identity_file: &str) -> Result<Self>
    where
        T: VersionControl + ?Sized,
    {
        let root = tool
            .working_view_root(path)
            .with_context(|| format!("Unable to get current view root for {}", path.display()))?;

        let identity_path = root.join(identity_file);
        let content = std::fs::read_to_string(&identity_path)
            .with_context(|| format!("No view identity file at {}", identity_path.display()))?;
        let uuid = read_view_uuid(&content)
            .with_context(|| format!("No view uuid in {}", identity_path.display()))?;

        let tag = tool
            .view_tag_for_uuid(&uuid)
            .with_context(|| format!("Unable to list view with uuid {}", uuid))?;

        let workspace = Workspace::new(root)
            .with_identity_file(identity_file)
            .with_tag(tag);

        let stream = tool
            .current_stream(&workspace)
            .with_context(|| format!("Unable to get stream from view {}", workspace))?;

        tracing::info!("Opened workspace {} on stream {}", workspace, stream);
        Ok(workspace.with_stream(stream))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identity_file(&self) -> &str {
        &self.identity_file
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{} ({})", tag, self.root.display()),
            None => write!(f, "{}", self.root.display()),
        }
    }
}

/// Extract the view uuid from identity file content
pub fn read_view_uuid(content: &str) -> Option<String> {
    VIEW_UUID
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
}
