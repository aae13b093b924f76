//! Refresh protocol: regenerate, swipe, reset the config spec, update
//!
//! Steps run strictly in that order and each one is optional per
//! [`RefreshOptions`]. A tool failure in the config-spec reset or the update
//! is classified into [`RefreshFailure`] and returned as data; only a tool
//! that cannot be invoked at all (or a failed stream generation or checkout
//! query) aborts with an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::{classify, Classification, Governance, Protection};
use crate::cleartool::VersionControl;
use crate::error::{RefreshFailure, ToolError};
use crate::loadrules::{extract, Components, LoadRuleSet, PathStyle};
use crate::signatures::{cache_log_path, classify_external_failure};
use crate::swipe::{swipe, SwipeOutcome};
use crate::workspace::Workspace;

/// Where the load rules for a refresh come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadRuleSource {
    /// Computed from the workspace's current config spec
    Components(Components),
    /// Caller-supplied, whitespace separated
    Explicit(String),
}

impl Default for LoadRuleSource {
    fn default() -> Self {
        LoadRuleSource::Components(Components::All)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOptions {
    pub swipe: bool,
    pub generate_stream: bool,
    pub overwrite: bool,
    pub exclude_root: bool,
    pub load_rules: LoadRuleSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub swipe: Option<SwipeOutcome>,
    pub cache_log_path: Option<PathBuf>,
    pub failure: Option<RefreshFailure>,
    /// Load paths handed to the update
    pub load_rules: Vec<String>,
    /// Paths the config spec loads without checkout rights
    pub read_only_rules: Vec<String>,
}

impl RefreshResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Rules a refresh works with: the full set for classification and the
/// selected subset for the update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRules {
    pub all: LoadRuleSet,
    pub selected: LoadRuleSet,
}

/// Resolve the load rules for `source` against the workspace's current config spec
pub fn resolve_load_rules<T>(
    tool: &T,
    workspace: &Workspace,
    source: &LoadRuleSource,
    style: PathStyle,
) -> Result<ResolvedRules>
where
    T: VersionControl + ?Sized,
{
    match source {
        LoadRuleSource::Components(components) => {
            let spec = tool
                .config_spec(workspace.root())
                .with_context(|| format!("Unable to read config spec of {}", workspace))?;
            let all = extract(&spec, style);
            let selected = all.select(*components);
            tracing::info!("{} components - {:?}", components, selected.paths());
            Ok(ResolvedRules { all, selected })
        }
        LoadRuleSource::Explicit(rules) => {
            let selected = LoadRuleSet::from_explicit(rules, style);
            Ok(ResolvedRules {
                all: selected.clone(),
                selected,
            })
        }
    }
}

/// Classify the workspace against `rules`, protecting current checkouts.
///
/// With an empty rule set the tool is asked which top-level directories are
/// vobs instead; a probe that fails counts as governed.
pub fn classify_workspace<T>(
    tool: &T,
    workspace: &Workspace,
    rules: &LoadRuleSet,
    exclude_root: bool,
) -> Result<Classification>
where
    T: VersionControl + ?Sized,
{
    let checkouts = tool
        .list_checkouts(workspace.root())
        .with_context(|| format!("Unable to list checkouts in {}", workspace))?;
    tracing::debug!("{} checked out element(s) protected", checkouts.len());

    let protection = Protection::new(workspace.identity_file()).with_checkouts(checkouts);

    let classification = if rules.is_empty() {
        tracing::info!("No load rules available, asking the tool for vob membership");
        let probe = |path: &Path| match tool.is_vob(path) {
            Ok(is_vob) => is_vob,
            Err(err) => {
                tracing::warn!("Vob check failed for {}: {}", path.display(), err);
                true
            }
        };
        classify(
            workspace.root(),
            &Governance::Membership(&probe),
            exclude_root,
            &protection,
        )
    } else {
        classify(
            workspace.root(),
            &Governance::LoadRules(rules),
            exclude_root,
            &protection,
        )
    };

    Ok(classification)
}

/// Reconcile and refresh a workspace
pub fn refresh<T>(tool: &T, workspace: &Workspace, options: &RefreshOptions) -> Result<RefreshResult>
where
    T: VersionControl + ?Sized,
{
    refresh_with_style(tool, workspace, options, PathStyle::native())
}

/// [`refresh`] with an explicit path convention for load-rule keys
pub fn refresh_with_style<T>(
    tool: &T,
    workspace: &Workspace,
    options: &RefreshOptions,
    style: PathStyle,
) -> Result<RefreshResult>
where
    T: VersionControl + ?Sized,
{
    let mut result = RefreshResult::default();

    if options.generate_stream {
        let stream = match workspace.stream() {
            Some(stream) => stream.clone(),
            None => tool
                .current_stream(workspace)
                .with_context(|| format!("Unable to get stream of {}", workspace))?,
        };
        tool.generate_stream(&stream)
            .with_context(|| format!("Unable to generate stream {}", stream))?;
        tracing::debug!("Stream {} generated", stream);
    }

    let rules = resolve_load_rules(tool, workspace, &options.load_rules, style)?;
    result.load_rules = rules.selected.paths();
    result.read_only_rules = rules.all.read_only().paths();

    if options.swipe {
        tracing::info!("Swiping {}", workspace);
        let classification = classify_workspace(tool, workspace, &rules.all, options.exclude_root)?;
        result.swipe = Some(swipe(&classification));
    }

    if let Err(err) = tool.set_config_spec_to_stream(workspace.root()) {
        result.failure = Some(classify_tool_failure(err, "Unable to set cs stream", workspace)?);
        return Ok(result);
    }

    tracing::debug!("Updating view {}", workspace);
    match tool.update(workspace.root(), options.overwrite, &result.load_rules) {
        Ok(output) => {
            result.cache_log_path = cache_log_path(&output.stdout);
        }
        Err(err) => {
            result.failure = Some(classify_tool_failure(err, "Unable to update view", workspace)?);
        }
    }

    Ok(result)
}

fn classify_tool_failure(err: ToolError, what: &str, workspace: &Workspace) -> Result<RefreshFailure> {
    let Some(message) = err.message().map(str::to_string) else {
        return Err(err).with_context(|| format!("{}: {}", what, workspace));
    };

    let failure = classify_external_failure(&message);
    match &failure {
        RefreshFailure::Busy { stream } => {
            tracing::warn!("The view is currently rebasing the stream {}", stream)
        }
        RefreshFailure::Unknown { .. } => tracing::warn!("{}: {}", what, err),
    }
    Ok(failure)
}
