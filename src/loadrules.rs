//! Load rules extracted from a workspace's configuration specification
//!
//! Component rules in a stream-generated config spec look like
//!
//! ```text
//! element "[8d2e4f10.b3a711e2.9a5c.00:50:56:a5:51:84=\Model]/..." .../rel_2_int/LATEST -nocheckout
//! ```
//!
//! The vob tag and component path between `=` and `...` become the load
//! path; a `-nocheckout` modifier marks the component read-only.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

static ELEMENT_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(.*=)(\S+)\](\S+)(\.\.\." )(\S+)(.*)$"#).expect("element rule pattern")
});

const ELEMENT_KEYWORD: &str = "element";
const NO_CHECKOUT: &str = "-nocheckout";

/// Separator convention the keys are normalized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStyle {
    Windows,
    Posix,
}

impl PathStyle {
    /// Convention of the platform this binary runs on
    pub fn native() -> Self {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    fn separator(self) -> char {
        match self {
            PathStyle::Windows => '\\',
            PathStyle::Posix => '/',
        }
    }

    /// Make a raw rule fragment comparable with directory listing names:
    /// leading and trailing separators dropped, separators unified.
    pub fn normalize(self, raw: &str) -> String {
        let sep = self.separator();
        raw.trim()
            .trim_matches(|c| c == '/' || c == '\\')
            .chars()
            .map(|c| if c == '/' || c == '\\' { sep } else { c })
            .collect()
    }
}

/// One root-relative load path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRule {
    pub path: String,
    pub read_only: bool,
}

impl LoadRule {
    /// First path component; the top-level workspace directory this rule loads into
    pub fn top_level(&self) -> &str {
        top_level(&self.path)
    }
}

fn top_level(path: &str) -> &str {
    path.split(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
}

/// Which components a refresh loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Components {
    #[default]
    All,
    Modifiable,
}

impl fmt::Display for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Components::All => write!(f, "all"),
            Components::Modifiable => write!(f, "modifiable"),
        }
    }
}

impl FromStr for Components {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Components::All),
            "modifiable" => Ok(Components::Modifiable),
            other => Err(anyhow::anyhow!("Invalid components selection: {}", other)),
        }
    }
}

/// Load rules of a workspace at one point in time, keyed by normalized path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRuleSet {
    rules: BTreeMap<String, bool>,
}

impl LoadRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule; a repeated path replaces the earlier entry
    pub fn insert(&mut self, path: impl Into<String>, read_only: bool) {
        self.rules.insert(path.into(), read_only);
    }

    /// Parse a caller-supplied, whitespace-separated rule string
    pub fn from_explicit(rules: &str, style: PathStyle) -> Self {
        let mut set = Self::new();
        for token in rules.split_whitespace() {
            let path = style.normalize(token);
            if path.is_empty() {
                continue;
            }
            set.insert(path, false);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<bool> {
        self.rules.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = LoadRule> + '_ {
        self.rules.iter().map(|(path, read_only)| LoadRule {
            path: path.clone(),
            read_only: *read_only,
        })
    }

    /// Rows without the no-checkout modifier
    pub fn modifiable(&self) -> LoadRuleSet {
        self.filtered(|read_only| !read_only)
    }

    /// Rows carrying the no-checkout modifier
    pub fn read_only(&self) -> LoadRuleSet {
        self.filtered(|read_only| read_only)
    }

    /// View for the requested component selection
    pub fn select(&self, components: Components) -> LoadRuleSet {
        match components {
            Components::All => self.clone(),
            Components::Modifiable => self.modifiable(),
        }
    }

    fn filtered(&self, keep: impl Fn(bool) -> bool) -> LoadRuleSet {
        LoadRuleSet {
            rules: self
                .rules
                .iter()
                .filter(|(_, read_only)| keep(**read_only))
                .map(|(path, read_only)| (path.clone(), *read_only))
                .collect(),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    /// True if `name` is the top-level directory of any rule
    pub fn governs(&self, name: &str) -> bool {
        self.rules.keys().any(|path| top_level(path) == name)
    }
}

impl FromIterator<LoadRule> for LoadRuleSet {
    fn from_iter<I: IntoIterator<Item = LoadRule>>(iter: I) -> Self {
        let mut set = LoadRuleSet::new();
        for rule in iter {
            set.insert(rule.path, rule.read_only);
        }
        set
    }
}

/// Parse one config-spec line; `None` for lines that are not element rules
/// or do not carry a load path.
pub fn parse_rule(line: &str, style: PathStyle) -> Option<LoadRule> {
    if !line.starts_with(ELEMENT_KEYWORD) {
        return None;
    }

    let Some(caps) = ELEMENT_RULE.captures(line) else {
        tracing::debug!("Skipping element rule without a load path: {}", line);
        return None;
    };

    let raw = format!("{}{}", &caps[2], &caps[3]);
    let path = style.normalize(&raw);
    if path.is_empty() {
        tracing::warn!("Element rule yields an empty load path: {}", line);
        return None;
    }

    let read_only = line.contains(NO_CHECKOUT);
    tracing::debug!("Config spec line: {} read-only = {}", path, read_only);

    Some(LoadRule { path, read_only })
}

/// Extract the load rules from config-spec text. Never fails; lines that do
/// not parse contribute nothing.
pub fn extract<S: AsRef<str>>(config_spec: &[S], style: PathStyle) -> LoadRuleSet {
    let set: LoadRuleSet = config_spec
        .iter()
        .filter_map(|line| parse_rule(line.as_ref(), style))
        .collect();

    tracing::info!(
        "Extracted {} load rule(s), {} read-only",
        set.len(),
        set.read_only().len()
    );
    set
}
