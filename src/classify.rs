//! View-private file classification
//!
//! Walks a workspace and decides which files and directories are not under
//! version control and may be removed. Three rules keep user work and
//! versioned content safe:
//!
//! - read-only files are assumed to be loaded from version control
//! - protected names (checked-out marker, `.keep`, `.contrib`, `.updt`) and
//!   the identity file are never candidates
//! - paths the tool reports as checked out are never candidates
//!
//! Top-level directories that no load rule covers are foreign and are
//! handed over for wholesale removal without being descended into.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::loadrules::LoadRuleSet;

pub const CHECKEDOUT_MARKER: &str = "CHECKEDOUT";
pub const KEEP_SUFFIX: &str = ".keep";
pub const CONTRIB_SUFFIX: &str = ".contrib";
pub const UPDATE_SUFFIX: &str = ".updt";

/// Names the tool uses for transitional or preserved copies
pub fn is_protected_name(name: &str) -> bool {
    name.ends_with(CHECKEDOUT_MARKER)
        || name.ends_with(KEEP_SUFFIX)
        || name.ends_with(CONTRIB_SUFFIX)
        || name.ends_with(UPDATE_SUFFIX)
}

/// One deletion candidate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl ClassifiedFile {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
        }
    }
}

/// Everything one classification pass found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Files and wholly view-private directories to delete individually
    pub candidates: BTreeSet<ClassifiedFile>,
    /// Top-level directories outside every load rule, removed wholesale
    pub foreign_dirs: BTreeSet<PathBuf>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.foreign_dirs.is_empty()
    }
}

/// How top-level directories are recognised as version-controlled
pub enum Governance<'a> {
    /// A directory is governed if it is the top level of some load rule
    LoadRules(&'a LoadRuleSet),
    /// Ask the tool; used only when no load rules are available
    Membership(&'a dyn Fn(&Path) -> bool),
}

impl Governance<'_> {
    fn governs(&self, dir: &Path) -> bool {
        match self {
            Governance::LoadRules(rules) => dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| rules.governs(name)),
            Governance::Membership(is_vob) => is_vob(dir),
        }
    }
}

/// Paths that must survive regardless of what the walk finds
#[derive(Debug, Clone)]
pub struct Protection {
    pub identity_file: String,
    pub checkouts: BTreeSet<PathBuf>,
}

impl Protection {
    pub fn new(identity_file: impl Into<String>) -> Self {
        Self {
            identity_file: identity_file.into(),
            checkouts: BTreeSet::new(),
        }
    }

    pub fn with_checkouts(mut self, checkouts: BTreeSet<PathBuf>) -> Self {
        self.checkouts = checkouts;
        self
    }

    fn protects(&self, path: &Path, name: &str) -> bool {
        name == self.identity_file || is_protected_name(name) || self.checkouts.contains(path)
    }

    /// True if some checkout lives at or below `dir`
    fn holds_checkout(&self, dir: &Path) -> bool {
        self.checkouts.iter().any(|checkout| checkout.starts_with(dir))
    }
}

/// Writable by the current user. Loaded files carry no write bit at all,
/// which also covers a superuser for whom `access` always succeeds.
#[cfg(unix)]
fn is_writable(path: &Path, metadata: &fs::Metadata) -> bool {
    use rustix::fs::{access, Access};

    if metadata.permissions().readonly() {
        return false;
    }
    // Removing a link needs no write access to its target
    metadata.file_type().is_symlink() || access(path, Access::WRITE_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(_path: &Path, metadata: &fs::Metadata) -> bool {
    !metadata.permissions().readonly()
}

/// Classify the workspace rooted at `root`.
///
/// Never fails: unreadable directories are skipped with a warning and
/// poison their ancestors so no enclosing directory is queued.
pub fn classify(
    root: &Path,
    governance: &Governance<'_>,
    exclude_root: bool,
    protection: &Protection,
) -> Classification {
    let mut classification = Classification::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("Unable to list workspace root {}: {}", root.display(), err);
            return classification;
        }
    };

    let mut governed = Vec::new();
    let mut root_files = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Unable to read entry in {}: {}", root.display(), err);
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!("Unable to stat {}: {}", path.display(), err);
                continue;
            }
        };

        if !is_writable(&path, &metadata) {
            tracing::debug!("{} is write protected", path.display());
            continue;
        }

        if metadata.is_dir() {
            if governance.governs(&path) {
                governed.push(path);
            } else if protection.holds_checkout(&path) {
                tracing::warn!(
                    "{} is outside the load rules but holds checkouts, inspecting per file",
                    path.display()
                );
                governed.push(path);
            } else {
                tracing::debug!("{} is not governed by any load rule", path.display());
                classification.foreign_dirs.insert(path);
            }
        } else if name.eq_ignore_ascii_case(&protection.identity_file) {
            continue;
        } else if !protection.protects(&path, &name) {
            root_files.push(path);
        }
    }

    for dir in &governed {
        let before = classification.candidates.len();
        collect_view_private(dir, protection, &mut classification.candidates);
        tracing::info!(
            "Found {} view private entries in {}",
            classification.candidates.len() - before,
            dir.display()
        );
    }

    if !exclude_root {
        classification
            .candidates
            .extend(root_files.into_iter().map(ClassifiedFile::file));
    }

    classification
}

/// Add the view-private entries below a governed directory to `out`.
///
/// A subdirectory qualifies only when it is writable, non-empty and every
/// entry beneath it qualifies too.
///
/// Versioned directories are writable in a snapshot view, so one holding
/// only view-private files qualifies too; the following update reloads it.
fn collect_view_private(dir: &Path, protection: &Protection, out: &mut BTreeSet<ClassifiedFile>) {
    let mut entries: Vec<(PathBuf, bool, bool)> = Vec::new();
    let mut tainted: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        match entry {
            Ok(entry) => {
                let path = entry.path().to_path_buf();
                let name = entry.file_name().to_string_lossy();
                let is_dir = entry.file_type().is_dir();
                let eligible = match entry.metadata() {
                    Ok(metadata) => {
                        is_writable(&path, &metadata) && !protection.protects(&path, &name)
                    }
                    Err(err) => {
                        tracing::warn!("Unable to stat {}: {}", path.display(), err);
                        false
                    }
                };
                entries.push((path, is_dir, eligible));
            }
            Err(err) => {
                let path = err.path().map(Path::to_path_buf);
                tracing::warn!("Skipping unreadable path under {}: {}", dir.display(), err);
                if let Some(path) = path {
                    if let Some(parent) = path.parent() {
                        tainted.insert(parent.to_path_buf());
                    }
                    tainted.insert(path);
                }
            }
        }
    }

    // Deepest first so a directory is decided after everything inside it
    entries.sort_by(|a, b| {
        b.0.components()
            .count()
            .cmp(&a.0.components().count())
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut non_empty: HashSet<PathBuf> = HashSet::new();

    for (path, is_dir, eligible) in entries {
        let qualifies = eligible
            && (!is_dir || (non_empty.contains(&path) && !tainted.contains(&path)));

        if let Some(parent) = path.parent() {
            non_empty.insert(parent.to_path_buf());
            if !qualifies {
                tainted.insert(parent.to_path_buf());
            }
        }

        if qualifies {
            out.insert(ClassifiedFile {
                path,
                is_directory: is_dir,
            });
        }
    }
}
