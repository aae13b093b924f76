//! Swipe: delete classified view-private content
//!
//! Plain files go first, candidate directories second (deepest first), so a
//! directory is only attempted once everything inside it has been. Per-item
//! failures are counted, never raised; a crash mid-swipe leaves a workspace
//! the classifier will simply pick up again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::classify::Classification;

/// Result of one swipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeOutcome {
    pub total_candidates: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    /// Foreign top-level directories removed wholesale (not candidates)
    pub foreign_dirs_removed: usize,
    /// Foreign directories left fully or partly on disk
    pub foreign_dirs_failed: usize,
    pub success: bool,
}

impl SwipeOutcome {
    fn new(total_candidates: usize, files_deleted: usize, dirs_deleted: usize, foreign: Foreign) -> Self {
        Self {
            total_candidates,
            files_deleted,
            dirs_deleted,
            foreign_dirs_removed: foreign.removed,
            foreign_dirs_failed: foreign.failed,
            success: files_deleted + dirs_deleted == total_candidates,
        }
    }

    /// Candidates that are still on disk (or could not be confirmed gone)
    pub fn residue(&self) -> usize {
        self.total_candidates
            .saturating_sub(self.files_deleted + self.dirs_deleted)
    }

    /// Nothing left behind, candidates or foreign directories
    pub fn is_clean(&self) -> bool {
        self.success && self.foreign_dirs_failed == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Foreign {
    removed: usize,
    failed: usize,
}

/// Delete everything in `classification` and report what was removed
pub fn swipe(classification: &Classification) -> SwipeOutcome {
    let mut foreign = Foreign::default();
    for dir in &classification.foreign_dirs {
        tracing::debug!("Removing {}", dir.display());
        match fs::remove_dir_all(dir) {
            Ok(()) => foreign.removed += 1,
            Err(err) if err.kind() == ErrorKind::NotFound && !dir.exists() => {
                tracing::debug!("The directory {} does not exist", dir.display());
            }
            Err(err) => {
                tracing::warn!("Could not remove {}: {}", dir.display(), err);
                foreign.failed += 1;
            }
        }
    }

    let total = classification.candidates.len();
    if total == 0 {
        tracing::debug!("No files to delete");
        return SwipeOutcome::new(0, 0, 0, foreign);
    }

    let mut files = 0;
    let mut dirs = Vec::new();

    tracing::debug!("Removing files");
    for candidate in &classification.candidates {
        if candidate.is_directory {
            dirs.push(candidate.path.as_path());
            continue;
        }
        if remove_file(&candidate.path) {
            files += 1;
        }
    }

    dirs.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });

    tracing::debug!("Removing directories");
    let mut dir_count = 0;
    for dir in dirs {
        if remove_dir(dir) {
            dir_count += 1;
        }
    }

    tracing::info!(
        "Deleted {} director{} and {} file{}",
        dir_count,
        if dir_count == 1 { "y" } else { "ies" },
        files,
        if files == 1 { "" } else { "s" }
    );

    let outcome = SwipeOutcome::new(total, files, dir_count, foreign);
    if !outcome.success {
        tracing::warn!(
            "Some files were not deleted: {} of {} remain",
            outcome.residue(),
            total
        );
    }
    outcome
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::trace!("Deleted file: {}", path.display());
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("The file {} does not exist", path.display());
            false
        }
        Err(err) => {
            tracing::warn!("Could not delete {}: {}", path.display(), err);
            false
        }
    }
}

fn remove_dir(path: &Path) -> bool {
    match fs::remove_dir(path) {
        Ok(()) => {
            tracing::trace!("Deleted directory: {}", path.display());
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("The directory {} does not exist", path.display());
            false
        }
        Err(err) => {
            // Usually not empty: it holds content that was not a candidate
            tracing::debug!("Unable to delete {}: {}", path.display(), err);
            false
        }
    }
}
