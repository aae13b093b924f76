//! # Snapview - Snapshot Workspace Reconciliation
//!
//! Returns a snapshot view to a clean, reproducible state and refreshes it
//! against its stream.
//!
//! ## Pipeline
//!
//! - **Load rules**: parse the active config spec into root-relative load paths
//! - **Classify**: find view-private files, skipping read-only, protected and
//!   checked-out content
//! - **Swipe**: delete files, then directories, counting partial success
//! - **Refresh**: reset the config spec and update, classifying failures as
//!   busy (retry shortly) or unknown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapview::{refresh, Cleartool, Components, LoadRuleSource, RefreshOptions, Workspace};
//!
//! fn main() -> anyhow::Result<()> {
//!     let tool = Cleartool::default();
//!     let workspace = Workspace::open(&tool, "/views/dev".as_ref(), ".view.dat")?;
//!     let options = RefreshOptions {
//!         swipe: true,
//!         load_rules: LoadRuleSource::Components(Components::Modifiable),
//!         ..RefreshOptions::default()
//!     };
//!
//!     let result = refresh(&tool, &workspace, &options)?;
//!     if let Some(failure) = result.failure {
//!         eprintln!("{}", failure.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod cleartool;
pub mod config;
pub mod error;
pub mod loadrules;
pub mod refresh;
pub mod signatures;
pub mod swipe;
pub mod workspace;

// Re-export main types for library consumers
pub use classify::{classify, ClassifiedFile, Classification, Governance, Protection};
pub use cleartool::{Cleartool, CommandLine, CommandOutput, VersionControl};
pub use config::Settings;
pub use error::{RefreshFailure, RetryPolicy, ToolError};
pub use loadrules::{extract, Components, LoadRule, LoadRuleSet, PathStyle};
pub use refresh::{refresh, LoadRuleSource, RefreshOptions, RefreshResult};
pub use swipe::{swipe, SwipeOutcome};
pub use workspace::{Stream, Workspace};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
