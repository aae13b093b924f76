//! Error Handling and Retry Logic
//!
//! Tool invocation errors, the classified refresh failures surfaced to
//! callers, and the retry driver used when the workspace is busy.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::refresh::RefreshResult;

/// Errors raised at the external tool boundary
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be started at all
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool reported that the named object does not exist
    #[error("`{command}` reported a missing object: {message}")]
    NotFound { command: String, message: String },

    /// The tool reported that the object is already there
    #[error("`{command}` reported an existing object: {message}")]
    AlreadyExists { command: String, message: String },

    /// Non-zero exit with no more specific signature
    #[error("`{command}` exited with status {status}: {message}")]
    Abnormal {
        command: String,
        status: i32,
        message: String,
    },
}

impl ToolError {
    /// Raw diagnostic text, if the tool ran and produced one
    pub fn message(&self) -> Option<&str> {
        match self {
            ToolError::Launch { .. } => None,
            ToolError::NotFound { message, .. }
            | ToolError::AlreadyExists { message, .. }
            | ToolError::Abnormal { message, .. } => Some(message),
        }
    }

    /// True when the command never ran; such errors are never classified
    pub fn is_invocation_failure(&self) -> bool {
        matches!(self, ToolError::Launch { .. })
    }
}

/// Classified failure of the config-spec reset or the update itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshFailure {
    /// Another workspace is rebasing the stream; try again shortly
    Busy { stream: String },

    /// Anything else, kept verbatim
    Unknown { message: String },
}

impl RefreshFailure {
    /// Busy is transient resource contention
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefreshFailure::Busy { .. })
    }

    /// Operator hints for this failure
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            RefreshFailure::Busy { stream } => vec![
                format!("Stream {} is being rebased by another workspace", stream),
                "Try again shortly".to_string(),
            ],
            RefreshFailure::Unknown { .. } => vec![
                "Inspect the raw cleartool output above".to_string(),
                "Check that the workspace path is a valid snapshot view".to_string(),
            ],
        }
    }

    /// Multi-line report with the raw diagnostic attached
    pub fn display(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let RefreshFailure::Unknown { message } = self {
            output.push_str("\nRaw output:\n");
            for line in message.lines() {
                output.push_str(&format!("   {}\n", line));
            }
        }

        output.push_str("\nSuggestions:\n");
        for suggestion in self.suggestions() {
            output.push_str(&format!("   • {}\n", suggestion));
        }

        output
    }
}

impl std::fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshFailure::Busy { stream } => {
                write!(f, "workspace is busy: stream {} is being rebased", stream)
            }
            RefreshFailure::Unknown { message } => {
                let first = message.lines().next().unwrap_or("").trim();
                write!(f, "refresh failed: {}", first)
            }
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a no-retry policy
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Create an aggressive retry policy
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Re-run a refresh while it reports a busy workspace.
///
/// Errors and non-busy results are returned from the attempt that produced
/// them. After the last attempt the busy result itself is returned.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<RefreshResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RefreshResult>>,
{
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;

        let result = attempt().await?;
        let busy = result.failure.as_ref().is_some_and(RefreshFailure::is_retryable);

        if !busy || attempts >= policy.max_attempts {
            return Ok(result);
        }

        tracing::warn!(
            "Attempt {}/{} found the workspace busy: {}. Retrying in {:?}",
            attempts,
            policy.max_attempts,
            result.failure.as_ref().map(ToString::to_string).unwrap_or_default(),
            delay
        );

        sleep(delay).await;

        // Exponential backoff; a nonsensical multiplier keeps the delay flat
        let multiplier = if policy.backoff_multiplier.is_finite() {
            policy.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        delay = Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier)
            .unwrap_or(policy.max_delay)
            .min(policy.max_delay);
    }
}
