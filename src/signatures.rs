//! Recognised signatures in raw cleartool output
//!
//! The external tool has no structured error channel, so a handful of
//! decisions depend on matching its text. Every such pattern lives in this
//! module and nowhere else.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

use crate::error::RefreshFailure;

/// The view is in the middle of a rebase driven by another workspace.
static REBASING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)Error: This view is currently being used to rebase stream "([^"]+)""#)
        .expect("rebasing pattern")
});

/// Update writes a log file and reports where.
static CACHE_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ims)^\s*log has been written to\s*"(.*?)""#).expect("cache log pattern")
});

static ALREADY_EXISTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(Entry named ".*" already exists|already exists)"#)
        .expect("already exists pattern")
});

static NOT_FOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(does not exist|not found|unable to determine vob|not a vob object)")
        .expect("not found pattern")
});

/// `describe vob:<path>` on a directory that is not a vob. Access and
/// network errors must not match: a directory judged "not a vob" is
/// removed wholesale.
static NOT_A_VOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(unable to determine vob for pathname|not a vob object)")
        .expect("not a vob pattern")
});

/// What a failed tool invocation said about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSignal {
    NotFound,
    AlreadyExists,
    Other,
}

/// Classify the diagnostic of a non-zero cleartool exit.
pub fn tool_signal(message: &str) -> ToolSignal {
    if ALREADY_EXISTS.is_match(message) {
        ToolSignal::AlreadyExists
    } else if NOT_FOUND.is_match(message) {
        ToolSignal::NotFound
    } else {
        ToolSignal::Other
    }
}

/// True when a failed vob lookup says the path is simply not a vob.
pub fn is_not_a_vob(message: &str) -> bool {
    NOT_A_VOB.is_match(message)
}

/// Classify a failed `setcs` or `update`.
///
/// A rebase-in-progress message becomes [`RefreshFailure::Busy`] naming the
/// competing stream; anything else is [`RefreshFailure::Unknown`] with the
/// raw text kept verbatim.
pub fn classify_external_failure(message: &str) -> RefreshFailure {
    match REBASING.captures(message) {
        Some(caps) => RefreshFailure::Busy {
            stream: caps[1].to_string(),
        },
        None => RefreshFailure::Unknown {
            message: message.to_string(),
        },
    }
}

/// Pull the update log path out of successful update output, if reported.
pub fn cache_log_path(output: &str) -> Option<PathBuf> {
    CACHE_LOG
        .captures(output)
        .map(|caps| PathBuf::from(caps[1].trim()))
        .filter(|path| !path.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebasing_message_is_busy() {
        let msg = "cleartool: Error: This view is currently being used to rebase stream \"rel_2_int\".\ncleartool: Error: Unable to update.";
        assert_eq!(
            classify_external_failure(msg),
            RefreshFailure::Busy {
                stream: "rel_2_int".to_string()
            }
        );
    }

    #[test]
    fn other_messages_are_unknown_and_verbatim() {
        let msg = "cleartool: Error: Unable to access \"M:\\view\": No such file or directory.";
        match classify_external_failure(msg) {
            RefreshFailure::Unknown { message } => assert_eq!(message, msg),
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn cache_log_is_extracted() {
        let out = "Processing dir \"Model\".\n  Log has been written to \"C:\\views\\update.1234.updt\".\n";
        assert_eq!(
            cache_log_path(out),
            Some(PathBuf::from("C:\\views\\update.1234.updt"))
        );
        assert_eq!(cache_log_path("Done loading \"\\Model\" (12 objects)."), None);
    }

    #[test]
    fn tool_signals() {
        assert_eq!(
            tool_signal("cleartool: Error: Entry named \"foo.c\" already exists."),
            ToolSignal::AlreadyExists
        );
        assert_eq!(
            tool_signal("cleartool: Error: Stream \"stream:x@\\PVOB\" does not exist."),
            ToolSignal::NotFound
        );
        assert_eq!(tool_signal("cleartool: Error: license expired"), ToolSignal::Other);
        assert_eq!(
            tool_signal("cleartool: Error: Unable to access \"Model\": Connection timed out."),
            ToolSignal::Other
        );
    }

    #[test]
    fn not_a_vob_is_narrow() {
        assert!(is_not_a_vob(
            "cleartool: Error: Unable to determine VOB for pathname \"/views/dev/scratch\"."
        ));
        assert!(is_not_a_vob("cleartool: Error: Not a vob object: \"scratch\"."));
        assert!(!is_not_a_vob(
            "cleartool: Error: Unable to access \"Model\": Connection timed out."
        ));
        assert!(!is_not_a_vob("cleartool: Error: No such file or directory"));
    }
}
