//! Result and error types for droidprobe.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for droidprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Coarse classification of a [`ProbeError`].
///
/// Retry policies whitelist kinds rather than concrete errors, so a policy can
/// be written once and shared by many call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A target was required but did not resolve
    NotFound,
    /// The device session is unreachable or a command failed
    Transport,
    /// A bounded wait ran out
    Timeout,
    /// A handle was used after the screen may have changed
    StaleHandle,
    /// An overlay could not be cleared
    Popup,
    /// Login did not succeed within its attempt budget
    Authentication,
    /// A UI assertion did not hold
    Assertion,
    /// Invalid configuration
    Config,
    /// Malformed tree dump or structural path
    Parse,
    /// Local filesystem error
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::StaleHandle => "stale_handle",
            Self::Popup => "popup",
            Self::Authentication => "authentication",
            Self::Assertion => "assertion",
            Self::Config => "config",
            Self::Parse => "parse",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in droidprobe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The device session failed (adb missing, device offline, command error)
    #[error("Device transport failed: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// A target that the caller required did not resolve in time
    #[error("Element not found: {target} (waited {waited:?})")]
    ElementNotFound {
        /// Description of the target
        target: String,
        /// Time spent polling
        waited: Duration,
    },

    /// A bounded wait ran out
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout {
        /// What was waited for
        what: String,
        /// Time spent waiting
        waited: Duration,
    },

    /// A handle was acted on after a suspension point
    #[error("Stale handle for {target}: resolved at epoch {resolved_at}, context is at epoch {current}")]
    StaleHandle {
        /// Description of the target the handle came from
        target: String,
        /// Epoch at resolution time
        resolved_at: u64,
        /// Current context epoch
        current: u64,
    },

    /// An overlay was detected but could not be dismissed
    #[error("Popup '{popup}' could not be dismissed: {reason}")]
    UndismissablePopup {
        /// Registry name of the popup
        popup: String,
        /// Why dismissal failed
        reason: String,
    },

    /// Overlays kept appearing past the cycle budget
    #[error("Screen did not stabilize after {cycles} popup cycles")]
    UnstableScreen {
        /// Number of full detection cycles performed
        cycles: u32,
    },

    /// Login did not reach a success landmark
    #[error("Authentication failed after {attempts} attempt(s): {reason}")]
    AuthenticationFailed {
        /// Submit attempts made
        attempts: u32,
        /// Last observed failure
        reason: String,
    },

    /// A UI assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Malformed hierarchy dump or structural path
    #[error("Parse error: {message}")]
    Parse {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an assertion error
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::ElementNotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::StaleHandle { .. } => ErrorKind::StaleHandle,
            Self::UndismissablePopup { .. } | Self::UnstableScreen { .. } => ErrorKind::Popup,
            Self::AuthenticationFailed { .. } => ErrorKind::Authentication,
            Self::AssertionFailed { .. } => ErrorKind::Assertion,
            Self::Config { .. } => ErrorKind::Config,
            Self::Parse { .. } | Self::Json(_) | Self::Yaml(_) => ErrorKind::Parse,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error ends the test regardless of retry policy
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Popup | ErrorKind::Authentication
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ProbeError::transport("offline").kind(), ErrorKind::Transport);
        assert_eq!(
            ProbeError::ElementNotFound {
                target: "Sign In".into(),
                waited: Duration::from_secs(1),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProbeError::UnstableScreen { cycles: 3 }.kind(),
            ErrorKind::Popup
        );
        assert_eq!(ProbeError::parse("bad").kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ProbeError::transport("x").is_fatal());
        assert!(ProbeError::AuthenticationFailed {
            attempts: 2,
            reason: "bad password".into(),
        }
        .is_fatal());
        assert!(!ProbeError::assertion("text differs").is_fatal());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ProbeError::UndismissablePopup {
            popup: "plans_upsell".into(),
            reason: "dismiss control missing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("plans_upsell"));
        assert!(msg.contains("dismiss control missing"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ProbeError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::StaleHandle.to_string(), "stale_handle");
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
