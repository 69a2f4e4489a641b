//! Error types for the CLI

use droidprobe::{ErrorKind, ProbeError};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// The command ran but its check did not hold (element absent, popup left)
    #[error("{message}")]
    Unsatisfied {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// droidprobe library error
    #[error("{0}")]
    Probe(#[from] ProbeError),

    /// Logging setup error
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unsatisfied-check error
    #[must_use]
    pub fn unsatisfied(message: impl Into<String>) -> Self {
        Self::Unsatisfied {
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// 1 for checks that did not hold, 2 for usage and configuration problems,
    /// 3 for device transport failures.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Unsatisfied { .. } => 1,
            Self::Config { .. } | Self::InvalidArgument { .. } | Self::Logging(_) => 2,
            Self::Probe(e) if e.kind() == ErrorKind::Transport => 3,
            Self::Probe(e) if e.kind() == ErrorKind::Config => 2,
            Self::Probe(_) | Self::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::unsatisfied("missing").exit_code(), 1);
        assert_eq!(CliError::config("bad").exit_code(), 2);
        assert_eq!(CliError::from(ProbeError::transport("offline")).exit_code(), 3);
        assert_eq!(CliError::from(ProbeError::config("bad yaml")).exit_code(), 2);
    }

    #[test]
    fn test_probe_error_display_is_unwrapped() {
        let err = CliError::from(ProbeError::transport("adb missing"));
        assert_eq!(err.to_string(), "Device transport failed: adb missing");
    }
}
