//! tracing-subscriber setup

use crate::error::{CliError, CliResult};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter spec for a `-v` count. `RUST_LOG` wins when no `-v` is given.
#[must_use]
pub fn filter_spec(verbose: u8, rust_log: Option<&str>) -> String {
    let level = match verbose {
        0 => return rust_log.map_or_else(|| "warn".to_string(), ToString::to_string),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,droidprobe={level},droidprobe_cli={level}")
}

/// Install the global subscriber on stderr
///
/// # Errors
///
/// Returns an error if a subscriber is already installed
pub fn init(verbose: u8, json: bool) -> CliResult<()> {
    let spec = filter_spec(verbose, std::env::var("RUST_LOG").ok().as_deref());
    let filter = EnvFilter::new(spec);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_by_default() {
        assert_eq!(filter_spec(0, None), "warn");
    }

    #[test]
    fn test_rust_log_used_without_flags() {
        assert_eq!(filter_spec(0, Some("droidprobe=trace")), "droidprobe=trace");
    }

    #[test]
    fn test_verbose_overrides_rust_log() {
        assert_eq!(
            filter_spec(2, Some("error")),
            "warn,droidprobe=debug,droidprobe_cli=debug"
        );
        assert!(filter_spec(5, None).contains("droidprobe=trace"));
    }
}
