//! YAML configuration.
//!
//! Every knob has a default, so an empty file (or no file) is a valid
//! configuration. Durations are written in milliseconds (`*_ms` keys).

use crate::auth::AuthSettings;
use crate::context::DEFAULT_SETTLE_DELAY_MS;
use crate::locator::{ElementLocator, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::popup::{PopupRegistry, PopupSpec, PopupStabilizer};
use crate::result::{ProbeError, ProbeResult};
use crate::retry::RetryPolicy;
use crate::scroll::ScrollPlan;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `device.serial`
pub const SERIAL_ENV: &str = "DROIDPROBE_SERIAL";
/// Overrides `device.adb_path`
pub const ADB_ENV: &str = "DROIDPROBE_ADB";
/// Overrides `artifacts.dir`
pub const ARTIFACTS_ENV: &str = "DROIDPROBE_ARTIFACTS";

/// Serde helper storing a [`Duration`] as whole milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds
    ///
    /// # Errors
    ///
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize from milliseconds
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Which device to talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// adb serial; `None` uses the only connected device
    pub serial: Option<String>,
    /// adb executable
    pub adb_path: String,
    /// Package of the app under test
    pub app_package: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: "adb".to_string(),
            app_package: "com.eatvermont.app".to_string(),
        }
    }
}

/// Polling and settle timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Time between tree reads
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Lookup timeout when none is given
    #[serde(rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Duration,
    /// Pause after gestures
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// Probe timeout per popup detection target
    #[serde(rename = "popup_detect_timeout_ms", with = "millis")]
    pub popup_detect_timeout: Duration,
    /// Time allowed to find a popup's dismiss control
    #[serde(rename = "popup_dismiss_timeout_ms", with = "millis")]
    pub popup_dismiss_timeout: Duration,
    /// Time allowed for a popup to disappear after a tap
    #[serde(rename = "popup_settle_ms", with = "millis")]
    pub popup_settle: Duration,
    /// Popup detection cycles before the screen counts as unstable
    pub max_popup_cycles: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            popup_detect_timeout: Duration::ZERO,
            popup_dismiss_timeout: Duration::from_secs(2),
            popup_settle: Duration::from_secs(2),
            max_popup_cycles: 5,
        }
    }
}

impl Timing {
    /// Locator built from these settings
    #[must_use]
    pub const fn locator(&self) -> ElementLocator {
        ElementLocator {
            poll_interval: self.poll_interval,
            default_timeout: self.default_timeout,
        }
    }

    /// Settle delay
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Popup stabilizer over `registry` using these settings
    #[must_use]
    pub const fn stabilizer(&self, registry: PopupRegistry) -> PopupStabilizer {
        PopupStabilizer::new(registry)
            .with_detect_timeout(self.popup_detect_timeout)
            .with_dismiss_timeout(self.popup_dismiss_timeout)
            .with_settle_window(self.popup_settle)
            .with_max_cycles(self.max_popup_cycles)
    }
}

/// Where artifacts go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Screenshot root
    pub dir: PathBuf,
    /// JSON-lines outcome log; `None` disables it
    pub outcome_log: Option<PathBuf>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            outcome_log: None,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Device selection
    pub device: DeviceSettings,
    /// Polling and settle timing
    pub timing: Timing,
    /// Scroll search plan
    pub scroll: ScrollPlan,
    /// Default retry policy
    pub retry: RetryPolicy,
    /// Login budgets
    pub auth: AuthSettings,
    /// Artifact locations
    pub artifacts: ArtifactSettings,
    /// Popups added to the built-in registry
    pub popups: Vec<PopupSpec>,
}

impl ProbeConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML and validate
    ///
    /// # Errors
    ///
    /// Returns YAML errors or validation failures
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    ///
    /// # Errors
    ///
    /// Returns I/O, YAML or validation errors
    pub fn load(path: &Path) -> ProbeResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns YAML errors
    pub fn to_yaml(&self) -> ProbeResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `DROIDPROBE_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides through an arbitrary variable lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(serial) = lookup(SERIAL_ENV) {
            self.device.serial = Some(serial);
        }
        if let Some(adb) = lookup(ADB_ENV) {
            self.device.adb_path = adb;
        }
        if let Some(dir) = lookup(ARTIFACTS_ENV) {
            self.artifacts.dir = PathBuf::from(dir);
        }
        self
    }

    /// Check budgets and fractions
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first bad field
    pub fn validate(&self) -> ProbeResult<()> {
        if self.timing.poll_interval.is_zero() {
            return Err(ProbeError::config("timing.poll_interval_ms must be positive"));
        }
        if self.timing.max_popup_cycles == 0 {
            return Err(ProbeError::config("timing.max_popup_cycles must be at least 1"));
        }
        self.scroll.coarse.validate("scroll.coarse")?;
        if self.scroll.coarse.max_attempts == 0 {
            return Err(ProbeError::config("scroll.coarse.max_attempts must be at least 1"));
        }
        if let Some(fine) = &self.scroll.fine {
            fine.validate("scroll.fine")?;
        }
        self.retry.validate()?;
        if self.auth.max_attempts == 0 {
            return Err(ProbeError::config("auth.max_attempts must be at least 1"));
        }
        if self.device.adb_path.trim().is_empty() {
            return Err(ProbeError::config("device.adb_path must not be empty"));
        }
        for popup in &self.popups {
            if popup.max_dismiss_attempts == 0 {
                return Err(ProbeError::config(format!(
                    "popup '{}' needs at least one dismiss attempt",
                    popup.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scroll::Direction;
    use std::collections::HashMap;

    mod loading {
        use super::*;

        #[test]
        fn test_empty_is_default() {
            assert_eq!(ProbeConfig::from_yaml_str("").unwrap(), ProbeConfig::default());
            assert_eq!(ProbeConfig::from_yaml_str("{}").unwrap(), ProbeConfig::default());
        }

        #[test]
        fn test_partial_override() {
            let config = ProbeConfig::from_yaml_str(
                "timing:\n  poll_interval_ms: 250\nscroll:\n  coarse:\n    direction: up\n    max_attempts: 7\n  fine: null\nauth:\n  max_attempts: 3\n",
            )
            .unwrap();
            assert_eq!(config.timing.poll_interval, Duration::from_millis(250));
            assert_eq!(config.timing.default_timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
            assert_eq!(config.scroll.coarse.direction, Direction::Up);
            assert_eq!(config.scroll.coarse.max_attempts, 7);
            assert!((config.scroll.coarse.start_fraction - 0.8).abs() < f64::EPSILON);
            assert!(config.scroll.fine.is_none());
            assert_eq!(config.auth.max_attempts, 3);
            assert_eq!(config.auth.race_timeout, Duration::from_secs(5));
        }

        #[test]
        fn test_yaml_round_trip() {
            let config = ProbeConfig::default();
            let yaml = config.to_yaml().unwrap();
            assert!(yaml.contains("poll_interval_ms: 400"));
            assert_eq!(ProbeConfig::from_yaml_str(&yaml).unwrap(), config);
        }

        #[test]
        fn test_load_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("droidprobe.yaml");
            std::fs::write(&path, "device:\n  serial: emulator-5554\n").unwrap();
            let config = ProbeConfig::load(&path).unwrap();
            assert_eq!(config.device.serial.as_deref(), Some("emulator-5554"));
            assert!(ProbeConfig::load(&dir.path().join("missing.yaml")).is_err());
        }

        #[test]
        fn test_unknown_type_is_error() {
            let err = ProbeConfig::from_yaml_str("timing:\n  poll_interval_ms: soon\n").unwrap_err();
            assert_eq!(err.kind(), crate::result::ErrorKind::Parse);
        }

        #[test]
        fn test_extra_popups() {
            let config = ProbeConfig::from_yaml_str(
                "popups:\n  - name: rate_app\n    detect:\n      predicates:\n        - text_contains: Enjoying\n    dismiss:\n      predicates:\n        - text: Not now\n",
            )
            .unwrap();
            assert_eq!(config.popups.len(), 1);
            assert_eq!(config.popups[0].name, "rate_app");
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn test_rejects_bad_values() {
            for yaml in [
                "timing:\n  poll_interval_ms: 0\n",
                "timing:\n  max_popup_cycles: 0\n",
                "scroll:\n  coarse:\n    end_fraction: 1.4\n",
                "scroll:\n  coarse:\n    max_attempts: 0\n",
                "retry:\n  backoff_multiplier: 0.5\n",
                "auth:\n  max_attempts: 0\n",
                "device:\n  adb_path: ''\n",
            ] {
                let err = ProbeConfig::from_yaml_str(yaml).unwrap_err();
                assert_eq!(err.kind(), crate::result::ErrorKind::Config, "{yaml}");
            }
        }
    }

    mod environment {
        use super::*;

        #[test]
        fn test_overrides() {
            let vars: HashMap<&str, &str> = [
                (SERIAL_ENV, "R58M123"),
                (ADB_ENV, "/opt/android/adb"),
                (ARTIFACTS_ENV, ""),
            ]
            .into_iter()
            .collect();
            let config = ProbeConfig::default()
                .with_overrides_from(|k| vars.get(k).map(ToString::to_string));
            assert_eq!(config.device.serial.as_deref(), Some("R58M123"));
            assert_eq!(config.device.adb_path, "/opt/android/adb");
            assert_eq!(config.artifacts.dir, PathBuf::from("artifacts"));
        }
    }
}
