//! Test outcomes and the JSON-lines outcome log.

use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::result::{ErrorKind, ProbeError, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Test result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test was skipped
    Skipped,
}

impl TestStatus {
    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// What the device looked like when a test failed.
///
/// Everything except `message` and `kind` is best effort: a dead transport
/// leaves those fields empty rather than masking the original error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Rendered error
    pub message: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Fingerprint of the last readable screen
    pub fingerprint: Option<String>,
    /// Outline of the last readable screen
    pub outline: Option<String>,
    /// Foreground package at failure time
    pub foreground_app: Option<String>,
}

impl FailureDetail {
    /// Detail carrying only the error
    #[must_use]
    pub fn from_error(err: &ProbeError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
            fingerprint: None,
            outline: None,
            foreground_app: None,
        }
    }

    /// Read the screen and foreground app to describe `err`
    pub fn capture<D: DeviceSession>(ctx: &mut DeviceContext<D>, err: &ProbeError) -> Self {
        let mut detail = Self::from_error(err);
        match ctx.snapshot() {
            Ok(tree) => {
                detail.fingerprint = Some(tree.fingerprint());
                detail.outline = Some(tree.outline());
            }
            Err(e) => debug!(error = %e, "no screen for failure detail"),
        }
        detail.foreground_app = ctx.foreground_app().ok();
        detail
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test name
    pub name: String,
    /// Final status
    pub status: TestStatus,
    /// Wall time spent in the test body
    #[serde(rename = "duration_ms", with = "crate::config::millis")]
    pub duration: Duration,
    /// Failure description, if failed
    pub failure: Option<FailureDetail>,
    /// Screenshots taken during the test
    pub screenshots: Vec<PathBuf>,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

impl TestOutcome {
    /// Create a passing outcome
    #[must_use]
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Passed,
            duration,
            failure: None,
            screenshots: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Create a failing outcome
    #[must_use]
    pub fn failed(name: impl Into<String>, duration: Duration, failure: FailureDetail) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Failed,
            duration,
            failure: Some(failure),
            screenshots: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Create a skipped outcome
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Skipped,
            duration: Duration::ZERO,
            failure: None,
            screenshots: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Attach screenshot paths
    #[must_use]
    pub fn with_screenshots(mut self, screenshots: Vec<PathBuf>) -> Self {
        self.screenshots = screenshots;
        self
    }
}

/// One line of the outcome log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Run the outcome belongs to
    pub run_id: Uuid,
    /// When the line was written
    pub recorded_at: DateTime<Utc>,
    /// The outcome itself
    #[serde(flatten)]
    pub outcome: TestOutcome,
}

/// Appends outcomes as JSON lines, tagged with a run id
#[derive(Debug)]
pub struct OutcomeLog {
    path: PathBuf,
    run_id: Uuid,
    file: File,
}

impl OutcomeLog {
    /// Open `path` for appending under a fresh run id
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file or its directory cannot be created
    pub fn open(path: impl AsRef<Path>) -> ProbeResult<Self> {
        Self::open_with_run_id(path, Uuid::new_v4())
    }

    /// Open `path` for appending under `run_id`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file or its directory cannot be created
    pub fn open_with_run_id(path: impl AsRef<Path>, run_id: Uuid) -> ProbeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), %run_id, "opened outcome log");
        Ok(Self { path, run_id, file })
    }

    /// Log file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run id stamped on every line
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append one outcome
    ///
    /// # Errors
    ///
    /// Returns JSON or I/O errors
    pub fn append(&mut self, outcome: &TestOutcome) -> ProbeResult<()> {
        let record = OutcomeRecord {
            run_id: self.run_id,
            recorded_at: Utc::now(),
            outcome: outcome.clone(),
        };
        let line = serde_json::to_string(&record)?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        if outcome.status.is_failed() {
            warn!(test = %outcome.name, "recorded failure");
        }
        Ok(())
    }

    /// Read every record from a log file, skipping blank lines
    ///
    /// # Errors
    ///
    /// Returns I/O errors, or a JSON error for a malformed line
    pub fn read(path: impl AsRef<Path>) -> ProbeResult<Vec<OutcomeRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
