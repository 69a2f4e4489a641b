//! Screenshot bookkeeping.
//!
//! Files are laid out as `<root>/<test>/<NN>_<step>.png`, with a counter per
//! test so captures sort in the order they were taken.

use crate::result::ProbeResult;
use std::path::{Path, PathBuf};

/// Names and remembers screenshots for the running test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
    test: String,
    counter: u32,
    captured: Vec<PathBuf>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new("artifacts")
    }
}

impl ArtifactStore {
    /// Store rooted at `root`
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            test: "session".to_string(),
            counter: 0,
            captured: Vec::new(),
        }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the current test
    #[must_use]
    pub fn test(&self) -> &str {
        &self.test
    }

    /// Start naming files for `test`; resets the counter and the captured list
    pub fn begin_test(&mut self, test: &str) {
        self.test = sanitize(test);
        self.counter = 0;
        self.captured.clear();
    }

    /// Path for the next capture of `step`, creating its directory
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created
    pub fn next_path(&mut self, step: &str) -> ProbeResult<PathBuf> {
        self.counter += 1;
        let dir = self.root.join(&self.test);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{:02}_{}.png", self.counter, sanitize(step))))
    }

    /// Remember a written artifact
    pub fn record(&mut self, path: PathBuf) {
        self.captured.push(path);
    }

    /// Artifacts captured for the current test
    #[must_use]
    pub fn captured(&self) -> &[PathBuf] {
        &self.captured
    }

    /// Take the captured list, leaving it empty
    pub fn take_captured(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.captured)
    }
}

/// File-system-safe form of a test or step name
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "step".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Login: wrong password!"), "login_wrong_password");
        assert_eq!(sanitize("  day-tab / Tue  "), "day-tab_tue");
        assert_eq!(sanitize("???"), "step");
    }

    #[test]
    fn test_paths_count_per_test() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        store.begin_test("test_login");
        let first = store.next_path("form").unwrap();
        let second = store.next_path("after submit").unwrap();
        assert_eq!(first, dir.path().join("test_login/01_form.png"));
        assert_eq!(second, dir.path().join("test_login/02_after_submit.png"));
        assert!(dir.path().join("test_login").is_dir());

        store.begin_test("Events Tab");
        assert_eq!(
            store.next_path("open").unwrap(),
            dir.path().join("events_tab/01_open.png")
        );
    }

    #[test]
    fn test_captured_list() {
        let mut store = ArtifactStore::new("unused");
        store.record(PathBuf::from("a.png"));
        store.record(PathBuf::from("b.png"));
        assert_eq!(store.captured().len(), 2);
        assert_eq!(store.take_captured().len(), 2);
        assert!(store.captured().is_empty());
    }
}
