//! [`DeviceSession`] over the `adb` executable.
//!
//! Each call shells out once (twice for a tree dump). Argument lists are
//! built by pure functions so they can be checked without a device.

use crate::device::{DeviceSession, Key};
use crate::result::{ProbeError, ProbeResult};
use crate::tree::{Point, Size};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, trace};

/// On-device path used for hierarchy dumps
pub const DUMP_PATH: &str = "/sdcard/window_dump.xml";

/// A device reached through `adb`
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: PathBuf,
    serial: Option<String>,
}

impl AdbDevice {
    /// Talk to `serial` (or the only attached device) through `adb`
    #[must_use]
    pub fn new(adb: impl Into<PathBuf>, serial: Option<String>) -> Self {
        Self {
            adb: adb.into(),
            serial,
        }
    }

    /// Device serial, if pinned
    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Full argument list for one adb invocation
    #[must_use]
    pub fn command_args(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.iter().cloned());
        full
    }

    fn run(&self, args: &[String]) -> ProbeResult<Vec<u8>> {
        let full = self.command_args(args);
        trace!(adb = %self.adb.display(), args = ?full, "adb");
        let output = Command::new(&self.adb)
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                ProbeError::transport(format!("failed to execute {}: {e}", self.adb.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::transport(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn run_text(&self, args: &[String]) -> ProbeResult<String> {
        self.run(args)
            .map(|out| String::from_utf8_lossy(&out).into_owned())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

/// `input tap` arguments
#[must_use]
pub fn tap_args(point: Point) -> Vec<String> {
    vec![
        "shell".into(),
        "input".into(),
        "tap".into(),
        point.x.to_string(),
        point.y.to_string(),
    ]
}

/// `input swipe` arguments
#[must_use]
pub fn swipe_args(from: Point, to: Point, duration: Duration) -> Vec<String> {
    vec![
        "shell".into(),
        "input".into(),
        "swipe".into(),
        from.x.to_string(),
        from.y.to_string(),
        to.x.to_string(),
        to.y.to_string(),
        duration.as_millis().to_string(),
    ]
}

/// `input text` arguments
#[must_use]
pub fn text_args(text: &str) -> Vec<String> {
    vec![
        "shell".into(),
        "input".into(),
        "text".into(),
        escape_input_text(text),
    ]
}

/// `input keyevent` arguments
#[must_use]
pub fn key_args(key: Key) -> Vec<String> {
    vec![
        "shell".into(),
        "input".into(),
        "keyevent".into(),
        key.keycode().to_string(),
    ]
}

/// `input keyevent` arguments that move to the end of the field and delete
/// `chars` characters, in one call
#[must_use]
pub fn clear_args(chars: usize) -> Vec<String> {
    let mut args = key_args(Key::MoveEnd);
    let delete = Key::Delete.keycode().to_string();
    args.extend(std::iter::repeat(delete).take(chars));
    args
}

/// Escape text for `input text` through the remote shell.
///
/// `input` reads `%s` as a space; shell metacharacters get a backslash.
#[must_use]
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\\' | '"' | '\'' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*'
            | '~' | '#' | '?' | '!' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Package of the focused window in `dumpsys window` output
///
/// # Errors
///
/// Returns a parse error when no focused window is listed
pub fn parse_foreground(dumpsys: &str) -> ProbeResult<String> {
    let patterns = [
        r"mCurrentFocus=Window\{\S+ \S+ ([A-Za-z0-9_.]+)[/}]",
        r"mFocusedApp=\S*ActivityRecord\{\S+ \S+ ([A-Za-z0-9_.]+)/",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).map_err(|e| ProbeError::parse(e.to_string()))?;
        if let Some(caps) = re.captures(dumpsys) {
            return Ok(caps[1].to_string());
        }
    }
    Err(ProbeError::parse("no focused window in dumpsys output"))
}

/// Screen size from `wm size` output, preferring an override
///
/// # Errors
///
/// Returns a parse error when no size is listed
pub fn parse_wm_size(output: &str) -> ProbeResult<Size> {
    let re = Regex::new(r"(Physical|Override) size: (\d+)x(\d+)")
        .map_err(|e| ProbeError::parse(e.to_string()))?;
    let mut physical = None;
    for caps in re.captures_iter(output) {
        let (Ok(w), Ok(h)) = (caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        let size = Size::new(w, h);
        if &caps[1] == "Override" {
            return Ok(size);
        }
        physical = Some(size);
    }
    physical.ok_or_else(|| ProbeError::parse(format!("no size in wm output: {}", output.trim())))
}

impl DeviceSession for AdbDevice {
    fn dump_tree(&mut self) -> ProbeResult<String> {
        let status = self.run_text(&strings(&["shell", "uiautomator", "dump", DUMP_PATH]))?;
        if status.contains("ERROR") {
            return Err(ProbeError::transport(format!(
                "uiautomator dump failed: {}",
                status.trim()
            )));
        }
        let xml = self.run_text(&strings(&["exec-out", "cat", DUMP_PATH]))?;
        debug!(bytes = xml.len(), "dumped hierarchy");
        Ok(xml)
    }

    fn tap(&mut self, point: Point) -> ProbeResult<()> {
        self.run(&tap_args(point)).map(|_| ())
    }

    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> ProbeResult<()> {
        self.run(&swipe_args(from, to, duration)).map(|_| ())
    }

    fn type_text(&mut self, text: &str) -> ProbeResult<()> {
        self.run(&text_args(text)).map(|_| ())
    }

    fn press_key(&mut self, key: Key) -> ProbeResult<()> {
        self.run(&key_args(key)).map(|_| ())
    }

    fn clear_text(&mut self, chars: usize) -> ProbeResult<()> {
        self.run(&clear_args(chars)).map(|_| ())
    }

    fn screenshot(&mut self, path: &Path) -> ProbeResult<()> {
        let png = self.run(&strings(&["exec-out", "screencap", "-p"]))?;
        if png.is_empty() {
            return Err(ProbeError::transport("screencap returned no data"));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, png)?;
        Ok(())
    }

    fn current_foreground_app(&mut self) -> ProbeResult<String> {
        let out = self.run_text(&strings(&["shell", "dumpsys", "window"]))?;
        parse_foreground(&out)
    }

    fn screen_size(&mut self) -> ProbeResult<Size> {
        let out = self.run_text(&strings(&["shell", "wm", "size"]))?;
        parse_wm_size(&out)
    }
}
