//! Device session seam.
//!
//! Everything the core does to a phone goes through [`DeviceSession`]. The
//! production implementation is [`crate::adb::AdbDevice`]; tests use
//! [`crate::mock::MockDevice`].

use crate::result::{ProbeError, ProbeResult};
use crate::target::Predicate;
use crate::tree::{Element, Point, Size, UiTree};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Hardware and navigation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Back navigation
    Back,
    /// Home screen
    Home,
    /// Enter / IME action
    Enter,
    /// Focus next field
    Tab,
    /// Delete the character before the cursor
    Delete,
    /// Recent apps
    AppSwitch,
    /// Search
    Search,
    /// Move the cursor to the end of the field
    MoveEnd,
}

impl Key {
    /// Android `KEYCODE_*` value
    #[must_use]
    pub const fn keycode(self) -> u32 {
        match self {
            Self::Home => 3,
            Self::Back => 4,
            Self::Tab => 61,
            Self::Enter => 66,
            Self::Delete => 67,
            Self::Search => 84,
            Self::MoveEnd => 123,
            Self::AppSwitch => 187,
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Back => "back",
            Self::Home => "home",
            Self::Enter => "enter",
            Self::Tab => "tab",
            Self::Delete => "delete",
            Self::AppSwitch => "app_switch",
            Self::Search => "search",
            Self::MoveEnd => "move_end",
        };
        f.write_str(name)
    }
}

impl FromStr for Key {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "back" => Ok(Self::Back),
            "home" => Ok(Self::Home),
            "enter" => Ok(Self::Enter),
            "tab" => Ok(Self::Tab),
            "delete" | "del" => Ok(Self::Delete),
            "app_switch" | "recents" => Ok(Self::AppSwitch),
            "search" => Ok(Self::Search),
            "move_end" | "end" => Ok(Self::MoveEnd),
            other => Err(ProbeError::parse(format!("unknown key '{other}'"))),
        }
    }
}

/// One exclusively-owned connection to a device.
///
/// All calls block. Implementations must be `Send` so a harness can move a
/// session to a worker thread; sessions are never shared.
pub trait DeviceSession: Send {
    /// Raw accessibility hierarchy of the current screen
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn dump_tree(&mut self) -> ProbeResult<String>;

    /// Parsed snapshot of the current screen
    ///
    /// # Errors
    ///
    /// Returns transport or parse errors
    fn snapshot(&mut self) -> ProbeResult<UiTree> {
        UiTree::parse(&self.dump_tree()?)
    }

    /// Elements on the current screen matching `predicate`
    ///
    /// # Errors
    ///
    /// Returns transport or parse errors
    fn query(&mut self, predicate: &Predicate) -> ProbeResult<Vec<Element>> {
        self.snapshot()?.find_all(predicate)
    }

    /// Tap a screen coordinate
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn tap(&mut self, point: Point) -> ProbeResult<()>;

    /// Swipe between two coordinates
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> ProbeResult<()>;

    /// Type into the focused field
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn type_text(&mut self, text: &str) -> ProbeResult<()>;

    /// Press a key
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn press_key(&mut self, key: Key) -> ProbeResult<()>;

    /// Erase `chars` characters from the focused field, starting at its end
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn clear_text(&mut self, chars: usize) -> ProbeResult<()> {
        self.press_key(Key::MoveEnd)?;
        for _ in 0..chars {
            self.press_key(Key::Delete)?;
        }
        Ok(())
    }

    /// Save a PNG screenshot to `path`
    ///
    /// # Errors
    ///
    /// Returns transport or I/O errors
    fn screenshot(&mut self, path: &Path) -> ProbeResult<()>;

    /// Package of the app in the foreground
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn current_foreground_app(&mut self) -> ProbeResult<String>;

    /// Screen size in pixels
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be reached
    fn screen_size(&mut self) -> ProbeResult<Size>;
}
