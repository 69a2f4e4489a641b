//! Scripted in-memory device for tests.
//!
//! [`MockDevice`] serves a current [`UiTree`] and changes it in response to
//! taps, keys and swipes:
//!
//! - tap rules match the nodes under the tap point against a predicate
//! - key rules fire on a specific key
//! - each swipe shows the next queued scroll frame (or nothing changes)
//! - a screen can be scheduled to appear after a number of tree reads
//!
//! Every call is recorded in a journal. [`MockDevice::disconnect`] makes all
//! calls fail with a transport error.

use crate::device::{DeviceSession, Key};
use crate::result::{ProbeError, ProbeResult};
use crate::target::Predicate;
use crate::tree::{Element, Point, Size, UiTree};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package reported as foreground unless changed
pub const DEFAULT_PACKAGE: &str = "com.eatvermont.app";

/// Minimal PNG written by [`MockDevice::screenshot`]
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// A recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Tree read
    DumpTree,
    /// Predicate query
    Query(Predicate),
    /// Tap
    Tap(Point),
    /// Swipe
    Swipe {
        /// Start point
        from: Point,
        /// End point
        to: Point,
        /// Gesture duration
        duration: Duration,
    },
    /// Text entry
    TypeText(String),
    /// Field cleared of this many characters
    ClearText(usize),
    /// Key press
    PressKey(Key),
    /// Screenshot
    Screenshot(PathBuf),
}

/// What a rule does to the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Show a different screen
    Replace(UiTree),
    /// Remove the nodes matched by the rule's own predicate
    RemoveMatching,
    /// Remove nodes matching another predicate
    Remove(Predicate),
    /// Leave the screen as it is
    Nothing,
}

#[derive(Debug, Clone)]
struct Rule<T> {
    trigger: T,
    reaction: Reaction,
    remaining: Option<u32>,
}

impl<T> Rule<T> {
    const fn is_live(&self) -> bool {
        !matches!(self.remaining, Some(0))
    }

    fn consume(&mut self) {
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
    }
}

/// In-memory [`DeviceSession`]
#[derive(Debug, Clone)]
pub struct MockDevice {
    screen: UiTree,
    size: Size,
    foreground: String,
    connected: bool,
    focused_input: Option<usize>,
    scroll_frames: VecDeque<UiTree>,
    scheduled: VecDeque<(u32, UiTree)>,
    tap_rules: Vec<Rule<Predicate>>,
    key_rules: Vec<Rule<Key>>,
    journal: Vec<Action>,
    dumps: u32,
}

impl MockDevice {
    /// Create a device showing `screen`
    #[must_use]
    pub fn new(screen: UiTree) -> Self {
        let size = screen
            .screen_bounds()
            .filter(|b| !b.is_empty())
            .map_or(Size::new(1080, 2340), |b| Size::new(b.width(), b.height()));
        Self {
            screen,
            size,
            foreground: DEFAULT_PACKAGE.to_string(),
            connected: true,
            focused_input: None,
            scroll_frames: VecDeque::new(),
            scheduled: VecDeque::new(),
            tap_rules: Vec::new(),
            key_rules: Vec::new(),
            journal: Vec::new(),
            dumps: 0,
        }
    }

    /// Override the reported screen size
    #[must_use]
    pub const fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// Override the foreground package
    pub fn set_foreground_app(&mut self, package: impl Into<String>) {
        self.foreground = package.into();
    }

    /// Current screen
    #[must_use]
    pub const fn screen(&self) -> &UiTree {
        &self.screen
    }

    /// Show a different screen
    pub fn set_screen(&mut self, screen: UiTree) {
        self.screen = screen;
        self.focused_input = None;
    }

    /// Queue a frame shown by the next swipe
    pub fn push_scroll_frame(&mut self, frame: UiTree) {
        self.scroll_frames.push_back(frame);
    }

    /// Show `screen` once `reads` more tree reads have been served
    pub fn queue_screen_after_dumps(&mut self, reads: u32, screen: UiTree) {
        self.scheduled.push_back((reads, screen));
    }

    /// React every time a node matching `predicate` is tapped
    pub fn on_tap(&mut self, predicate: Predicate, reaction: Reaction) {
        self.tap_rules.push(Rule {
            trigger: predicate,
            reaction,
            remaining: None,
        });
    }

    /// React to the first `times` taps on a node matching `predicate`
    pub fn on_tap_times(&mut self, predicate: Predicate, reaction: Reaction, times: u32) {
        self.tap_rules.push(Rule {
            trigger: predicate,
            reaction,
            remaining: Some(times),
        });
    }

    /// React every time `key` is pressed
    pub fn on_key(&mut self, key: Key, reaction: Reaction) {
        self.key_rules.push(Rule {
            trigger: key,
            reaction,
            remaining: None,
        });
    }

    /// Make every call fail with a transport error
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Undo [`Self::disconnect`]
    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Every recorded call in order
    #[must_use]
    pub fn journal(&self) -> &[Action] {
        &self.journal
    }

    /// Number of tree reads served
    #[must_use]
    pub const fn dump_count(&self) -> u32 {
        self.dumps
    }

    /// Tap points in order
    #[must_use]
    pub fn taps(&self) -> Vec<Point> {
        self.journal
            .iter()
            .filter_map(|a| match a {
                Action::Tap(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Number of taps
    #[must_use]
    pub fn tap_count(&self) -> usize {
        self.taps().len()
    }

    /// Number of swipes
    #[must_use]
    pub fn swipe_count(&self) -> usize {
        self.journal
            .iter()
            .filter(|a| matches!(a, Action::Swipe { .. }))
            .count()
    }

    /// Typed strings in order
    #[must_use]
    pub fn typed(&self) -> Vec<String> {
        self.journal
            .iter()
            .filter_map(|a| match a {
                Action::TypeText(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pressed keys in order
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.journal
            .iter()
            .filter_map(|a| match a {
                Action::PressKey(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    /// Taps whose point lies inside a node matching `predicate` on `screen`
    #[must_use]
    pub fn taps_on(&self, screen: &UiTree, predicate: &Predicate) -> usize {
        let targets: Vec<Element> = screen.find_all(predicate).unwrap_or_default();
        self.taps()
            .into_iter()
            .filter(|p| targets.iter().any(|e| e.bounds.contains(*p)))
            .count()
    }

    fn check_connected(&self) -> ProbeResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ProbeError::transport("mock device disconnected"))
        }
    }

    fn read(&mut self) -> ProbeResult<UiTree> {
        self.check_connected()?;
        if matches!(self.scheduled.front(), Some((0, _))) {
            if let Some((_, screen)) = self.scheduled.pop_front() {
                self.set_screen(screen);
            }
        }
        if let Some((reads, _)) = self.scheduled.front_mut() {
            *reads = reads.saturating_sub(1);
        }
        self.dumps += 1;
        Ok(self.screen.clone())
    }

    fn apply(&mut self, reaction: &Reaction, own: Option<&Predicate>) {
        let removing = match reaction {
            Reaction::Replace(screen) => {
                self.set_screen(screen.clone());
                return;
            }
            Reaction::Nothing => return,
            Reaction::RemoveMatching => own,
            Reaction::Remove(predicate) => Some(predicate),
        };
        if let Some(predicate) = removing {
            let doomed: Vec<usize> = self
                .screen
                .find_all(predicate)
                .unwrap_or_default()
                .iter()
                .map(|e| e.index)
                .collect();
            let kept = self.screen.retain(|e| !doomed.contains(&e.index));
            self.set_screen(kept);
        }
    }
}

impl DeviceSession for MockDevice {
    fn dump_tree(&mut self) -> ProbeResult<String> {
        let tree = self.read()?;
        self.journal.push(Action::DumpTree);
        Ok(tree.to_xml())
    }

    fn snapshot(&mut self) -> ProbeResult<UiTree> {
        let tree = self.read()?;
        self.journal.push(Action::DumpTree);
        Ok(tree)
    }

    fn query(&mut self, predicate: &Predicate) -> ProbeResult<Vec<Element>> {
        let tree = self.read()?;
        self.journal.push(Action::Query(predicate.clone()));
        tree.find_all(predicate)
    }

    fn tap(&mut self, point: Point) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::Tap(point));

        let hits = self.screen.hit_test(point);
        self.focused_input = hits
            .iter()
            .rev()
            .copied()
            .find(|&i| self.screen.get(i).is_some_and(|e| e.short_class() == "EditText"));

        let under: Vec<Element> = hits
            .iter()
            .filter_map(|&i| self.screen.get(i).cloned())
            .collect();
        let fired = self.tap_rules.iter().position(|rule| {
            rule.is_live() && under.iter().any(|e| rule.trigger.matches(e))
        });
        if let Some(i) = fired {
            self.tap_rules[i].consume();
            let rule = self.tap_rules[i].clone();
            self.apply(&rule.reaction, Some(&rule.trigger));
        }
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::Swipe { from, to, duration });
        if let Some(frame) = self.scroll_frames.pop_front() {
            self.set_screen(frame);
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::TypeText(text.to_string()));
        if let Some(index) = self.focused_input {
            let current = self.screen.get(index).map(|e| e.text.clone()).unwrap_or_default();
            self.screen.set_text(index, current + text);
        }
        Ok(())
    }

    fn clear_text(&mut self, chars: usize) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::ClearText(chars));
        if let Some(index) = self.focused_input {
            let current = self.screen.get(index).map(|e| e.text.clone()).unwrap_or_default();
            let kept = current.chars().count().saturating_sub(chars);
            self.screen.set_text(index, current.chars().take(kept).collect::<String>());
        }
        Ok(())
    }

    fn press_key(&mut self, key: Key) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::PressKey(key));
        let fired = self
            .key_rules
            .iter()
            .position(|rule| rule.is_live() && rule.trigger == key);
        if let Some(i) = fired {
            self.key_rules[i].consume();
            let reaction = self.key_rules[i].reaction.clone();
            self.apply(&reaction, None);
        }
        Ok(())
    }

    fn screenshot(&mut self, path: &Path) -> ProbeResult<()> {
        self.check_connected()?;
        self.journal.push(Action::Screenshot(path.to_path_buf()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, PNG_SIGNATURE)?;
        Ok(())
    }

    fn current_foreground_app(&mut self) -> ProbeResult<String> {
        self.check_connected()?;
        Ok(self.foreground.clone())
    }

    fn screen_size(&mut self) -> ProbeResult<Size> {
        self.check_connected()?;
        Ok(self.size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::UiNode;

    fn dialog() -> UiTree {
        UiTree::screen(
            Size::new(1080, 2340),
            [UiNode::widget("LinearLayout")
                .id("com.eatvermont.app:id/dialog")
                .bounds(0, 800, 1080, 1400)
                .children([
                    UiNode::text_view("Allow notifications?").bounds(40, 820, 1040, 900),
                    UiNode::button("Don't allow").bounds(40, 1200, 500, 1300),
                ])],
        )
    }

    #[test]
    fn test_remove_matching_on_tap() {
        let mut device = MockDevice::new(dialog());
        device.on_tap(
            Predicate::Text("Don't allow".into()),
            Reaction::Remove(Predicate::ResourceId("dialog".into())),
        );
        device.tap(Point::new(100, 1250)).unwrap();
        assert_eq!(device.screen().len(), 1);
    }

    #[test]
    fn test_tap_outside_does_nothing() {
        let mut device = MockDevice::new(dialog());
        device.on_tap(Predicate::Text("Don't allow".into()), Reaction::RemoveMatching);
        device.tap(Point::new(900, 100)).unwrap();
        assert_eq!(device.screen().len(), 4);
        assert_eq!(device.tap_count(), 1);
    }

    #[test]
    fn test_limited_rule_then_fallback() {
        let mut device = MockDevice::new(dialog());
        let gone = UiTree::screen(Size::new(1080, 2340), []);
        device.on_tap_times(Predicate::Text("Don't allow".into()), Reaction::Nothing, 1);
        device.on_tap(Predicate::Text("Don't allow".into()), Reaction::Replace(gone.clone()));
        device.tap(Point::new(100, 1250)).unwrap();
        assert_eq!(device.screen(), &dialog());
        device.tap(Point::new(100, 1250)).unwrap();
        assert_eq!(device.screen(), &gone);
    }

    #[test]
    fn test_scheduled_screen() {
        let mut device = MockDevice::new(UiTree::default());
        device.queue_screen_after_dumps(1, dialog());
        assert!(device.snapshot().unwrap().is_empty());
        assert_eq!(device.snapshot().unwrap().len(), 4);
        assert_eq!(device.dump_count(), 2);
    }

    #[test]
    fn test_typing_into_tapped_field() {
        let form = UiTree::screen(
            Size::new(1080, 2340),
            [UiNode::widget("EditText").id("email").bounds(0, 0, 1080, 100)],
        );
        let mut device = MockDevice::new(form);
        device.type_text("ignored").unwrap();
        device.tap(Point::new(10, 10)).unwrap();
        device.type_text("cook@").unwrap();
        device.type_text("example.com").unwrap();
        let field = &device.query(&Predicate::ResourceId("email".into())).unwrap()[0];
        assert_eq!(field.text, "cook@example.com");
    }

    #[test]
    fn test_dump_parses_back() {
        let mut device = MockDevice::new(dialog());
        let xml = device.dump_tree().unwrap();
        assert_eq!(UiTree::parse(&xml).unwrap(), dialog());
    }

    #[test]
    fn test_disconnect() {
        let mut device = MockDevice::new(dialog());
        device.disconnect();
        assert!(device.tap(Point::new(1, 1)).is_err());
        assert!(device.dump_tree().is_err());
        assert!(device.journal().is_empty());
        device.reconnect();
        assert!(device.screen_size().is_ok());
    }

    #[test]
    fn test_screenshot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots/01_login.png");
        let mut device = MockDevice::new(dialog());
        device.screenshot(&path).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(&PNG_SIGNATURE));
    }

    #[test]
    fn test_size_from_root_bounds() {
        let mut device = MockDevice::new(dialog());
        assert_eq!(device.screen_size().unwrap(), Size::new(1080, 2340));
        let mut sized = MockDevice::new(dialog()).with_size(Size::new(720, 1600));
        assert_eq!(sized.screen_size().unwrap(), Size::new(720, 1600));
    }
}
