//! Explicit per-test device context.
//!
//! A [`DeviceContext`] owns the device session, the clock, the locator
//! settings and the artifact store for one test. It also keeps the epoch
//! counter: every device write and every sleep advances it, and a
//! [`Handle`] resolved in an older epoch can no longer be acted on.

use crate::artifacts::ArtifactStore;
use crate::clock::SharedClock;
use crate::config::ProbeConfig;
use crate::device::{DeviceSession, Key};
use crate::locator::{ElementLocator, Handle, Lookup};
use crate::result::{ProbeError, ProbeResult};
use crate::retry::RetryPolicy;
use crate::target::{Predicate, UiTarget};
use crate::tree::{Element, Point, Size, UiTree};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Default pause after gestures (750ms)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 750;

/// Device session plus everything a test threads through the core
#[derive(Debug)]
pub struct DeviceContext<D: DeviceSession> {
    device: D,
    clock: SharedClock,
    locator: ElementLocator,
    settle_delay: Duration,
    epoch: u64,
    artifacts: ArtifactStore,
}

impl<D: DeviceSession> DeviceContext<D> {
    /// Create a context with default timing
    #[must_use]
    pub fn new(device: D, clock: SharedClock) -> Self {
        Self {
            device,
            clock,
            locator: ElementLocator::default(),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            epoch: 0,
            artifacts: ArtifactStore::default(),
        }
    }

    /// Create a context using the timing and artifact settings of `config`
    #[must_use]
    pub fn from_config(device: D, clock: SharedClock, config: &ProbeConfig) -> Self {
        Self::new(device, clock)
            .with_locator(config.timing.locator())
            .with_settle_delay(config.timing.settle_delay())
            .with_artifacts(ArtifactStore::new(&config.artifacts.dir))
    }

    /// Set locator timing
    #[must_use]
    pub const fn with_locator(mut self, locator: ElementLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the artifact store
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Borrow the device
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Borrow the device mutably.
    ///
    /// Direct access may change the screen, so this starts a new epoch.
    pub fn device_mut(&mut self) -> &mut D {
        self.advance_epoch();
        &mut self.device
    }

    /// Release the device
    pub fn into_device(self) -> D {
        self.device
    }

    /// The context clock
    #[must_use]
    pub const fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current epoch
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Locator timing
    #[must_use]
    pub const fn locator(&self) -> ElementLocator {
        self.locator
    }

    /// Settle delay used by [`Self::settle`]
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Artifact store
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Artifact store, mutably
    pub fn artifacts_mut(&mut self) -> &mut ArtifactStore {
        &mut self.artifacts
    }

    fn advance_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Read the live tree
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn snapshot(&mut self) -> ProbeResult<UiTree> {
        self.device.snapshot()
    }

    /// All elements matching `predicate` right now
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn query_all(&mut self, predicate: &Predicate) -> ProbeResult<Vec<Element>> {
        self.device.query(predicate)
    }

    /// Resolve `target`, polling for up to `timeout`
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn resolve(&mut self, target: &UiTarget, timeout: Duration) -> ProbeResult<Lookup> {
        let locator = self.locator;
        locator.resolve(self, target, timeout)
    }

    /// Resolve `target` with the default timeout
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn find(&mut self, target: &UiTarget) -> ProbeResult<Lookup> {
        let timeout = self.locator.default_timeout;
        self.resolve(target, timeout)
    }

    /// Whether `target` is on screen right now (single poll)
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn is_present(&mut self, target: &UiTarget) -> ProbeResult<bool> {
        Ok(self.resolve(target, Duration::ZERO)?.is_found())
    }

    /// Resolve `target` or fail with `ElementNotFound`
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` on a miss, plus transport and parse errors
    pub fn require(&mut self, target: &UiTarget, timeout: Duration) -> ProbeResult<Handle> {
        self.resolve(target, timeout)?.require()
    }

    /// Tap a previously resolved handle.
    ///
    /// # Errors
    ///
    /// Returns `StaleHandle` if anything happened since the handle was
    /// resolved, plus transport errors
    pub fn tap_handle(&mut self, handle: &Handle) -> ProbeResult<()> {
        if handle.epoch != self.epoch {
            warn!(element = %handle.target, resolved_at = handle.epoch, current = self.epoch, "stale handle");
            return Err(ProbeError::StaleHandle {
                target: handle.target.clone(),
                resolved_at: handle.epoch,
                current: self.epoch,
            });
        }
        debug!(element = %handle.target, point = ?handle.center(), "tap");
        self.tap(handle.center())
    }

    /// Re-resolve `target` and tap it immediately
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` on a miss, plus transport errors
    pub fn tap_target(&mut self, target: &UiTarget, timeout: Duration) -> ProbeResult<Handle> {
        let handle = self.require(target, timeout)?;
        self.tap_handle(&handle)?;
        Ok(handle)
    }

    /// Tap an input field, erase what it shows and type into it
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` on a miss, plus transport errors
    pub fn fill(&mut self, target: &UiTarget, text: &str, timeout: Duration) -> ProbeResult<()> {
        let handle = self.tap_target(target, timeout)?;
        let shown = handle.element.text.chars().count();
        if shown > 0 {
            self.clear_text(shown)?;
        }
        self.type_text(text)
    }

    /// Erase `chars` characters from the focused field
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn clear_text(&mut self, chars: usize) -> ProbeResult<()> {
        debug!(chars, "clear text");
        self.advance_epoch();
        self.device.clear_text(chars)
    }

    /// Tap a raw coordinate
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn tap(&mut self, point: Point) -> ProbeResult<()> {
        self.advance_epoch();
        self.device.tap(point)
    }

    /// Type into the focused field
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn type_text(&mut self, text: &str) -> ProbeResult<()> {
        self.advance_epoch();
        self.device.type_text(text)
    }

    /// Press a key
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn press_key(&mut self, key: Key) -> ProbeResult<()> {
        debug!(%key, "press key");
        self.advance_epoch();
        self.device.press_key(key)
    }

    /// Swipe between two coordinates
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> ProbeResult<()> {
        self.advance_epoch();
        self.device.swipe(from, to, duration)
    }

    /// Swipe between two points given as fractions of the screen
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn swipe_fraction(
        &mut self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> ProbeResult<()> {
        let size = self.screen_size()?;
        let (start, end) = (size.at_fraction(from.0, from.1), size.at_fraction(to.0, to.1));
        debug!(?start, ?end, ?duration, "swipe");
        self.swipe(start, end, duration)
    }

    /// Sleep through the context clock
    pub fn sleep(&mut self, duration: Duration) {
        self.advance_epoch();
        self.clock.sleep(duration);
    }

    /// Sleep for the settle delay
    pub fn settle(&mut self) {
        let delay = self.settle_delay;
        self.sleep(delay);
    }

    /// Screen size
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn screen_size(&mut self) -> ProbeResult<Size> {
        self.device.screen_size()
    }

    /// Foreground package
    ///
    /// # Errors
    ///
    /// Returns transport errors
    pub fn foreground_app(&mut self) -> ProbeResult<String> {
        self.device.current_foreground_app()
    }

    /// Save a screenshot for `step` in the artifact store
    ///
    /// # Errors
    ///
    /// Returns transport and I/O errors
    pub fn capture(&mut self, step: &str) -> ProbeResult<PathBuf> {
        let path = self.artifacts.next_path(step)?;
        self.device.screenshot(&path)?;
        self.artifacts.record(path.clone());
        debug!(path = %path.display(), "captured screenshot");
        Ok(path)
    }

    /// Run `op` under `policy`, sleeping through this context between attempts
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error
    pub fn with_retry<T>(
        &mut self,
        policy: &RetryPolicy,
        op: impl FnMut(&mut Self, u32) -> ProbeResult<T>,
    ) -> ProbeResult<T> {
        policy.drive(self, |ctx, delay| ctx.sleep(delay), op)
    }
}
