//! Transient overlay handling.
//!
//! A [`PopupRegistry`] lists the overlays an app is known to show. The
//! [`PopupStabilizer`] walks the registry each cycle, dismisses whatever it
//! finds and only reports the screen as stable once a full cycle finds
//! nothing.

use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::locator::Lookup;
use crate::result::{ProbeError, ProbeResult};
use crate::target::UiTarget;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

/// A known overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupSpec {
    /// Registry name
    pub name: String,
    /// Present while the overlay is showing
    pub detect: UiTarget,
    /// Control that closes it
    pub dismiss: UiTarget,
    /// Taps allowed before giving up
    #[serde(default = "default_dismiss_attempts")]
    pub max_dismiss_attempts: u32,
}

const fn default_dismiss_attempts() -> u32 {
    2
}

impl PopupSpec {
    /// Create a spec with the default dismiss budget
    #[must_use]
    pub fn new(name: impl Into<String>, detect: UiTarget, dismiss: UiTarget) -> Self {
        Self {
            name: name.into(),
            detect,
            dismiss,
            max_dismiss_attempts: default_dismiss_attempts(),
        }
    }

    /// Set the dismiss budget
    #[must_use]
    pub const fn with_max_dismiss_attempts(mut self, attempts: u32) -> Self {
        self.max_dismiss_attempts = attempts;
        self
    }
}

/// Ordered set of known overlays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopupRegistry {
    popups: Vec<PopupSpec>,
}

impl PopupRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a popup, replacing any existing entry with the same name
    #[must_use]
    pub fn with(mut self, spec: PopupSpec) -> Self {
        self.register(spec);
        self
    }

    /// Add a popup, replacing any existing entry with the same name
    pub fn register(&mut self, spec: PopupSpec) {
        match self.popups.iter_mut().find(|p| p.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.popups.push(spec),
        }
    }

    /// Add every popup of `other`
    pub fn extend(&mut self, other: impl IntoIterator<Item = PopupSpec>) {
        for spec in other {
            self.register(spec);
        }
    }

    /// Entries in check order
    pub fn iter(&self) -> impl Iterator<Item = &PopupSpec> {
        self.popups.iter()
    }

    /// Look up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PopupSpec> {
        self.popups.iter().find(|p| p.name == name)
    }

    /// Registered names
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.popups.iter().map(|p| p.name.as_str()).collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.popups.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.popups.is_empty()
    }
}

impl IntoIterator for PopupRegistry {
    type Item = PopupSpec;
    type IntoIter = std::vec::IntoIter<PopupSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.popups.into_iter()
    }
}

/// Observed screen state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupState {
    /// No registered overlay detected
    Stable,
    /// The named overlay is showing
    PopupPresent(String),
}

/// What a stabilization pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizeReport {
    /// Names of dismissed overlays, in order
    pub dismissed: Vec<String>,
    /// Detection cycles run, the final clean one included
    pub cycles: u32,
    /// Dismiss taps made
    pub taps: u32,
}

impl StabilizeReport {
    /// Whether the screen was already stable
    #[must_use]
    pub fn was_clean(&self) -> bool {
        self.dismissed.is_empty()
    }
}

/// Detects and dismisses overlays until the screen is stable
#[derive(Debug, Clone)]
pub struct PopupStabilizer {
    registry: PopupRegistry,
    /// Probe timeout per detection target
    pub detect_timeout: Duration,
    /// Time allowed to find the dismiss control
    pub dismiss_timeout: Duration,
    /// Time allowed for the overlay to disappear after a tap
    pub settle_window: Duration,
    /// Cycles allowed before the screen counts as unstable
    pub max_cycles: u32,
}

impl PopupStabilizer {
    /// Create a stabilizer with default timing
    #[must_use]
    pub const fn new(registry: PopupRegistry) -> Self {
        Self {
            registry,
            detect_timeout: Duration::ZERO,
            dismiss_timeout: Duration::from_secs(2),
            settle_window: Duration::from_secs(2),
            max_cycles: 5,
        }
    }

    /// Set the detection probe timeout
    #[must_use]
    pub const fn with_detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    /// Set the dismiss-control timeout
    #[must_use]
    pub const fn with_dismiss_timeout(mut self, timeout: Duration) -> Self {
        self.dismiss_timeout = timeout;
        self
    }

    /// Set the settle window
    #[must_use]
    pub const fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// Set the cycle bound
    #[must_use]
    pub const fn with_max_cycles(mut self, cycles: u32) -> Self {
        self.max_cycles = cycles;
        self
    }

    /// The registry consulted
    #[must_use]
    pub const fn registry(&self) -> &PopupRegistry {
        &self.registry
    }

    /// One detection pass without dismissing anything
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn observe<D: DeviceSession>(&self, ctx: &mut DeviceContext<D>) -> ProbeResult<PopupState> {
        for spec in self.registry.iter() {
            if ctx.resolve(&spec.detect, self.detect_timeout)?.is_found() {
                return Ok(PopupState::PopupPresent(spec.name.clone()));
            }
        }
        Ok(PopupState::Stable)
    }

    /// Dismiss overlays until one full cycle detects none.
    ///
    /// # Errors
    ///
    /// Returns `UndismissablePopup` when an overlay cannot be closed,
    /// `UnstableScreen` when overlays keep appearing past `max_cycles`, and
    /// transport errors
    pub fn stabilize<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
    ) -> ProbeResult<StabilizeReport> {
        let _span = info_span!("stabilize", popups = self.registry.len()).entered();
        let mut report = StabilizeReport::default();

        for cycle in 1..=self.max_cycles {
            report.cycles = cycle;
            let mut seen = false;
            for spec in self.registry.iter() {
                if !ctx.resolve(&spec.detect, self.detect_timeout)?.is_found() {
                    continue;
                }
                seen = true;
                info!(popup = %spec.name, cycle, "popup present");
                report.taps += self.dismiss(ctx, spec)?;
                report.dismissed.push(spec.name.clone());
            }
            if !seen {
                debug!(cycle, "screen stable");
                return Ok(report);
            }
        }

        warn!(cycles = self.max_cycles, dismissed = ?report.dismissed, "popups keep appearing");
        Err(ProbeError::UnstableScreen {
            cycles: self.max_cycles,
        })
    }

    fn dismiss<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        spec: &PopupSpec,
    ) -> ProbeResult<u32> {
        let mut taps = 0;
        for attempt in 1..=spec.max_dismiss_attempts {
            let Lookup::Found(handle) = ctx.resolve(&spec.dismiss, self.dismiss_timeout)? else {
                if !ctx.is_present(&spec.detect)? {
                    debug!(popup = %spec.name, "popup closed by itself");
                    return Ok(taps);
                }
                return Err(ProbeError::UndismissablePopup {
                    popup: spec.name.clone(),
                    reason: format!("dismiss control {} not found", spec.dismiss),
                });
            };
            ctx.tap_handle(&handle)?;
            taps += 1;
            if self.wait_until_gone(ctx, &spec.detect)? {
                info!(popup = %spec.name, attempt, "popup dismissed");
                return Ok(taps);
            }
            warn!(popup = %spec.name, attempt, "popup still present after tap");
        }
        Err(ProbeError::UndismissablePopup {
            popup: spec.name.clone(),
            reason: format!(
                "still present after {} dismiss attempt(s)",
                spec.max_dismiss_attempts
            ),
        })
    }

    fn wait_until_gone<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        detect: &UiTarget,
    ) -> ProbeResult<bool> {
        let start = ctx.clock().now();
        let interval = ctx.locator().poll_interval;
        loop {
            if !ctx.is_present(detect)? {
                return Ok(true);
            }
            let waited = ctx.clock().now().saturating_sub(start);
            if waited >= self.settle_window {
                return Ok(false);
            }
            ctx.sleep(interval.min(self.settle_window - waited));
        }
    }
}
