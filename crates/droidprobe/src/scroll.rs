//! Scroll-until-visible search.
//!
//! Each iteration probes for the target first and only swipes when it is not
//! there. A [`ScrollPlan`] runs a coarse phase (large swipes to cover
//! distance) and, only if that fails, a fine phase (small swipes that do not
//! overshoot). If a swipe leaves the tree fingerprint unchanged the list has
//! hit its end and the search stops at once.

use crate::config::millis;
use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::locator::{Handle, Lookup};
use crate::result::{ProbeError, ProbeResult};
use crate::target::UiTarget;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, info_span};

/// Direction of travel through the content.
///
/// `Down` reveals content below, so the finger moves up the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Reveal content above
    Up,
    /// Reveal content below
    #[default]
    Down,
    /// Reveal content to the left
    Left,
    /// Reveal content to the right
    Right,
}

impl std::str::FromStr for Direction {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(ProbeError::parse(format!("unknown direction '{other}'"))),
        }
    }
}

/// One scroll phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollPolicy {
    /// Direction of travel
    pub direction: Direction,
    /// Finger start along the scroll axis, as a fraction of the screen.
    /// Given for `Down`/`Right`; mirrored for `Up`/`Left`.
    pub start_fraction: f64,
    /// Finger end along the scroll axis
    pub end_fraction: f64,
    /// Position on the other axis
    pub cross_fraction: f64,
    /// Gesture duration
    #[serde(rename = "swipe_duration_ms", with = "millis")]
    pub swipe_duration: Duration,
    /// Swipes allowed in this phase
    pub max_attempts: u32,
    /// Pause after each swipe
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    /// Timeout of the probe made before each swipe
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::coarse(Direction::Down)
    }
}

impl ScrollPolicy {
    /// Large swipes, up to 5
    #[must_use]
    pub const fn coarse(direction: Direction) -> Self {
        Self {
            direction,
            start_fraction: 0.8,
            end_fraction: 0.2,
            cross_fraction: 0.5,
            swipe_duration: Duration::from_millis(400),
            max_attempts: 5,
            settle_delay: Duration::from_millis(750),
            probe_timeout: Duration::from_millis(1000),
        }
    }

    /// Small swipes, up to 3
    #[must_use]
    pub const fn fine(direction: Direction) -> Self {
        Self {
            direction,
            start_fraction: 0.6,
            end_fraction: 0.45,
            cross_fraction: 0.5,
            swipe_duration: Duration::from_millis(300),
            max_attempts: 3,
            settle_delay: Duration::from_millis(750),
            probe_timeout: Duration::from_millis(1000),
        }
    }

    /// Set the swipe budget
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the probe timeout
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Gesture endpoints as screen fractions `(x, y)`
    #[must_use]
    pub fn gesture(&self) -> ((f64, f64), (f64, f64)) {
        let (s, e, c) = (self.start_fraction, self.end_fraction, self.cross_fraction);
        match self.direction {
            Direction::Down => ((c, s), (c, e)),
            Direction::Up => ((c, 1.0 - s), (c, 1.0 - e)),
            Direction::Right => ((s, c), (e, c)),
            Direction::Left => ((1.0 - s, c), (1.0 - e, c)),
        }
    }

    /// Validate fractions
    ///
    /// # Errors
    ///
    /// Returns a config error for fractions outside `0..=1` or a zero-length swipe
    pub fn validate(&self, name: &str) -> ProbeResult<()> {
        for (field, value) in [
            ("start_fraction", self.start_fraction),
            ("end_fraction", self.end_fraction),
            ("cross_fraction", self.cross_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProbeError::config(format!(
                    "{name}.{field} must be within 0..=1, got {value}"
                )));
            }
        }
        if (self.start_fraction - self.end_fraction).abs() < f64::EPSILON {
            return Err(ProbeError::config(format!(
                "{name}: start and end fractions are equal"
            )));
        }
        Ok(())
    }
}

/// Coarse phase plus optional fine phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollPlan {
    /// First phase
    pub coarse: ScrollPolicy,
    /// Second phase, run only if the first fails
    pub fine: Option<ScrollPolicy>,
}

impl Default for ScrollPlan {
    fn default() -> Self {
        Self::two_phase(Direction::Down)
    }
}

impl ScrollPlan {
    /// Default coarse-then-fine plan
    #[must_use]
    pub const fn two_phase(direction: Direction) -> Self {
        Self {
            coarse: ScrollPolicy::coarse(direction),
            fine: Some(ScrollPolicy::fine(direction)),
        }
    }

    /// Plan with a single phase
    #[must_use]
    pub const fn single(policy: ScrollPolicy) -> Self {
        Self {
            coarse: policy,
            fine: None,
        }
    }

    /// Same plan in another direction
    #[must_use]
    pub fn toward(mut self, direction: Direction) -> Self {
        self.coarse.direction = direction;
        if let Some(fine) = self.fine.as_mut() {
            fine.direction = direction;
        }
        self
    }

    /// Most swipes this plan can issue
    #[must_use]
    pub fn max_swipes(&self) -> u32 {
        self.coarse.max_attempts + self.fine.as_ref().map_or(0, |f| f.max_attempts)
    }
}

/// Why a search gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    /// Every phase used its swipe budget
    Budget,
    /// A swipe did not change the screen
    Boundary,
}

/// Result of a scroll search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// The target became resolvable
    Found {
        /// Handle from the successful probe
        handle: Handle,
        /// Swipes made in the coarse phase
        coarse_swipes: u32,
        /// Swipes made in the fine phase
        fine_swipes: u32,
    },
    /// The search gave up
    Exhausted {
        /// Why
        reason: ExhaustReason,
        /// Swipes made in the coarse phase
        coarse_swipes: u32,
        /// Swipes made in the fine phase
        fine_swipes: u32,
    },
}

impl ScrollOutcome {
    /// Whether the target was found
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// Handle, if found
    #[must_use]
    pub const fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Found { handle, .. } => Some(handle),
            Self::Exhausted { .. } => None,
        }
    }

    /// Total swipes made
    #[must_use]
    pub const fn swipes(&self) -> u32 {
        match self {
            Self::Found {
                coarse_swipes,
                fine_swipes,
                ..
            }
            | Self::Exhausted {
                coarse_swipes,
                fine_swipes,
                ..
            } => *coarse_swipes + *fine_swipes,
        }
    }

    /// Handle, or `ElementNotFound` naming the target
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the search was exhausted
    pub fn require(self, target: &UiTarget) -> ProbeResult<Handle> {
        match self {
            Self::Found { handle, .. } => Ok(handle),
            Self::Exhausted { reason, .. } => Err(ProbeError::ElementNotFound {
                target: format!("{} (scroll {reason:?})", target.describe()),
                waited: Duration::ZERO,
            }),
        }
    }
}

/// Scroll-until-visible search
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollSearch;

impl ScrollSearch {
    /// Search with a single phase
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn find_by_scrolling<D: DeviceSession>(
        ctx: &mut DeviceContext<D>,
        target: &UiTarget,
        policy: &ScrollPolicy,
    ) -> ProbeResult<ScrollOutcome> {
        Self::find(ctx, target, &ScrollPlan::single(policy.clone()))
    }

    /// Search with a coarse-then-fine plan
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors
    pub fn find<D: DeviceSession>(
        ctx: &mut DeviceContext<D>,
        target: &UiTarget,
        plan: &ScrollPlan,
    ) -> ProbeResult<ScrollOutcome> {
        let _span = info_span!("scroll_search", element = %target).entered();
        let mut swipes = [0u32; 2];
        let phases = std::iter::once(&plan.coarse).chain(plan.fine.as_ref());

        let mut last_probe = plan.coarse.probe_timeout;
        for (phase, policy) in phases.enumerate() {
            last_probe = policy.probe_timeout;
            for _ in 0..policy.max_attempts {
                if let Lookup::Found(handle) = ctx.resolve(target, policy.probe_timeout)? {
                    return Ok(found(handle, swipes));
                }

                let before = ctx.snapshot()?.fingerprint();
                let (from, to) = policy.gesture();
                ctx.swipe_fraction(from, to, policy.swipe_duration)?;
                swipes[phase] += 1;
                ctx.sleep(policy.settle_delay);
                let after = ctx.snapshot()?.fingerprint();
                debug!(phase, swipe = swipes[phase], changed = before != after, "swiped");

                if before == after {
                    info!(coarse = swipes[0], fine = swipes[1], "reached scroll boundary");
                    return Ok(ScrollOutcome::Exhausted {
                        reason: ExhaustReason::Boundary,
                        coarse_swipes: swipes[0],
                        fine_swipes: swipes[1],
                    });
                }
            }
        }

        if let Lookup::Found(handle) = ctx.resolve(target, last_probe)? {
            return Ok(found(handle, swipes));
        }
        info!(coarse = swipes[0], fine = swipes[1], "scroll budget exhausted");
        Ok(ScrollOutcome::Exhausted {
            reason: ExhaustReason::Budget,
            coarse_swipes: swipes[0],
            fine_swipes: swipes[1],
        })
    }
}

fn found(handle: Handle, swipes: [u32; 2]) -> ScrollOutcome {
    info!(coarse = swipes[0], fine = swipes[1], "found by scrolling");
    ScrollOutcome::Found {
        handle,
        coarse_swipes: swipes[0],
        fine_swipes: swipes[1],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mock::{Action, MockDevice};
    use crate::tree::{Size, UiNode, UiTree};

    fn page(n: usize) -> UiTree {
        UiTree::screen(
            Size::new(1080, 2340),
            [UiNode::text_view(format!("Row {n}")).bounds(0, 100, 1080, 200)],
        )
    }

    fn ctx_with_pages(pages: usize) -> DeviceContext<MockDevice> {
        let mut device = MockDevice::new(page(0));
        for n in 1..=pages {
            device.push_scroll_frame(page(n));
        }
        DeviceContext::new(device, FakeClock::shared())
    }

    mod policies {
        use super::*;

        #[test]
        fn test_gesture_mirrors_for_up() {
            let down = ScrollPolicy::coarse(Direction::Down).gesture();
            let up = ScrollPolicy::coarse(Direction::Up).gesture();
            assert_eq!(down, ((0.5, 0.8), (0.5, 0.2)));
            assert!((up.0 .1 - 0.2).abs() < 1e-9);
            assert!((up.1 .1 - 0.8).abs() < 1e-9);
        }

        #[test]
        fn test_horizontal_gesture() {
            let ((x0, y0), (x1, _)) = ScrollPolicy::fine(Direction::Right).gesture();
            assert!((y0 - 0.5).abs() < 1e-9);
            assert!(x0 > x1);
        }

        #[test]
        fn test_validate() {
            assert!(ScrollPolicy::default().validate("scroll.coarse").is_ok());
            let mut bad = ScrollPolicy::default();
            bad.end_fraction = 1.5;
            assert!(bad.validate("scroll.coarse").is_err());
            bad.end_fraction = bad.start_fraction;
            assert!(bad.validate("scroll.coarse").is_err());
        }

        #[test]
        fn test_plan_budget() {
            assert_eq!(ScrollPlan::default().max_swipes(), 8);
            assert_eq!(ScrollPlan::single(ScrollPolicy::fine(Direction::Down)).max_swipes(), 3);
        }

        #[test]
        fn test_direction_parse() {
            assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
            assert!("sideways".parse::<Direction>().is_err());
        }
    }

    mod searching {
        use super::*;

        #[test]
        fn test_found_without_swiping() {
            let mut ctx = ctx_with_pages(3);
            let outcome =
                ScrollSearch::find(&mut ctx, &UiTarget::text("Row 0"), &ScrollPlan::default()).unwrap();
            assert!(outcome.is_found());
            assert_eq!(outcome.swipes(), 0);
            assert_eq!(ctx.device().swipe_count(), 0);
        }

        #[test]
        fn test_found_after_two_coarse_swipes() {
            let mut ctx = ctx_with_pages(5);
            let outcome =
                ScrollSearch::find(&mut ctx, &UiTarget::text("Row 2"), &ScrollPlan::default()).unwrap();
            match outcome {
                ScrollOutcome::Found {
                    coarse_swipes,
                    fine_swipes,
                    ..
                } => {
                    assert_eq!((coarse_swipes, fine_swipes), (2, 0));
                }
                ScrollOutcome::Exhausted { .. } => panic!("expected Found"),
            }
        }

        #[test]
        fn test_fine_phase_after_coarse_budget() {
            let mut ctx = ctx_with_pages(10);
            let outcome =
                ScrollSearch::find(&mut ctx, &UiTarget::text("Row 6"), &ScrollPlan::default()).unwrap();
            match outcome {
                ScrollOutcome::Found {
                    coarse_swipes,
                    fine_swipes,
                    ..
                } => assert_eq!((coarse_swipes, fine_swipes), (5, 1)),
                ScrollOutcome::Exhausted { .. } => panic!("expected Found"),
            }
            let amplitudes: Vec<i32> = ctx
                .device()
                .journal()
                .iter()
                .filter_map(|a| match a {
                    Action::Swipe { from, to, .. } => Some(from.y - to.y),
                    _ => None,
                })
                .collect();
            assert_eq!(amplitudes.len(), 6);
            assert!(amplitudes[..5].iter().all(|&a| a == amplitudes[0]));
            assert!(amplitudes[5] < amplitudes[0]);
        }

        #[test]
        fn test_boundary_stops_immediately() {
            // content changes for two swipes, then the list ends
            let mut ctx = ctx_with_pages(2);
            let outcome =
                ScrollSearch::find(&mut ctx, &UiTarget::text("Row 9"), &ScrollPlan::default()).unwrap();
            assert_eq!(
                outcome,
                ScrollOutcome::Exhausted {
                    reason: ExhaustReason::Boundary,
                    coarse_swipes: 3,
                    fine_swipes: 0,
                }
            );
            assert_eq!(ctx.device().swipe_count(), 3);
        }

        #[test]
        fn test_budget_exhaustion_makes_final_probe() {
            let mut ctx = ctx_with_pages(50);
            let policy = ScrollPolicy::coarse(Direction::Down).with_max_attempts(4);
            let outcome =
                ScrollSearch::find_by_scrolling(&mut ctx, &UiTarget::text("Row 40"), &policy).unwrap();
            assert_eq!(
                outcome,
                ScrollOutcome::Exhausted {
                    reason: ExhaustReason::Budget,
                    coarse_swipes: 4,
                    fine_swipes: 0,
                }
            );
        }

        #[test]
        fn test_found_on_final_probe() {
            let mut ctx = ctx_with_pages(50);
            let policy = ScrollPolicy::coarse(Direction::Down).with_max_attempts(4);
            let outcome =
                ScrollSearch::find_by_scrolling(&mut ctx, &UiTarget::text("Row 4"), &policy).unwrap();
            assert!(outcome.is_found());
            assert_eq!(outcome.swipes(), 4);
        }

        #[test]
        fn test_require_on_exhausted() {
            let mut ctx = ctx_with_pages(0);
            let target = UiTarget::text("Row 1");
            let err = ScrollSearch::find(&mut ctx, &target, &ScrollPlan::default())
                .unwrap()
                .require(&target)
                .unwrap_err();
            assert_eq!(err.kind(), crate::result::ErrorKind::NotFound);
        }
    }
}
