//! Multi-strategy element resolution with polling.
//!
//! [`ElementLocator::resolve`] re-reads the live tree on every poll and tries
//! the target's strategies in priority order (description, text, resource id,
//! structural). The first strategy with at least one match wins.
//!
//! Not finding an element is a value ([`Lookup::NotFound`]); only transport
//! and parse failures are errors.

use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::result::{ProbeError, ProbeResult};
use crate::target::{Strategy, UiTarget};
use crate::tree::{Element, Point, UiTree};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, debug_span, info};

/// Default lookup timeout (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default polling interval (400ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 400;

/// A resolved element, valid only within the epoch that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    /// The matched node
    pub element: Element,
    /// Strategy that produced the match
    pub strategy: Strategy,
    /// Context epoch at resolution time
    pub epoch: u64,
    /// Description of the target
    pub target: String,
}

impl Handle {
    /// Tap point (center of the bounds)
    #[must_use]
    pub const fn center(&self) -> Point {
        self.element.bounds.center()
    }

    /// Visible text of the matched node
    #[must_use]
    pub fn text(&self) -> &str {
        &self.element.text
    }
}

/// Result of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The target resolved
    Found(Handle),
    /// Nothing matched before the timeout
    NotFound {
        /// Description of the target
        target: String,
        /// Time spent polling
        waited: Duration,
        /// Number of tree reads
        polls: u32,
    },
}

impl Lookup {
    /// Whether the target resolved
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Borrow the handle if found
    #[must_use]
    pub const fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Found(handle) => Some(handle),
            Self::NotFound { .. } => None,
        }
    }

    /// Take the handle if found
    #[must_use]
    pub fn into_handle(self) -> Option<Handle> {
        match self {
            Self::Found(handle) => Some(handle),
            Self::NotFound { .. } => None,
        }
    }

    /// Convert a miss into [`ProbeError::ElementNotFound`]
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` when the lookup missed
    pub fn require(self) -> ProbeResult<Handle> {
        match self {
            Self::Found(handle) => Ok(handle),
            Self::NotFound { target, waited, .. } => {
                Err(ProbeError::ElementNotFound { target, waited })
            }
        }
    }
}

/// Polling options for resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLocator {
    /// Time between tree reads
    pub poll_interval: Duration,
    /// Timeout used when the caller does not give one
    pub default_timeout: Duration,
}

impl Default for ElementLocator {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ElementLocator {
    /// Create a locator with default timing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default timeout
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// All matches of the first strategy that matches anything, in document
    /// order. The target's index is ignored.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed structural paths
    pub fn matches(tree: &UiTree, target: &UiTarget) -> ProbeResult<Option<(Strategy, Vec<Element>)>> {
        for (strategy, predicates) in target.strategy_groups() {
            let mut hits: Vec<Element> = Vec::new();
            for predicate in predicates {
                for element in predicate.select(tree)? {
                    if !hits.iter().any(|h| h.index == element.index) {
                        hits.push(element);
                    }
                }
            }
            if !hits.is_empty() {
                hits.sort_by_key(|e| e.index);
                return Ok(Some((strategy, hits)));
            }
        }
        Ok(None)
    }

    /// Match `target` against one snapshot.
    ///
    /// Returns `None` when no strategy matches or when the winning strategy
    /// has fewer matches than the requested index.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed structural paths
    pub fn match_snapshot(
        tree: &UiTree,
        target: &UiTarget,
    ) -> ProbeResult<Option<(Element, Strategy)>> {
        let Some((strategy, hits)) = Self::matches(tree, target)? else {
            return Ok(None);
        };
        let wanted = target.index.unwrap_or(0);
        Ok(hits.into_iter().nth(wanted).map(|e| (e, strategy)))
    }

    /// Poll the live tree until `target` resolves or `timeout` elapses.
    ///
    /// A zero timeout reads the tree exactly once.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors from the device
    pub fn resolve<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        target: &UiTarget,
        timeout: Duration,
    ) -> ProbeResult<Lookup> {
        let _span = debug_span!("resolve", element = %target).entered();
        Ok(match self.poll(ctx, std::slice::from_ref(target), timeout)? {
            Poll::Hit(_, handle) => Lookup::Found(handle),
            Poll::Miss { waited, polls } => Lookup::NotFound {
                target: target.describe(),
                waited,
                polls,
            },
        })
    }

    /// Poll until any of `targets` resolves.
    ///
    /// Every poll reads one snapshot and checks the targets in slice order,
    /// so an earlier target wins when several are on screen together.
    /// Returns the index of the winner.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors from the device
    pub fn resolve_first<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        targets: &[UiTarget],
        timeout: Duration,
    ) -> ProbeResult<Option<(usize, Handle)>> {
        let _span = debug_span!("resolve_first", candidates = targets.len()).entered();
        Ok(match self.poll(ctx, targets, timeout)? {
            Poll::Hit(i, handle) => Some((i, handle)),
            Poll::Miss { .. } => None,
        })
    }

    fn poll<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        targets: &[UiTarget],
        timeout: Duration,
    ) -> ProbeResult<Poll> {
        let start = ctx.clock().now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let tree = ctx.snapshot()?;
            for (i, target) in targets.iter().enumerate() {
                if let Some((element, strategy)) = Self::match_snapshot(&tree, target)? {
                    let description = target.describe();
                    info!(%strategy, polls, label = element.label(), "resolved {description}");
                    return Ok(Poll::Hit(
                        i,
                        Handle {
                            element,
                            strategy,
                            epoch: ctx.epoch(),
                            target: description,
                        },
                    ));
                }
            }

            let waited = ctx.clock().now().saturating_sub(start);
            if waited >= timeout {
                debug!(polls, ?waited, "not found");
                return Ok(Poll::Miss { waited, polls });
            }
            debug!(poll = polls, "no match yet");
            ctx.sleep(self.poll_interval.min(timeout - waited));
        }
    }
}

enum Poll {
    Hit(usize, Handle),
    Miss { waited: Duration, polls: u32 },
}
