//! Polling assertions over live targets.
//!
//! ```ignore
//! expect(UiTarget::id("greeting")).to_have_text("Welcome back").verify(&mut ctx)?;
//! ```
//!
//! Every assertion re-reads the tree until it holds or its timeout runs out,
//! then fails with [`ProbeError::AssertionFailed`].

use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::locator::ElementLocator;
use crate::result::{ProbeError, ProbeResult};
use crate::target::UiTarget;
use crate::tree::UiTree;
use std::time::Duration;
use tracing::debug;

/// Assertion builder for a target
#[derive(Debug, Clone)]
pub struct Expect {
    target: UiTarget,
    timeout: Option<Duration>,
}

impl Expect {
    /// Create an expectation for a target
    #[must_use]
    pub const fn new(target: UiTarget) -> Self {
        Self {
            target,
            timeout: None,
        }
    }

    /// Override the context's default timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build(&self, kind: Check) -> ExpectAssertion {
        ExpectAssertion {
            target: self.target.clone(),
            timeout: self.timeout,
            check: kind,
        }
    }

    /// Assert the element has exactly this text
    #[must_use]
    pub fn to_have_text(&self, expected: impl Into<String>) -> ExpectAssertion {
        self.build(Check::HasText(expected.into()))
    }

    /// Assert the element's text contains a substring
    #[must_use]
    pub fn to_contain_text(&self, expected: impl Into<String>) -> ExpectAssertion {
        self.build(Check::ContainsText(expected.into()))
    }

    /// Assert the element is on screen with non-empty bounds
    #[must_use]
    pub fn to_be_visible(&self) -> ExpectAssertion {
        self.build(Check::IsVisible)
    }

    /// Assert the element is absent or collapsed
    #[must_use]
    pub fn to_be_hidden(&self) -> ExpectAssertion {
        self.build(Check::IsHidden)
    }

    /// Assert the number of matches
    #[must_use]
    pub fn to_have_count(&self, count: usize) -> ExpectAssertion {
        self.build(Check::HasCount(count))
    }
}

/// Create an expectation for a target
#[must_use]
pub const fn expect(target: UiTarget) -> Expect {
    Expect::new(target)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Check {
    HasText(String),
    ContainsText(String),
    IsVisible,
    IsHidden,
    HasCount(usize),
}

/// A pending assertion
#[derive(Debug, Clone)]
pub struct ExpectAssertion {
    target: UiTarget,
    timeout: Option<Duration>,
    check: Check,
}

impl ExpectAssertion {
    /// Evaluate once against a snapshot; `Err` carries the mismatch
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed structural paths
    pub fn check(&self, tree: &UiTree) -> ProbeResult<Result<(), String>> {
        let found = ElementLocator::match_snapshot(tree, &self.target)?.map(|(e, _)| e);
        Ok(match (&self.check, found) {
            (Check::HasText(expected), Some(e)) if e.text == *expected => Ok(()),
            (Check::HasText(expected), Some(e)) => {
                Err(format!("expected text '{expected}' but got '{}'", e.text))
            }
            (Check::ContainsText(expected), Some(e)) if e.text.contains(expected.as_str()) => {
                Ok(())
            }
            (Check::ContainsText(expected), Some(e)) => Err(format!(
                "expected text to contain '{expected}' but got '{}'",
                e.text
            )),
            (Check::IsVisible, Some(e)) if e.is_visible() => Ok(()),
            (Check::IsVisible, Some(e)) => Err(format!("element has empty bounds {}", e.bounds)),
            (Check::IsHidden, None) => Ok(()),
            (Check::IsHidden, Some(e)) if !e.is_visible() => Ok(()),
            (Check::IsHidden, Some(e)) => Err(format!("element is visible at {}", e.bounds)),
            (Check::HasCount(expected), _) => {
                let actual = ElementLocator::matches(tree, &self.target)?
                    .map_or(0, |(_, hits)| hits.len());
                if actual == *expected {
                    Ok(())
                } else {
                    Err(format!("expected count {expected} but got {actual}"))
                }
            }
            (_, None) => Err("element not found".to_string()),
        })
    }

    /// Poll until the assertion holds
    ///
    /// # Errors
    ///
    /// Returns `AssertionFailed` with the last mismatch after the timeout,
    /// plus transport errors
    pub fn verify<D: DeviceSession>(&self, ctx: &mut DeviceContext<D>) -> ProbeResult<()> {
        let timeout = self.timeout.unwrap_or(ctx.locator().default_timeout);
        let interval = ctx.locator().poll_interval;
        let start = ctx.clock().now();
        loop {
            let tree = ctx.snapshot()?;
            let mismatch = match self.check(&tree)? {
                Ok(()) => return Ok(()),
                Err(mismatch) => mismatch,
            };
            let waited = ctx.clock().now().saturating_sub(start);
            if waited >= timeout {
                return Err(ProbeError::assertion(format!(
                    "{}: {mismatch} (after {waited:?})",
                    self.target
                )));
            }
            debug!(%mismatch, "assertion not met yet");
            ctx.sleep(interval.min(timeout - waited));
        }
    }
}
