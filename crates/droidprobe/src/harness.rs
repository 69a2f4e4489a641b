//! Harness hook: run a test body against a context and record the outcome.

use crate::context::DeviceContext;
use crate::device::DeviceSession;
use crate::outcome::{FailureDetail, OutcomeLog, TestOutcome};
use crate::result::ProbeResult;
use tracing::{info, info_span, warn};

/// Run one test body.
///
/// Starts a fresh artifact directory for `name`, times the body on the
/// context clock and, on failure, records what the device showed and takes
/// a `failure` screenshot. Capture problems never replace the body's error.
pub fn run_case<D, F>(ctx: &mut DeviceContext<D>, name: &str, body: F) -> TestOutcome
where
    D: DeviceSession,
    F: FnOnce(&mut DeviceContext<D>) -> ProbeResult<()>,
{
    let _span = info_span!("case", test = %name).entered();
    ctx.artifacts_mut().begin_test(name);
    let start = ctx.clock().now();
    let result = body(ctx);
    let duration = ctx.clock().now().saturating_sub(start);

    let outcome = match result {
        Ok(()) => {
            info!(?duration, "passed");
            TestOutcome::passed(name, duration)
        }
        Err(err) => {
            warn!(error = %err, ?duration, "failed");
            let detail = FailureDetail::capture(ctx, &err);
            if let Err(e) = ctx.capture("failure") {
                warn!(error = %e, "failure screenshot not taken");
            }
            TestOutcome::failed(name, duration, detail)
        }
    };
    outcome.with_screenshots(ctx.artifacts_mut().take_captured())
}

/// Outcomes of a sequence of cases, optionally mirrored to an outcome log
#[derive(Debug, Default)]
pub struct SuiteRun {
    outcomes: Vec<TestOutcome>,
    log: Option<OutcomeLog>,
}

impl SuiteRun {
    /// Collect outcomes in memory only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every outcome to `log`
    #[must_use]
    pub fn with_log(mut self, log: OutcomeLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Run a case and record its outcome
    ///
    /// # Errors
    ///
    /// Returns an error only if the outcome log cannot be written
    pub fn run<D, F>(
        &mut self,
        ctx: &mut DeviceContext<D>,
        name: &str,
        body: F,
    ) -> ProbeResult<&TestOutcome>
    where
        D: DeviceSession,
        F: FnOnce(&mut DeviceContext<D>) -> ProbeResult<()>,
    {
        let outcome = run_case(ctx, name, body);
        self.record(outcome)
    }

    /// Record an outcome produced elsewhere (e.g. a skip)
    ///
    /// # Errors
    ///
    /// Returns an error only if the outcome log cannot be written
    pub fn record(&mut self, outcome: TestOutcome) -> ProbeResult<&TestOutcome> {
        if let Some(log) = self.log.as_mut() {
            log.append(&outcome)?;
        }
        self.outcomes.push(outcome);
        let last = self.outcomes.len() - 1;
        Ok(&self.outcomes[last])
    }

    /// All outcomes so far
    #[must_use]
    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    /// Check if every recorded case passed or was skipped
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.outcomes.iter().any(|o| o.status.is_failed())
    }

    /// Count passed cases
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_passed()).count()
    }

    /// Failed cases
    #[must_use]
    pub fn failures(&self) -> Vec<&TestOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failed()).collect()
    }
}
