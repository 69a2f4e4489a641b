//! Retryable login protocol.
//!
//! ```text
//! START -> CREDENTIALS_ENTERED -> SUBMITTED -> SUCCESS
//!                 ^                    |
//!                 |                    +--> FAILURE_RECOVERABLE (Back, re-enter)
//!                 +--------------------+
//!                                      +--> FAILURE_FATAL (attempts exhausted)
//! ```
//!
//! After submitting, the flow races the app's failure messages against its
//! success landmarks. Failure messages are checked first on every poll, and
//! seeing neither before the race timeout counts as a failure.

use crate::config::millis;
use crate::context::DeviceContext;
use crate::device::{DeviceSession, Key};
use crate::locator::Handle;
use crate::popup::{PopupStabilizer, StabilizeReport};
use crate::result::{ErrorKind, ProbeError, ProbeResult};
use crate::retry::RetryPolicy;
use crate::target::{Predicate, UiTarget};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

/// Environment variable holding the login identifier
pub const LOGIN_ID_ENV: &str = "DROIDPROBE_LOGIN_ID";

/// Environment variable holding the login secret
pub const LOGIN_SECRET_ENV: &str = "DROIDPROBE_LOGIN_SECRET";

/// Login credentials. `Debug` never shows the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identifier: String,
    secret: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Read `DROIDPROBE_LOGIN_ID` and `DROIDPROBE_LOGIN_SECRET`
    ///
    /// # Errors
    ///
    /// Returns a config error if either variable is unset or empty
    pub fn from_env() -> ProbeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns a config error if either variable is unset or empty
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ProbeResult<Self> {
        let read = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ProbeError::config(format!("{key} is not set")))
        };
        Ok(Self::new(read(LOGIN_ID_ENV)?, read(LOGIN_SECRET_ENV)?))
    }

    /// Login identifier
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Login secret
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Login state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Before the credential form is reached
    Start,
    /// Both fields filled
    CredentialsEntered,
    /// Submit tapped
    Submitted,
    /// A success landmark appeared
    Success,
    /// The attempt failed and another is allowed
    FailureRecoverable(String),
    /// Attempts exhausted
    FailureFatal(String),
}

/// Tunable numbers of the login flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Submit attempts
    pub max_attempts: u32,
    /// Time to wait for a success or failure signal
    #[serde(rename = "race_timeout_ms", with = "millis")]
    pub race_timeout: Duration,
    /// Entry-control taps allowed while looking for the form
    pub max_entry_hops: u32,
    /// Time to wait for the form or an entry control on each hop
    #[serde(rename = "form_timeout_ms", with = "millis")]
    pub form_timeout: Duration,
    /// Time to wait for each input field
    #[serde(rename = "field_timeout_ms", with = "millis")]
    pub field_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            race_timeout: Duration::from_secs(5),
            max_entry_hops: 3,
            form_timeout: Duration::from_secs(3),
            field_timeout: Duration::from_secs(5),
        }
    }
}

/// Targets and signals of one app's login screen
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    /// Controls leading to the form, tried in order
    pub entry_targets: Vec<UiTarget>,
    /// Identifier input
    pub identifier_field: UiTarget,
    /// Secret input
    pub secret_field: UiTarget,
    /// Submit control
    pub submit: UiTarget,
    /// Elements only shown after a successful login
    pub success_landmarks: Vec<UiTarget>,
    /// Substrings of known failure messages
    pub failure_messages: Vec<String>,
    /// Key pressed to back out of a failed attempt
    pub recovery_key: Key,
    /// Retry applied to each field fill
    pub fill_retry: RetryPolicy,
    /// Budgets and timeouts
    pub settings: AuthSettings,
}

impl AuthConfig {
    /// Create a config with default settings
    #[must_use]
    pub fn new(identifier_field: UiTarget, secret_field: UiTarget, submit: UiTarget) -> Self {
        Self {
            entry_targets: Vec::new(),
            identifier_field,
            secret_field,
            submit,
            success_landmarks: Vec::new(),
            failure_messages: Vec::new(),
            recovery_key: Key::Back,
            fill_retry: RetryPolicy::fixed(2, Duration::from_millis(500))
                .with_retryable([ErrorKind::NotFound]),
            settings: AuthSettings::default(),
        }
    }

    /// Add an entry control
    #[must_use]
    pub fn with_entry(mut self, target: UiTarget) -> Self {
        self.entry_targets.push(target);
        self
    }

    /// Add a success landmark
    #[must_use]
    pub fn with_success(mut self, target: UiTarget) -> Self {
        self.success_landmarks.push(target);
        self
    }

    /// Add a failure message substring
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_messages.push(message.into());
        self
    }

    /// Replace the settings
    #[must_use]
    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the submit budget
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_attempts = attempts;
        self
    }

    fn failure_targets(&self) -> Vec<UiTarget> {
        self.failure_messages
            .iter()
            .map(|m| {
                UiTarget::text_contains(m.as_str())
                    .or(Predicate::DescriptionContains(m.clone()))
                    .named(m.as_str())
            })
            .collect()
    }
}

/// What a successful login did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReport {
    /// Submit attempts made
    pub attempts: u32,
    /// Entry-control taps made to reach the form
    pub entry_hops: u32,
    /// States visited, in order
    pub states: Vec<AuthState>,
    /// Landmark that confirmed success
    pub landmark: String,
    /// Overlays dismissed after login
    pub popups: StabilizeReport,
}

enum Signal {
    Success(String),
    Failure(String),
}

/// Drives the login protocol
#[derive(Debug, Clone)]
pub struct AuthFlow {
    config: AuthConfig,
    stabilizer: PopupStabilizer,
}

impl AuthFlow {
    /// Create a flow that stabilizes with `stabilizer` after logging in
    #[must_use]
    pub const fn new(config: AuthConfig, stabilizer: PopupStabilizer) -> Self {
        Self { config, stabilizer }
    }

    /// The login targets in use
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Log in.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` when the form cannot be reached or every
    /// attempt fails, popup errors from the post-login stabilization, and
    /// transport errors
    pub fn login<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        credentials: &Credentials,
    ) -> ProbeResult<LoginReport> {
        let _span = info_span!("login").entered();
        let settings = &self.config.settings;
        let max_attempts = settings.max_attempts.max(1);
        let mut states = vec![AuthState::Start];

        let entry_hops = self.reach_form(ctx)?;
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            self.enter_credentials(ctx, credentials)?;
            states.push(AuthState::CredentialsEntered);

            ctx.tap_target(&self.config.submit, settings.field_timeout)?;
            states.push(AuthState::Submitted);
            debug!(attempt, "submitted");

            match self.race(ctx)? {
                Signal::Success(landmark) => {
                    states.push(AuthState::Success);
                    info!(attempt, %landmark, "logged in");
                    let popups = self.stabilizer.stabilize(ctx)?;
                    return Ok(LoginReport {
                        attempts: attempt,
                        entry_hops,
                        states,
                        landmark,
                        popups,
                    });
                }
                Signal::Failure(reason) => {
                    last_reason = reason;
                    if attempt < max_attempts {
                        warn!(attempt, reason = %last_reason, "login attempt failed, recovering");
                        states.push(AuthState::FailureRecoverable(last_reason.clone()));
                        self.recover(ctx)?;
                    }
                }
            }
        }

        states.push(AuthState::FailureFatal(last_reason.clone()));
        warn!(attempts = max_attempts, reason = %last_reason, ?states, "login failed");
        Err(ProbeError::AuthenticationFailed {
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    /// Tap entry controls until the identifier field shows. Returns the hop count.
    fn reach_form<D: DeviceSession>(&self, ctx: &mut DeviceContext<D>) -> ProbeResult<u32> {
        let settings = &self.config.settings;
        let mut candidates = vec![self.config.identifier_field.clone()];
        candidates.extend(self.config.entry_targets.iter().cloned());
        let locator = ctx.locator();

        let mut hops = 0;
        loop {
            let hit = locator.resolve_first(ctx, &candidates, settings.form_timeout)?;
            match hit {
                Some((0, _)) => return Ok(hops),
                Some((_, entry)) if hops < settings.max_entry_hops => {
                    self.take_entry(ctx, &entry)?;
                    hops += 1;
                }
                Some(_) => {
                    return Err(ProbeError::AuthenticationFailed {
                        attempts: 0,
                        reason: format!("login form not reached after {hops} entry tap(s)"),
                    })
                }
                None => {
                    return Err(ProbeError::AuthenticationFailed {
                        attempts: 0,
                        reason: "neither the login form nor an entry control is on screen"
                            .to_string(),
                    })
                }
            }
        }
    }

    fn take_entry<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        entry: &Handle,
    ) -> ProbeResult<()> {
        debug!(entry = %entry.target, "tapping entry control");
        ctx.tap_handle(entry)?;
        ctx.settle();
        Ok(())
    }

    fn enter_credentials<D: DeviceSession>(
        &self,
        ctx: &mut DeviceContext<D>,
        credentials: &Credentials,
    ) -> ProbeResult<()> {
        let timeout = self.config.settings.field_timeout;
        let policy = &self.config.fill_retry;
        let (id_field, secret_field) = (&self.config.identifier_field, &self.config.secret_field);
        ctx.with_retry(policy, |ctx, _| ctx.fill(id_field, credentials.identifier(), timeout))?;
        ctx.with_retry(policy, |ctx, _| ctx.fill(secret_field, credentials.secret(), timeout))?;
        debug!("credentials entered");
        Ok(())
    }

    fn race<D: DeviceSession>(&self, ctx: &mut DeviceContext<D>) -> ProbeResult<Signal> {
        let failures = self.config.failure_targets();
        let failure_count = failures.len();
        let mut targets = failures;
        targets.extend(self.config.success_landmarks.iter().cloned());

        let timeout = self.config.settings.race_timeout;
        let locator = ctx.locator();
        Ok(match locator.resolve_first(ctx, &targets, timeout)? {
            Some((i, handle)) if i < failure_count => {
                let shown = handle.element.label().to_string();
                Signal::Failure(if shown.is_empty() { handle.target } else { shown })
            }
            Some((_, handle)) => Signal::Success(handle.target),
            None => Signal::Failure(format!(
                "no success or failure signal within {timeout:?}"
            )),
        })
    }

    fn recover<D: DeviceSession>(&self, ctx: &mut DeviceContext<D>) -> ProbeResult<()> {
        ctx.press_key(self.config.recovery_key)?;
        ctx.settle();
        self.reach_form(ctx).map(|_| ())
    }
}
