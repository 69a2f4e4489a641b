//! droidprobe: resilient element resolution and popup stabilization for
//! Android UI automation of the EatVermont app.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  test body ──► DeviceContext ──► DeviceSession (adb | mock)       │
//! │                   │                                              │
//! │     ┌─────────────┼───────────────┬──────────────┐               │
//! │     ▼             ▼               ▼              ▼               │
//! │ ElementLocator ScrollSearch PopupStabilizer  AuthFlow            │
//! │     ▲             │               │              │               │
//! │     └─────────────┴───────────────┴──────────────┘               │
//! │                 every wait goes through Clock                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A test owns one [`DeviceContext`]. Components borrow it for the duration
//! of a call and never keep element references across calls: a [`Handle`]
//! is tied to the context epoch it was resolved in.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod adb;
pub mod artifacts;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod device;
pub mod eatvermont;
pub mod expect;
pub mod harness;
pub mod locator;
pub mod mock;
pub mod outcome;
pub mod popup;
mod result;
pub mod retry;
pub mod scroll;
pub mod target;
pub mod tree;
mod xpath;

pub use adb::AdbDevice;
pub use artifacts::ArtifactStore;
pub use auth::{AuthConfig, AuthFlow, AuthSettings, AuthState, Credentials, LoginReport};
pub use clock::{system_clock, Clock, FakeClock, SharedClock, SystemClock};
pub use config::ProbeConfig;
pub use context::DeviceContext;
pub use device::{DeviceSession, Key};
pub use expect::{expect, Expect, ExpectAssertion};
pub use harness::{run_case, SuiteRun};
pub use locator::{ElementLocator, Handle, Lookup};
pub use outcome::{FailureDetail, OutcomeLog, OutcomeRecord, TestOutcome, TestStatus};
pub use popup::{PopupRegistry, PopupSpec, PopupStabilizer, PopupState, StabilizeReport};
pub use result::{ErrorKind, ProbeError, ProbeResult};
pub use retry::{ActionRetry, RetryPolicy};
pub use scroll::{Direction, ExhaustReason, ScrollOutcome, ScrollPlan, ScrollPolicy, ScrollSearch};
pub use target::{Predicate, Strategy, UiTarget};
pub use tree::{Bounds, Element, Point, Size, UiNode, UiTree};
pub use xpath::PathExpr;

/// Everything a test body usually needs
pub mod prelude {
    pub use super::clock::*;
    pub use super::context::*;
    pub use super::device::*;
    pub use super::expect::*;
    pub use super::locator::*;
    pub use super::popup::*;
    pub use super::result::*;
    pub use super::retry::*;
    pub use super::scroll::*;
    pub use super::target::*;
    pub use super::tree::*;
    pub use super::{AuthConfig, AuthFlow, Credentials, ProbeConfig};
}
