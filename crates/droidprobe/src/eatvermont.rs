//! Known screens of the EatVermont app: interstitials, the login form and
//! the signals that tell a good login from a bad one.

use crate::auth::{AuthConfig, AuthFlow};
use crate::config::ProbeConfig;
use crate::popup::{PopupRegistry, PopupSpec, PopupStabilizer};
use crate::target::{Predicate, UiTarget};

/// Package of the app under test
pub const APP_PACKAGE: &str = "com.eatvermont.app";

/// Messages the login screen shows on a rejected attempt
pub const FAILURE_MESSAGES: &[&str] = &[
    "Incorrect email or password",
    "Invalid email address",
    "Too many attempts",
    "No internet connection",
    "Something went wrong",
];

fn not_now() -> UiTarget {
    UiTarget::desc("Close")
        .or(Predicate::Text("Not now".into()))
        .or(Predicate::Text("Maybe later".into()))
        .or(Predicate::Text("Skip".into()))
}

fn deny_permission() -> UiTarget {
    UiTarget::id("permission_deny_button").or(Predicate::Text("Don't allow".into()))
}

/// Interstitials and system dialogs the app is known to show
#[must_use]
pub fn popup_registry() -> PopupRegistry {
    PopupRegistry::new()
        .with(PopupSpec::new(
            "events_for_you",
            UiTarget::text_contains("Events for you"),
            not_now(),
        ))
        .with(PopupSpec::new(
            "plans_upsell",
            UiTarget::text_contains("Choose a plan")
                .or(Predicate::TextContains("Upgrade to".into())),
            not_now(),
        ))
        .with(PopupSpec::new(
            "rate_app",
            UiTarget::text_contains("Enjoying EatVermont")
                .or(Predicate::TextContains("Rate us".into())),
            not_now(),
        ))
        .with(PopupSpec::new(
            "location_permission",
            UiTarget::text_contains("access this device's location"),
            deny_permission(),
        ))
        .with(
            PopupSpec::new(
                "notification_permission",
                UiTarget::text_contains("send you notifications"),
                deny_permission(),
            )
            .with_max_dismiss_attempts(3),
        )
}

/// Built-in popups, overridden or extended by the configured ones
#[must_use]
pub fn registry_for(config: &ProbeConfig) -> PopupRegistry {
    let mut registry = popup_registry();
    registry.extend(config.popups.iter().cloned());
    registry
}

/// Login form targets and outcome signals
#[must_use]
pub fn login_config() -> AuthConfig {
    let base = AuthConfig::new(
        UiTarget::id("email").or(Predicate::ResourceId("email_input".into())).named("email field"),
        UiTarget::id("password")
            .or(Predicate::ResourceId("password_input".into()))
            .named("password field"),
        UiTarget::text("Log In")
            .or(Predicate::ResourceId("login_button".into()))
            .named("log in button"),
    )
    .with_entry(UiTarget::label("Sign In").named("sign in"))
    .with_entry(UiTarget::label("Log In").named("log in"))
    .with_entry(UiTarget::text("I already have an account"))
    .with_entry(UiTarget::label("Get Started").named("get started"))
    .with_success(UiTarget::desc("Profile").named("profile tab"))
    .with_success(UiTarget::id("bottom_navigation").named("bottom navigation"))
    .with_success(UiTarget::text_contains("Events near you"));
    FAILURE_MESSAGES
        .iter()
        .fold(base, |config, message| config.with_failure(*message))
}

/// Popup stabilizer for `config`
#[must_use]
pub fn stabilizer(config: &ProbeConfig) -> PopupStabilizer {
    config.timing.stabilizer(registry_for(config))
}

/// Login flow for `config`
#[must_use]
pub fn auth_flow(config: &ProbeConfig) -> AuthFlow {
    AuthFlow::new(
        login_config().with_settings(config.auth.clone()),
        stabilizer(config),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::context::DeviceContext;
    use crate::mock::{MockDevice, Reaction};
    use crate::tree::{Size, UiNode, UiTree};

    fn screen(nodes: impl IntoIterator<Item = UiNode>) -> UiTree {
        UiTree::screen(Size::new(1080, 2340), nodes)
    }

    fn home() -> UiTree {
        screen([
            UiNode::text_view("Events near you").bounds(40, 200, 1040, 300),
            UiNode::widget("ImageButton").desc("Profile").bounds(900, 2200, 1040, 2320),
        ])
    }

    #[test]
    fn test_registry_names() {
        assert_eq!(
            popup_registry().names(),
            vec![
                "events_for_you",
                "plans_upsell",
                "rate_app",
                "location_permission",
                "notification_permission"
            ]
        );
    }

    #[test]
    fn test_configured_popup_replaces_builtin() {
        let mut config = ProbeConfig::default();
        config.popups.push(
            PopupSpec::new("rate_app", UiTarget::text("Rate"), UiTarget::text("Later"))
                .with_max_dismiss_attempts(1),
        );
        config
            .popups
            .push(PopupSpec::new("survey", UiTarget::text("Survey"), UiTarget::desc("Close")));
        let registry = registry_for(&config);
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get("rate_app").unwrap().dismiss, UiTarget::text("Later"));
    }

    #[test]
    fn test_permission_dialog_is_dismissed() {
        let dialog = screen([
            UiNode::text_view("Allow EatVermont to send you notifications?")
                .bounds(80, 900, 1000, 1000),
            UiNode::button("Allow")
                .id("com.android.permissioncontroller:id/permission_allow_button")
                .bounds(80, 1100, 1000, 1200),
            UiNode::button("Don't allow")
                .id("com.android.permissioncontroller:id/permission_deny_button")
                .bounds(80, 1250, 1000, 1350),
        ]);
        let mut device = MockDevice::new(dialog);
        device.on_tap(Predicate::Text("Don't allow".into()), Reaction::Replace(home()));
        let mut ctx = DeviceContext::new(device, FakeClock::shared());

        let report = stabilizer(&ProbeConfig::default()).stabilize(&mut ctx).unwrap();
        assert_eq!(report.dismissed, vec!["notification_permission"]);
    }

    #[test]
    fn test_failure_signals_cover_known_messages() {
        let config = login_config();
        assert_eq!(config.failure_messages.len(), FAILURE_MESSAGES.len());
        assert_eq!(config.entry_targets.len(), 4);
    }

    #[test]
    fn test_auth_flow_uses_configured_settings() {
        let mut config = ProbeConfig::default();
        config.auth.max_attempts = 4;
        assert_eq!(auth_flow(&config).config().settings.max_attempts, 4);
    }
}
