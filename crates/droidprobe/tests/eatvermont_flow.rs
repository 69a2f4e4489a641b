//! End-to-end scenarios over a scripted EatVermont device: login through the
//! landing screen, clear the post-login upsell, scroll to an event and assert
//! on it, with outcomes written to a JSON-lines log.

#![allow(clippy::unwrap_used)]

use droidprobe::mock::{MockDevice, Reaction};
use droidprobe::prelude::*;
use droidprobe::{eatvermont, run_case, Credentials, OutcomeLog, SuiteRun, TestStatus};
use std::collections::HashMap;
use std::path::Path;

const SCREEN: Size = Size::new(1080, 2340);

fn landing() -> UiTree {
    UiTree::screen(
        SCREEN,
        [
            UiNode::text_view("Find local food events").bounds(60, 600, 1020, 700),
            UiNode::button("Get Started").bounds(60, 1800, 1020, 1920),
            UiNode::button("Sign In").bounds(60, 2000, 1020, 2120),
        ],
    )
}

fn login_form(error: Option<&str>) -> UiTree {
    let mut nodes = vec![
        UiNode::widget("EditText")
            .id("com.eatvermont.app:id/email")
            .bounds(60, 400, 1020, 500),
        UiNode::widget("EditText")
            .id("com.eatvermont.app:id/password")
            .bounds(60, 550, 1020, 650),
        UiNode::button("Log In").bounds(60, 900, 1020, 1020),
    ];
    if let Some(message) = error {
        nodes.push(UiNode::text_view(message).bounds(60, 700, 1020, 780));
    }
    UiTree::screen(SCREEN, nodes)
}

fn feed(first: usize, with_festival: bool) -> Vec<UiNode> {
    let mut rows: Vec<UiNode> = (first..first + 3)
        .map(|i| {
            UiNode::text_view(format!("Sugarhouse open day {i}"))
                .bounds(0, 400 + (i - first) as i32 * 300, 1080, 650 + (i - first) as i32 * 300)
        })
        .collect();
    if with_festival {
        rows.push(
            UiNode::text_view("Maple Festival")
                .id("com.eatvermont.app:id/event_title")
                .bounds(0, 1400, 1080, 1500),
        );
    }
    rows
}

fn home(first: usize, with_festival: bool) -> UiTree {
    UiTree::screen(
        SCREEN,
        [
            UiNode::text_view("Events near you").bounds(40, 200, 1040, 300),
            UiNode::widget("RecyclerView")
                .scrollable(true)
                .bounds(0, 350, 1080, 2150)
                .children(feed(first, with_festival)),
            UiNode::widget("ImageButton").desc("Profile").bounds(900, 2200, 1040, 2320),
        ],
    )
}

fn home_with_upsell() -> UiTree {
    UiTree::screen(
        SCREEN,
        [
            UiNode::text_view("Events near you").bounds(40, 200, 1040, 300),
            UiNode::widget("ImageButton").desc("Profile").bounds(900, 2200, 1040, 2320),
            UiNode::widget("FrameLayout")
                .bounds(0, 0, 1080, 2340)
                .child(UiNode::text_view("Choose a plan that fits").bounds(80, 600, 1000, 700))
                .child(UiNode::button("Maybe later").bounds(80, 1800, 1000, 1900)),
        ],
    )
}

fn app(password: &str) -> MockDevice {
    let mut device = MockDevice::new(landing());
    device.on_tap(Predicate::Text("Sign In".into()), Reaction::Replace(login_form(None)));
    let after_submit = if password == "maple-syrup" {
        home_with_upsell()
    } else {
        login_form(Some("Incorrect email or password"))
    };
    device.on_tap(Predicate::Text("Log In".into()), Reaction::Replace(after_submit));
    device.on_tap(Predicate::Text("Maybe later".into()), Reaction::Replace(home(0, false)));
    for page in 1..=3 {
        device.push_scroll_frame(home(page * 3, page == 3));
    }
    device
}

fn config(artifacts: &Path) -> ProbeConfig {
    let yaml = format!(
        "timing:\n  poll_interval_ms: 200\n  settle_delay_ms: 300\nauth:\n  max_attempts: 2\nartifacts:\n  dir: {}\n",
        artifacts.display()
    );
    ProbeConfig::from_yaml_str(&yaml).unwrap()
}

fn credentials(password: &str) -> Credentials {
    let vars: HashMap<&str, &str> = [
        (droidprobe::auth::LOGIN_ID_ENV, "cook@example.com"),
        (droidprobe::auth::LOGIN_SECRET_ENV, password),
    ]
    .into_iter()
    .collect();
    Credentials::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap()
}

fn find_festival(config: &ProbeConfig, password: &str) -> impl FnOnce(&mut DeviceContext<MockDevice>) -> ProbeResult<()> {
    let flow = eatvermont::auth_flow(config);
    let plan = config.scroll.clone();
    let creds = credentials(password);
    move |ctx| {
        let report = flow.login(ctx, &creds)?;
        assert_eq!(report.popups.dismissed, vec!["plans_upsell"]);
        ctx.capture("logged_in")?;

        let festival = UiTarget::text("Maple Festival").named("maple festival");
        let handle = ScrollSearch::find(ctx, &festival, &plan)?.require(&festival)?;
        ctx.tap_handle(&handle)?;
        expect(UiTarget::id("event_title"))
            .to_have_text("Maple Festival")
            .verify(ctx)
    }
}

#[test]
fn test_login_scroll_and_tap_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut ctx = DeviceContext::from_config(app("maple-syrup"), FakeClock::shared(), &config);

    let outcome = run_case(&mut ctx, "find maple festival", find_festival(&config, "maple-syrup"));

    assert_eq!(outcome.status, TestStatus::Passed, "{:?}", outcome.failure);
    assert_eq!(outcome.screenshots.len(), 1);
    assert!(outcome.screenshots[0].ends_with("find_maple_festival/01_logged_in.png"));
    assert_eq!(ctx.device().typed(), vec!["cook@example.com", "maple-syrup"]);
    assert_eq!(ctx.device().swipe_count(), 3);
}

#[test]
fn test_wrong_password_is_recorded_as_authentication_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let log_path = dir.path().join("outcomes.jsonl");
    let mut ctx = DeviceContext::from_config(app("pancakes"), FakeClock::shared(), &config);

    let mut suite = SuiteRun::new().with_log(OutcomeLog::open(&log_path).unwrap());
    let outcome = suite
        .run(&mut ctx, "find maple festival", find_festival(&config, "pancakes"))
        .unwrap()
        .clone();

    assert_eq!(outcome.status, TestStatus::Failed);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::Authentication);
    assert!(failure.message.contains("Incorrect email or password"));
    assert!(failure.outline.unwrap().contains("Log In"));
    assert!(outcome.screenshots[0].ends_with("find_maple_festival/01_failure.png"));

    let records = OutcomeLog::read(&log_path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome.status, TestStatus::Failed);
    assert!(!suite.all_passed());
}

#[test]
fn test_entry_hop_count_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut ctx = DeviceContext::from_config(app("maple-syrup"), FakeClock::shared(), &config);
    let report = eatvermont::auth_flow(&config)
        .login(&mut ctx, &credentials("maple-syrup"))
        .unwrap();
    assert_eq!(report.entry_hops, 1);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.landmark, "profile tab");
    assert_eq!(report.states.last(), Some(&droidprobe::AuthState::Success));
}
