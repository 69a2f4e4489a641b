//! Subcommand implementations.
//!
//! Everything device-facing is generic over [`DeviceSession`] so the same
//! code runs against adb and against the scripted mock.

use crate::commands::{ConfigArgs, DumpArgs, FindArgs, ScreenshotArgs, ScrollToArgs};
use crate::error::{CliError, CliResult};
use crate::output::Printer;
use droidprobe::{
    eatvermont, run_case, system_clock, AdbDevice, Credentials, DeviceContext, DeviceSession,
    Lookup, OutcomeLog, ProbeConfig, ScrollOutcome, ScrollSearch,
};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "droidprobe.yaml";

/// Effective configuration: file (explicit or default), then environment,
/// then `--serial`
///
/// # Errors
///
/// Returns an error if an explicit file is missing or any file is invalid
pub fn load_config(path: Option<&Path>, serial: Option<&str>) -> CliResult<ProbeConfig> {
    let config = match path {
        Some(p) => {
            debug!(path = %p.display(), "loading config");
            ProbeConfig::load(p)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!(path = DEFAULT_CONFIG_FILE, "loading config from working directory");
            ProbeConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => ProbeConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(serial) = serial {
        config.device.serial = Some(serial.to_string());
    }
    config.validate()?;
    Ok(config)
}

/// Context over adb for `config`
#[must_use]
pub fn adb_context(config: &ProbeConfig) -> DeviceContext<AdbDevice> {
    let device = AdbDevice::new(&config.device.adb_path, config.device.serial.clone());
    DeviceContext::from_config(device, system_clock(), config)
}

/// Print the current tree
///
/// # Errors
///
/// Returns transport, parse and output errors
pub fn dump<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    args: &DumpArgs,
    out: &mut Printer<W>,
) -> CliResult<()> {
    if args.xml {
        let xml = ctx.device_mut().dump_tree()?;
        out.line(&xml)?;
        return Ok(());
    }
    let tree = ctx.snapshot()?;
    out.line(tree.outline().trim_end())?;
    out.info(&format!("{} node(s), fingerprint {}", tree.len(), &tree.fingerprint()[..12]))?;
    Ok(())
}

/// Resolve (and optionally tap) a target
///
/// # Errors
///
/// Returns `Unsatisfied` when the target does not resolve in time
pub fn find<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    args: &FindArgs,
    out: &mut Printer<W>,
) -> CliResult<()> {
    let target = args.target.target();
    let timeout = args
        .timeout_ms
        .map_or(ctx.locator().default_timeout, Duration::from_millis);
    match ctx.resolve(&target, timeout)? {
        Lookup::Found(handle) => {
            out.handle(&handle)?;
            if args.tap {
                ctx.tap_handle(&handle)?;
                out.success("tapped")?;
            }
            Ok(())
        }
        Lookup::NotFound {
            target,
            waited,
            polls,
        } => Err(CliError::unsatisfied(format!(
            "{target} not found after {waited:?} ({polls} poll(s))"
        ))),
    }
}

/// Scroll until a target shows
///
/// # Errors
///
/// Returns `Unsatisfied` when the search is exhausted
pub fn scroll_to<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    config: &ProbeConfig,
    args: &ScrollToArgs,
    out: &mut Printer<W>,
) -> CliResult<()> {
    let target = args.target.target();
    let plan = config.scroll.clone().toward(args.direction.into());
    match ScrollSearch::find(ctx, &target, &plan)? {
        ScrollOutcome::Found {
            handle,
            coarse_swipes,
            fine_swipes,
        } => {
            out.handle(&handle)?;
            out.detail("swipes", &format!("{coarse_swipes} coarse, {fine_swipes} fine"))?;
            Ok(())
        }
        ScrollOutcome::Exhausted {
            reason,
            coarse_swipes,
            fine_swipes,
        } => Err(CliError::unsatisfied(format!(
            "{target} not found: scroll {reason:?} after {} swipe(s)",
            coarse_swipes + fine_swipes
        ))),
    }
}

/// Clear known popups
///
/// # Errors
///
/// Returns popup and transport errors
pub fn stabilize<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    config: &ProbeConfig,
    out: &mut Printer<W>,
) -> CliResult<()> {
    let report = eatvermont::stabilizer(config).stabilize(ctx)?;
    out.stabilized(&report)?;
    Ok(())
}

/// Log in, recording the outcome when an outcome log is configured
///
/// # Errors
///
/// Returns authentication, popup and transport errors
pub fn login<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    config: &ProbeConfig,
    credentials: &Credentials,
    out: &mut Printer<W>,
) -> CliResult<()> {
    let flow = eatvermont::auth_flow(config);
    let mut report = None;
    let outcome = run_case(ctx, "login", |ctx| {
        report = Some(flow.login(ctx, credentials)?);
        Ok(())
    });
    if let Some(path) = &config.artifacts.outcome_log {
        let mut log = OutcomeLog::open(path)?;
        log.append(&outcome)?;
        info!(path = %path.display(), run_id = %log.run_id(), "outcome recorded");
    }

    match (report, outcome.failure) {
        (Some(report), _) => {
            out.success(&format!(
                "logged in as {} ({} attempt(s), confirmed by {})",
                credentials.identifier(),
                report.attempts,
                report.landmark
            ))?;
            out.stabilized(&report.popups)?;
            Ok(())
        }
        (None, Some(failure)) => {
            for path in &outcome.screenshots {
                out.detail("screenshot", &path.display().to_string())?;
            }
            Err(CliError::unsatisfied(failure.message))
        }
        (None, None) => Err(CliError::unsatisfied("login did not complete")),
    }
}

/// Save a screenshot
///
/// # Errors
///
/// Returns transport and I/O errors
pub fn screenshot<D: DeviceSession, W: Write>(
    ctx: &mut DeviceContext<D>,
    args: &ScreenshotArgs,
    out: &mut Printer<W>,
) -> CliResult<()> {
    ctx.device_mut().screenshot(&args.path)?;
    out.success(&format!("saved {}", args.path.display()))?;
    Ok(())
}

/// Show or write configuration
///
/// # Errors
///
/// Returns an error if `--init` would overwrite a file without `--force`
pub fn config<W: Write>(
    config: &ProbeConfig,
    args: &ConfigArgs,
    out: &mut Printer<W>,
) -> CliResult<()> {
    if let Some(path) = &args.init {
        return init_config(path, args.force, out);
    }
    out.line(config.to_yaml()?.trim_end())?;
    Ok(())
}

fn init_config<W: Write>(path: &Path, force: bool, out: &mut Printer<W>) -> CliResult<()> {
    if path.exists() && !force {
        return Err(CliError::invalid_argument(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let mut config = ProbeConfig::default();
    config.popups = eatvermont::popup_registry().into_iter().collect();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_yaml()?)?;
    out.success(&format!("wrote {}", path.display()))?;
    Ok(())
}
