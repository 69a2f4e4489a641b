//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use droidprobe::{Direction, UiTarget};
use std::path::PathBuf;

/// droidprobe: inspect and drive the EatVermont Android app over adb
#[derive(Parser, Debug)]
#[command(name = "droidprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "DROIDPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// adb serial of the device to use
    #[arg(short, long, global = true)]
    pub serial: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the current screen's accessibility tree
    Dump(DumpArgs),

    /// Resolve a target on the current screen
    Find(FindArgs),

    /// Scroll until a target is on screen
    ScrollTo(ScrollToArgs),

    /// Dismiss known popups until the screen is stable
    Stabilize,

    /// Log in with DROIDPROBE_LOGIN_ID / DROIDPROBE_LOGIN_SECRET
    Login,

    /// Save a PNG screenshot
    Screenshot(ScreenshotArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for the dump command
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Print the raw uiautomator XML instead of an outline
    #[arg(long)]
    pub xml: bool,
}

/// How a label is matched
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchBy {
    /// Accessibility description, then visible text
    #[default]
    Label,
    /// Exact visible text
    Text,
    /// Exact accessibility description
    Desc,
    /// Resource id, full or bare
    Id,
    /// Structural path
    Xpath,
}

impl MatchBy {
    /// Build the target for `label`
    #[must_use]
    pub fn target(self, label: &str) -> UiTarget {
        match self {
            Self::Label => UiTarget::label(label),
            Self::Text => UiTarget::text(label),
            Self::Desc => UiTarget::desc(label),
            Self::Id => UiTarget::id(label),
            Self::Xpath => UiTarget::xpath(label),
        }
    }
}

/// Target selection shared by find and scroll-to
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Text, description, id or path to look for
    pub label: String,

    /// How to match the label
    #[arg(long, value_enum, default_value_t = MatchBy::Label)]
    pub by: MatchBy,

    /// Zero-based index among the matches
    #[arg(long)]
    pub index: Option<usize>,
}

impl TargetArgs {
    /// The target these arguments describe
    #[must_use]
    pub fn target(&self) -> UiTarget {
        let target = self.by.target(&self.label);
        match self.index {
            Some(i) => target.nth(i),
            None => target,
        }
    }
}

/// Arguments for the find command
#[derive(Args, Debug)]
pub struct FindArgs {
    /// Target selection
    #[command(flatten)]
    pub target: TargetArgs,

    /// Polling timeout in milliseconds (defaults to the configured timeout)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Tap the element once found
    #[arg(long)]
    pub tap: bool,
}

/// Scroll direction argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    /// Reveal content below
    Down,
    /// Reveal content above
    Up,
    /// Reveal content to the right
    Right,
    /// Reveal content to the left
    Left,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Down => Self::Down,
            DirectionArg::Up => Self::Up,
            DirectionArg::Right => Self::Right,
            DirectionArg::Left => Self::Left,
        }
    }
}

/// Arguments for the scroll-to command
#[derive(Args, Debug)]
pub struct ScrollToArgs {
    /// Target selection
    #[command(flatten)]
    pub target: TargetArgs,

    /// Scroll direction
    #[arg(long, value_enum, default_value = "down")]
    pub direction: DirectionArg,
}

/// Arguments for the screenshot command
#[derive(Args, Debug)]
pub struct ScreenshotArgs {
    /// Output PNG path
    pub path: PathBuf,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the effective configuration as YAML
    #[arg(long, conflicts_with = "init")]
    pub show: bool,

    /// Write a default configuration file
    #[arg(long, value_name = "PATH")]
    pub init: Option<PathBuf>,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}
