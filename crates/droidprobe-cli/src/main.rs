//! droidprobe CLI
//!
//! ## Usage
//!
//! ```bash
//! droidprobe dump                          # Outline of the current screen
//! droidprobe find "Sign In" --tap          # Resolve and tap a control
//! droidprobe scroll-to "Maple Festival"    # Scroll a list until it shows
//! droidprobe stabilize                     # Dismiss known popups
//! droidprobe login                         # Log in from DROIDPROBE_LOGIN_*
//! droidprobe config --init droidprobe.yaml # Write a starter config
//! ```

use clap::Parser;
use droidprobe_cli::{logging, run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose, cli.json_logs) {
        eprintln!("Error: {e}");
        return ExitCode::from(e.exit_code());
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", console::style("Error:").red().bold());
            ExitCode::from(e.exit_code())
        }
    }
}
