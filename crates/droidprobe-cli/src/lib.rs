//! droidprobe CLI library
//!
//! Command definitions, handlers and output for the `droidprobe` binary.

#![warn(missing_docs)]

mod commands;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    Cli, Commands, ConfigArgs, DirectionArg, DumpArgs, FindArgs, MatchBy, ScreenshotArgs,
    ScrollToArgs, TargetArgs,
};
pub use error::{CliError, CliResult};
pub use output::Printer;

use droidprobe::Credentials;

/// Run a parsed command line, writing results to stdout
///
/// # Errors
///
/// Returns the first error raised by configuration, the device or the check
pub fn run(cli: &Cli) -> CliResult<()> {
    let config = handlers::load_config(cli.config.as_deref(), cli.serial.as_deref())?;
    let mut out = Printer::new(std::io::stdout().lock());

    match &cli.command {
        Commands::Config(args) => handlers::config(&config, args, &mut out),
        Commands::Login => {
            let credentials = Credentials::from_env()?;
            let mut ctx = handlers::adb_context(&config);
            handlers::login(&mut ctx, &config, &credentials, &mut out)
        }
        Commands::Dump(args) => handlers::dump(&mut handlers::adb_context(&config), args, &mut out),
        Commands::Find(args) => handlers::find(&mut handlers::adb_context(&config), args, &mut out),
        Commands::ScrollTo(args) => {
            handlers::scroll_to(&mut handlers::adb_context(&config), &config, args, &mut out)
        }
        Commands::Stabilize => {
            handlers::stabilize(&mut handlers::adb_context(&config), &config, &mut out)
        }
        Commands::Screenshot(args) => {
            handlers::screenshot(&mut handlers::adb_context(&config), args, &mut out)
        }
    }
}
