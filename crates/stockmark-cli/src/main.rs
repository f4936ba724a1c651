//! Stockmark CLI
//!
//! ## Usage
//!
//! ```bash
//! stockmark check --store 1003 --product 42          # Availability per option value
//! stockmark check --store 1003 --product 42 --json   # Same, as JSON
//! stockmark config -c shop.json                      # Effective configuration
//! ```

use clap::Parser;
use std::process::ExitCode;
use stockmark::telemetry::{init_tracing, level_from_verbosity, LogFormat};
use stockmark_cli::handlers::{check::execute_check, config::execute_config};
use stockmark_cli::{Cli, CliResult, Commands};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_tracing(level_from_verbosity(cli.quiet, cli.verbose), format);

    match cli.command {
        Commands::Check(args) => execute_check(&args),
        Commands::Config(args) => execute_config(&args),
    }
}
