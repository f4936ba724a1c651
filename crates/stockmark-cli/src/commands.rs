//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stockmark: inspect combination stock and the availability it implies
#[derive(Parser, Debug)]
#[command(name = "stockmark")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a product's combinations and print which option values are available
    Check(CheckArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Store identifier
    #[arg(long)]
    pub store: String,

    /// Product identifier
    #[arg(long)]
    pub product: String,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the stock endpoint base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Public read-only bearer token
    #[arg(long, env = "STOCKMARK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Total attempts per fetch
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Directory for the durable cache tier
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_check_command() {
            let cli = Cli::parse_from(["stockmark", "check", "--store", "1003", "--product", "42"]);
            if let Commands::Check(args) = cli.command {
                assert_eq!(args.store, "1003");
                assert_eq!(args.product, "42");
                assert!(!args.json);
                assert_eq!(args.config, None);
            } else {
                panic!("expected Check command");
            }
        }

        #[test]
        fn test_parse_check_overrides() {
            let cli = Cli::parse_from([
                "stockmark",
                "check",
                "--store",
                "1003",
                "--product",
                "42",
                "--attempts",
                "1",
                "--timeout-ms",
                "250",
                "--base-url",
                "http://127.0.0.1:9",
                "--json",
            ]);
            if let Commands::Check(args) = cli.command {
                assert_eq!(args.attempts, Some(1));
                assert_eq!(args.timeout_ms, Some(250));
                assert_eq!(args.base_url.as_deref(), Some("http://127.0.0.1:9"));
                assert!(args.json);
            } else {
                panic!("expected Check command");
            }
        }

        #[test]
        fn test_check_requires_store_and_product() {
            assert!(Cli::try_parse_from(["stockmark", "check", "--store", "1003"]).is_err());
            assert!(Cli::try_parse_from(["stockmark", "check", "--product", "42"]).is_err());
        }

        #[test]
        fn test_parse_config_command() {
            let cli = Cli::parse_from(["stockmark", "config", "-c", "shop.json"]);
            if let Commands::Config(args) = cli.command {
                assert_eq!(args.config, Some(PathBuf::from("shop.json")));
            } else {
                panic!("expected Config command");
            }
        }

        #[test]
        fn test_global_verbosity() {
            let cli = Cli::parse_from(["stockmark", "config", "-vv"]);
            assert_eq!(cli.verbose, 2);
            assert!(!cli.quiet);

            let cli = Cli::parse_from(["stockmark", "-q", "config"]);
            assert!(cli.quiet);
        }
    }
}
