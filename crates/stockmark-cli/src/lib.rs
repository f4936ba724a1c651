//! Stockmark CLI Library
//!
//! Command-line access to the stock client, availability cache and model
//! builder of the `stockmark` crate.

#![warn(missing_docs)]

mod commands;
mod error;
pub mod handlers;

pub use commands::{CheckArgs, Cli, Commands, ConfigArgs};
pub use error::{CliError, CliResult};
pub use handlers::check::{apply_overrides, check, render_text, CheckReport};
pub use handlers::config::{load_config, render_config};
pub use handlers::store::FileStore;
