//! Log subscriber setup for binaries and harnesses.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! whoever embeds it.

use tracing::metadata::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Environment variable overriding the verbosity-derived filter
pub const LOG_ENV: &str = "STOCKMARK_LOG";

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Default level for a `-q`/`-v` setting
#[must_use]
pub const fn level_from_verbosity(quiet: bool, verbosity: u8) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Build the filter: `STOCKMARK_LOG` directives win over the default level.
#[must_use]
pub fn filter(default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

/// Install a global subscriber writing to stderr.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(default: LevelFilter, format: LogFormat) -> bool {
    let registry = Registry::default().with(filter(default));
    let result = match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_from_verbosity(false, 0), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(false, 1), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(false, 2), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(false, 7), LevelFilter::TRACE);
        assert_eq!(level_from_verbosity(true, 3), LevelFilter::ERROR);
    }

    #[test]
    fn test_second_init_reports_false() {
        let _ = init_tracing(LevelFilter::OFF, LogFormat::Compact);
        assert!(!init_tracing(LevelFilter::OFF, LogFormat::Json));
    }
}
