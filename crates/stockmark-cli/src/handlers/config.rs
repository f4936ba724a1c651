//! Config command handler

use crate::{CliResult, ConfigArgs};
use std::path::Path;
use stockmark::EngineConfig;

const REDACTED: &str = "<redacted>";

/// Load configuration from a file, or defaults, and validate it
pub fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Pretty JSON for a configuration with the token masked
pub fn render_config(config: &EngineConfig) -> CliResult<String> {
    let mut shown = config.clone();
    if shown.fetch.token.is_some() {
        shown.fetch.token = Some(REDACTED.to_string());
    }
    Ok(serde_json::to_string_pretty(&shown)?)
}

/// Execute the config command
pub fn execute_config(args: &ConfigArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    println!("{}", render_config(&config)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::CliError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shop.json");
        fs::write(&path, r#"{"store_id": "1003", "fetch": {"attempts": 5}}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.store_id.as_deref(), Some("1003"));
        assert_eq!(config.fetch.attempts, 5);
        assert_eq!(config.fetch.timeout_ms, EngineConfig::default().fetch.timeout_ms);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shop.json");
        fs::write(&path, r#"{"fetch": {"attempts": 0}}"#).unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(CliError::Stockmark(_))
        ));
    }

    #[test]
    fn test_render_masks_token() {
        let config = EngineConfig::default().with_token("public_abc");
        let text = render_config(&config).unwrap();
        assert!(!text.contains("public_abc"));
        assert!(text.contains(REDACTED));
        assert!(text.contains("\"attempts\": 3"));
    }
}
