//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. [`EngineConfig::validate`] checks the values that would
//! otherwise only fail once the engine is running (patterns, selectors).

use crate::result::{StockmarkError, StockmarkResult};
use crate::selector::Selector;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Stock endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Endpoint base; requests go to `{base_url}/{store}/products/{product}/combinations`
    pub base_url: String,
    /// Public read-only bearer token
    pub token: Option<String>,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Total attempts including the first
    pub attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt
    pub backoff_base_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.ecwid.com/api/v3".to_string(),
            token: None,
            timeout_ms: 8_000,
            attempts: 3,
            backoff_base_ms: 400,
        }
    }
}

impl FetchConfig {
    /// Per-attempt timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after failed attempt `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Availability cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entry age in milliseconds
    pub ttl_ms: u64,
    /// Bumping this invalidates every stored entry
    pub schema_version: u32,
    /// Namespace for durable-tier keys
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            schema_version: 2,
            key_prefix: "stockmark".to_string(),
        }
    }
}

/// Product identity discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Wait before retrying an undetermined identity
    pub retry_delay_ms: u64,
    /// Retries after the first resolution attempt
    pub retries: u32,
    /// Pattern over observed request URLs; first group is the product id
    pub request_pattern: String,
    /// Selector for the host's product container
    pub product_container: String,
    /// Pattern over product container class names
    pub class_pattern: String,
    /// Attribute declaring the product id
    pub product_id_attr: String,
    /// Pattern over inline script text
    pub script_pattern: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            retries: 1,
            request_pattern: r"/products/(\d+)(?:[/?#]|$)".to_string(),
            product_container: ".ecwid-productBrowser-ProductPage".to_string(),
            class_pattern: r"^ecwid-productBrowser-ProductPage-(\d+)$".to_string(),
            product_id_attr: "data-product-id".to_string(),
            script_pattern: r#""productId"\s*:\s*"?(\d+)"#.to_string(),
        }
    }
}

impl IdentityConfig {
    /// Wait between resolution attempts
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Where option controls live and how unavailable values are marked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Narrowest container holding the option controls
    pub options_container: String,
    /// Broader container used while the narrow one is absent
    pub fallback_container: String,
    /// Selector for a single choice control
    pub control: String,
    /// Attribute carrying the option name on each control
    pub option_name_attr: String,
    /// Attribute carrying the option value on each control
    pub value_attr: String,
    /// Wrapper patterns, tried in order
    pub wrappers: Vec<String>,
    /// Class put on the wrapper of an unavailable value
    pub disabled_class: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            options_container: ".product-details-module__content".to_string(),
            fallback_container: ".product-details".to_string(),
            control: "input".to_string(),
            option_name_attr: "name".to_string(),
            value_attr: "value".to_string(),
            wrappers: vec![".form-control".to_string(), "label".to_string()],
            disabled_class: "stockmark-unavailable".to_string(),
        }
    }
}

/// DOM reconciler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Quiet period closing a burst of external mutations
    pub debounce_ms: u64,
    /// Move the selection off unavailable values
    pub auto_select: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 40,
            auto_select: true,
        }
    }
}

impl ReconcilerConfig {
    /// Debounce window
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store identifier; falls back to the host globals when absent
    pub store_id: Option<String>,
    /// Stock endpoint
    pub fetch: FetchConfig,
    /// Availability cache
    pub cache: CacheConfig,
    /// Identity discovery
    pub identity: IdentityConfig,
    /// Option control location and marking
    pub selectors: SelectorConfig,
    /// Reconciler behaviour
    pub reconciler: ReconcilerConfig,
}

impl EngineConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from JSON text
    ///
    /// # Errors
    ///
    /// Returns error on malformed JSON or invalid values
    pub fn from_json(text: &str) -> StockmarkResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> StockmarkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Set the store id
    #[must_use]
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    /// Set the stock endpoint base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.fetch.base_url = base_url.into();
        self
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.fetch.token = Some(token.into());
        self
    }

    /// Set attempts, per-attempt timeout and backoff base
    #[must_use]
    pub const fn with_retry(mut self, attempts: u32, timeout_ms: u64, backoff_base_ms: u64) -> Self {
        self.fetch.attempts = attempts;
        self.fetch.timeout_ms = timeout_ms;
        self.fetch.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Set the cache TTL
    #[must_use]
    pub const fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.cache.ttl_ms = ttl_ms;
        self
    }

    /// Check every value that can be wrong
    ///
    /// # Errors
    ///
    /// Returns [`StockmarkError::Config`] naming the first invalid field
    pub fn validate(&self) -> StockmarkResult<()> {
        if self.fetch.attempts == 0 {
            return Err(StockmarkError::config("fetch.attempts must be at least 1"));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(StockmarkError::config("fetch.timeout_ms must be positive"));
        }
        if self.fetch.base_url.trim().is_empty() {
            return Err(StockmarkError::config("fetch.base_url must not be empty"));
        }
        if self.cache.ttl_ms == 0 {
            return Err(StockmarkError::config("cache.ttl_ms must be positive"));
        }
        if self.cache.key_prefix.is_empty() {
            return Err(StockmarkError::config("cache.key_prefix must not be empty"));
        }
        if self.selectors.option_name_attr.is_empty() || self.selectors.value_attr.is_empty() {
            return Err(StockmarkError::config(
                "selectors.option_name_attr and selectors.value_attr must not be empty",
            ));
        }
        if self.identity.product_id_attr.is_empty() {
            return Err(StockmarkError::config("identity.product_id_attr must not be empty"));
        }

        for (field, pattern) in [
            ("identity.request_pattern", &self.identity.request_pattern),
            ("identity.class_pattern", &self.identity.class_pattern),
            ("identity.script_pattern", &self.identity.script_pattern),
        ] {
            compile_pattern(field, pattern)?;
        }

        for (field, selector) in [
            ("identity.product_container", &self.identity.product_container),
            ("selectors.options_container", &self.selectors.options_container),
            ("selectors.fallback_container", &self.selectors.fallback_container),
            ("selectors.control", &self.selectors.control),
        ] {
            parse_selector(field, selector)?;
        }
        for wrapper in &self.selectors.wrappers {
            parse_selector("selectors.wrappers", wrapper)?;
        }
        Ok(())
    }
}

/// Compile a configured pattern, requiring a capture group for the id
pub(crate) fn compile_pattern(field: &str, pattern: &str) -> StockmarkResult<Regex> {
    let regex = Regex::new(pattern)
        .map_err(|e| StockmarkError::config(format!("{field}: {e}")))?;
    if regex.captures_len() < 2 {
        return Err(StockmarkError::config(format!(
            "{field}: pattern needs a capture group"
        )));
    }
    Ok(regex)
}

/// Parse a configured selector, naming the field on failure
pub(crate) fn parse_selector(field: &str, selector: &str) -> StockmarkResult<Selector> {
    Selector::parse(selector).map_err(|e| StockmarkError::config(format!("{field}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.identity.retry_delay_ms, 500);
        assert_eq!(config.identity.retries, 1);
        assert_eq!(config.reconciler.debounce(), Duration::from_millis(40));
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = EngineConfig::from_json(
            r#"{"store_id":"1003","fetch":{"attempts":5},"cache":{"ttl_ms":1000}}"#,
        )
        .unwrap();
        assert_eq!(config.store_id.as_deref(), Some("1003"));
        assert_eq!(config.fetch.attempts, 5);
        assert_eq!(config.fetch.timeout_ms, 8_000);
        assert_eq!(config.cache.ttl_ms, 1_000);
    }

    #[test]
    fn test_backoff_doubles() {
        let fetch = FetchConfig {
            backoff_base_ms: 100,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.backoff(1), Duration::from_millis(100));
        assert_eq!(fetch.backoff(2), Duration::from_millis(200));
        assert_eq!(fetch.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = EngineConfig::new().with_retry(0, 1000, 10);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fetch.attempts"));
    }

    #[test]
    fn test_rejects_pattern_without_group() {
        let mut config = EngineConfig::new();
        config.identity.script_pattern = "productId".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("identity.script_pattern"));
    }

    #[test]
    fn test_rejects_bad_selector() {
        let mut config = EngineConfig::new();
        config.selectors.wrappers.push("div > label".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("selectors.wrappers"));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_store_id("42")
            .with_base_url("http://localhost:9000")
            .with_token("public_abc")
            .with_ttl_ms(5);
        assert_eq!(config.store_id.as_deref(), Some("42"));
        assert_eq!(config.fetch.base_url, "http://localhost:9000");
        assert_eq!(config.fetch.token.as_deref(), Some("public_abc"));
        assert_eq!(config.cache.ttl_ms, 5);
    }
}
