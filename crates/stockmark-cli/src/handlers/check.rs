//! Check command handler

use super::config::load_config;
use super::store::FileStore;
use crate::{CheckArgs, CliError, CliResult};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use stockmark::{
    build, AvailabilityCache, AvailabilityDecision, DurableStore, EngineConfig, ProductIdentity,
    ReqwestTransport, StockClient, SystemClock,
};
use tracing::debug;

/// What `stockmark check` found out about a product
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Product checked
    pub identity: ProductIdentity,
    /// Combinations endpoint
    pub url: String,
    /// Number of combination records
    pub records: usize,
    /// Whether the records came from the cache
    pub cached: bool,
    /// Availability per option value
    pub decision: AvailabilityDecision,
}

/// Fold command-line overrides into the loaded configuration
pub fn apply_overrides(mut config: EngineConfig, args: &CheckArgs) -> CliResult<EngineConfig> {
    if args.store.trim().is_empty() {
        return Err(CliError::invalid_argument("--store must not be empty"));
    }
    if args.product.trim().is_empty() {
        return Err(CliError::invalid_argument("--product must not be empty"));
    }
    if let Some(base_url) = &args.base_url {
        config.fetch.base_url.clone_from(base_url);
    }
    if let Some(token) = &args.token {
        config.fetch.token = Some(token.clone());
    }
    if let Some(attempts) = args.attempts {
        config.fetch.attempts = attempts;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.fetch.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Look up a product's combinations through the cache.
///
/// Unlike the engine, a failed fetch is reported instead of treated as empty.
pub async fn check(
    client: &StockClient,
    cache: &AvailabilityCache,
    identity: ProductIdentity,
) -> CliResult<CheckReport> {
    let url = client.combinations_url(&identity.store_id, &identity.product_id);
    let (records, cached) = match cache.get(&identity.store_id, &identity.product_id) {
        Some(records) => (records, true),
        None => {
            let records = client
                .try_fetch(&identity.store_id, &identity.product_id)
                .await?;
            if !records.is_empty() {
                cache.put(&identity.store_id, &identity.product_id, &records);
            }
            (records, false)
        }
    };
    debug!(%identity, records = records.len(), cached, "check complete");
    Ok(CheckReport {
        decision: build(&records),
        records: records.len(),
        identity,
        url,
        cached,
    })
}

/// Human-readable report
#[must_use]
pub fn render_text(report: &CheckReport) -> String {
    let mut out = String::new();
    let source = if report.cached { "cached" } else { "fetched" };
    let _ = writeln!(
        out,
        "Product {} ({} combinations, {source})",
        report.identity, report.records
    );
    if report.decision.is_empty() {
        out.push_str("  no option data; controls would be left as rendered\n");
        return out;
    }
    for option in report.decision.option_names() {
        let _ = writeln!(out, "  {option}");
        for (value, available) in report.decision.values(option).into_iter().flatten() {
            let verdict = if *available { "available" } else { "unavailable" };
            let _ = writeln!(out, "    {value:<12} {verdict}");
        }
    }
    out
}

/// Execute the check command
pub fn execute_check(args: &CheckArgs) -> CliResult<()> {
    let config = apply_overrides(load_config(args.config.as_deref())?, args)?;
    let durable = args
        .cache_dir
        .as_ref()
        .map(|dir| Arc::new(FileStore::new(dir.clone())) as Arc<dyn DurableStore>);
    let cache = AvailabilityCache::new(durable, Arc::new(SystemClock), config.cache.clone());
    let client = StockClient::new(Arc::new(ReqwestTransport::new()), config.fetch.clone());
    let identity = ProductIdentity::new(args.store.trim(), args.product.trim());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(check(&client, &cache, identity))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;
    use serde_json::json;
    use stockmark::{FetchConfig, HttpResponse, MockReply, MockTransport, StockmarkError};
    use tempfile::TempDir;

    fn check_args(extra: &[&str]) -> CheckArgs {
        let mut argv = vec!["stockmark", "check", "--store", "1003", "--product", "42"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            crate::Commands::Check(args) => args,
            crate::Commands::Config(_) => unreachable!(),
        }
    }

    fn stock() -> MockReply {
        MockReply::respond(HttpResponse::json(&json!([
            {"options": [{"name": "Size", "value": "S"}], "quantity": 0},
            {"options": [{"name": "Size", "value": "M"}], "unlimited": true}
        ])))
    }

    fn client(mock: &MockTransport) -> StockClient {
        StockClient::new(
            Arc::new(mock.clone()),
            FetchConfig {
                base_url: "https://stock.test/api/v3".to_string(),
                attempts: 1,
                ..FetchConfig::default()
            },
        )
    }

    fn file_cache(dir: &TempDir) -> AvailabilityCache {
        AvailabilityCache::new(
            Some(Arc::new(FileStore::new(dir.path())) as Arc<dyn DurableStore>),
            Arc::new(SystemClock),
            EngineConfig::default().cache,
        )
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_overrides_applied() {
            let args = check_args(&["--attempts", "1", "--timeout-ms", "250", "--token", "t"]);
            let config = apply_overrides(EngineConfig::default(), &args).unwrap();
            assert_eq!(config.fetch.attempts, 1);
            assert_eq!(config.fetch.timeout_ms, 250);
            assert_eq!(config.fetch.token.as_deref(), Some("t"));
        }

        #[test]
        fn test_zero_attempts_rejected() {
            let args = check_args(&["--attempts", "0"]);
            assert!(apply_overrides(EngineConfig::default(), &args).is_err());
        }

        #[test]
        fn test_blank_store_rejected() {
            let mut args = check_args(&[]);
            args.store = "  ".to_string();
            assert!(matches!(
                apply_overrides(EngineConfig::default(), &args),
                Err(CliError::InvalidArgument { .. })
            ));
        }
    }

    mod check_tests {
        use super::*;

        #[tokio::test]
        async fn test_second_check_served_from_durable_cache() {
            let temp = TempDir::new().unwrap();
            let mock = MockTransport::new().then(stock());

            let first = check(&client(&mock), &file_cache(&temp), ProductIdentity::new("1003", "42"))
                .await
                .unwrap();
            let second = check(&client(&mock), &file_cache(&temp), ProductIdentity::new("1003", "42"))
                .await
                .unwrap();

            assert!(!first.cached);
            assert!(second.cached);
            assert_eq!(mock.request_count(), 1);
            assert_eq!(second.decision.get("Size", "S"), Some(false));
            assert_eq!(second.decision.get("Size", "M"), Some(true));
            assert_eq!(first.url, "https://stock.test/api/v3/1003/products/42/combinations");
        }

        #[tokio::test]
        async fn test_fetch_failure_is_reported() {
            let temp = TempDir::new().unwrap();
            let mock = MockTransport::new().then(MockReply::respond(HttpResponse::error(403, "no")));
            let err = check(&client(&mock), &file_cache(&temp), ProductIdentity::new("1003", "42"))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                CliError::Stockmark(StockmarkError::ClientStatus { status: 403 })
            ));
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_render_lists_values() {
            let report = CheckReport {
                identity: ProductIdentity::new("1003", "42"),
                url: String::new(),
                records: 2,
                cached: false,
                decision: build(&[
                    stockmark::CombinationRecord::new(&[("Size", "S")]),
                    stockmark::CombinationRecord::new(&[("Size", "M")]).unlimited(),
                ]),
            };
            let text = render_text(&report);
            assert!(text.starts_with("Product 1003/42 (2 combinations, fetched)"));
            assert!(text.contains("    S            unavailable"));
            assert!(text.contains("    M            available"));
        }

        #[test]
        fn test_render_empty() {
            let report = CheckReport {
                identity: ProductIdentity::new("1003", "42"),
                url: String::new(),
                records: 0,
                cached: true,
                decision: AvailabilityDecision::new(),
            };
            assert!(render_text(&report).contains("no option data"));
        }
    }
}
