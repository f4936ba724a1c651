//! Stock data client.
//!
//! Fetches combination records for a product with a per-attempt timeout and
//! exponential backoff. [`StockClient::fetch`] never fails: callers only ever
//! see records or an empty list, and the cause of an empty list is logged.

use crate::config::FetchConfig;
use crate::model::CombinationRecord;
use crate::result::{StockmarkError, StockmarkResult};
use crate::transport::{HttpRequest, Transport, TransportFailure};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Client for the combinations endpoint
#[derive(Clone)]
pub struct StockClient {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
}

impl std::fmt::Debug for StockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockClient")
            .field("base_url", &self.config.base_url)
            .field("attempts", &self.config.attempts)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl StockClient {
    /// Create a client over a transport
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Endpoint URL for a product's combinations
    #[must_use]
    pub fn combinations_url(&self, store_id: &str, product_id: &str) -> String {
        format!(
            "{}/{}/products/{}/combinations",
            self.config.base_url.trim_end_matches('/'),
            store_id,
            product_id
        )
    }

    /// Fetch combination records, degrading every failure to an empty list
    pub async fn fetch(&self, store_id: &str, product_id: &str) -> Vec<CombinationRecord> {
        match self.try_fetch(store_id, product_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(store_id, product_id, error = %e, "stock fetch failed; treating as no data");
                Vec::new()
            }
        }
    }

    /// Fetch combination records, reporting the final failure
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once attempts are exhausted, or
    /// the first client error (4xx), which is never retried
    pub async fn try_fetch(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> StockmarkResult<Vec<CombinationRecord>> {
        let request = HttpRequest {
            url: self.combinations_url(store_id, product_id),
            bearer: self.config.token.clone().filter(|t| !t.is_empty()),
        };
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(request.clone()).await {
                Ok(records) => {
                    debug!(
                        store_id,
                        product_id,
                        attempt,
                        records = records.len(),
                        "stock fetched"
                    );
                    return Ok(records);
                }
                Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
                Err(e) => {
                    let wait = self.config.backoff(attempt);
                    debug!(
                        store_id,
                        product_id,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "stock attempt failed; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, request: HttpRequest) -> StockmarkResult<Vec<CombinationRecord>> {
        let timeout = self.config.timeout();
        let response = match tokio::time::timeout(timeout, self.transport.get(request)).await {
            Err(_) => {
                return Err(StockmarkError::Timeout {
                    ms: self.config.timeout_ms,
                })
            }
            Ok(Err(TransportFailure::TimedOut)) => {
                return Err(StockmarkError::Timeout {
                    ms: self.config.timeout_ms,
                })
            }
            Ok(Err(failure)) => return Err(StockmarkError::transport(failure.message())),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(StockmarkError::from_status(response.status));
        }
        parse_records(&response.body)
    }
}

/// Interpret a response body: a bare array, or an object with an `items`
/// array. Any other shape is zero records; malformed items are skipped.
///
/// # Errors
///
/// Returns [`StockmarkError::Decode`] if the body is not JSON at all
pub fn parse_records(body: &[u8]) -> StockmarkResult<Vec<CombinationRecord>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| StockmarkError::Decode {
        message: e.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
