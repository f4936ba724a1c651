//! Two-tier availability cache.
//!
//! The durable tier is a session-scoped key/value text store supplied by the
//! environment; the memory tier is owned by the cache and always written. Any
//! durable-tier failure falls back to memory and is never surfaced.

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::model::CombinationRecord;
use crate::result::{StockmarkError, StockmarkResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Session-scoped key/value text store
pub trait DurableStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns [`StockmarkError::Storage`] if the store cannot be read
    fn get(&self, key: &str) -> StockmarkResult<Option<String>>;

    /// Write a value
    ///
    /// # Errors
    ///
    /// Returns [`StockmarkError::Storage`] on quota or disabled storage
    fn set(&self, key: &str, value: &str) -> StockmarkResult<()>;

    /// Delete a value
    ///
    /// # Errors
    ///
    /// Returns [`StockmarkError::Storage`] if the store cannot be written
    fn remove(&self, key: &str) -> StockmarkResult<()>;
}

/// In-process [`DurableStore`] with a switch to simulate unavailable storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Write raw text, bypassing the failure switch
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    /// Stored keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .lock()
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn check(&self) -> StockmarkResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StockmarkError::storage("storage unavailable"))
        } else {
            Ok(())
        }
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> StockmarkResult<Option<String>> {
        self.check()?;
        let values = self
            .values
            .lock()
            .map_err(|_| StockmarkError::storage("store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StockmarkResult<()> {
        self.check()?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| StockmarkError::storage("store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StockmarkResult<()> {
        self.check()?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| StockmarkError::storage("store lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

fn evict_durable(store: &dyn DurableStore, key: &str, reason: &str) {
    match store.remove(key) {
        Ok(()) => debug!(%key, reason, tier = "durable", "evicted entry"),
        Err(e) => warn!(%key, error = %e, "durable cache eviction failed"),
    }
}

/// Stored form of a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the records were stored (epoch ms)
    pub saved_at_ms: u64,
    /// Schema version the entry was written with
    pub version: u32,
    /// Cached records
    pub records: Vec<CombinationRecord>,
}

/// Short-TTL memoization of stock records keyed by store and product
pub struct AvailabilityCache {
    durable: Option<Arc<dyn DurableStore>>,
    memory: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl std::fmt::Debug for AvailabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityCache")
            .field("durable", &self.durable.is_some())
            .field("memory_entries", &self.memory_len())
            .field("config", &self.config)
            .finish()
    }
}

impl AvailabilityCache {
    /// Create a cache; without a durable store only the memory tier is used
    #[must_use]
    pub fn new(
        durable: Option<Arc<dyn DurableStore>>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            durable,
            memory: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// Durable-tier key for a product
    #[must_use]
    pub fn key(&self, store_id: &str, product_id: &str) -> String {
        format!(
            "{}:v{}:{}:{}",
            self.config.key_prefix, self.config.schema_version, store_id, product_id
        )
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.version == self.config.schema_version
            && self.clock.now_ms().saturating_sub(entry.saved_at_ms) < self.config.ttl_ms
    }

    /// Cached records, if a fresh entry exists in either tier
    #[must_use]
    pub fn get(&self, store_id: &str, product_id: &str) -> Option<Vec<CombinationRecord>> {
        let key = self.key(store_id, product_id);

        if let Some(records) = self.get_durable(&key) {
            debug!(%key, tier = "durable", "cache hit");
            return Some(records);
        }

        let mut memory = self.memory.lock().ok()?;
        if memory.get(&key).map(|entry| self.is_fresh(entry))? {
            debug!(%key, tier = "memory", "cache hit");
            return memory.get(&key).map(|entry| entry.records.clone());
        }
        memory.remove(&key);
        debug!(%key, tier = "memory", "evicted stale entry");
        None
    }

    fn get_durable(&self, key: &str) -> Option<Vec<CombinationRecord>> {
        let store = self.durable.as_ref()?;
        let text = match store.get(key) {
            Ok(text) => text?,
            Err(e) => {
                warn!(%key, error = %e, "durable cache read failed; using memory tier");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&text) {
            Ok(entry) if self.is_fresh(&entry) => Some(entry.records),
            Ok(_) => {
                evict_durable(store.as_ref(), key, "stale");
                None
            }
            Err(e) => {
                debug!(%key, error = %e, "durable cache entry unreadable");
                evict_durable(store.as_ref(), key, "unreadable");
                None
            }
        }
    }

    /// Store records in both tiers
    pub fn put(&self, store_id: &str, product_id: &str, records: &[CombinationRecord]) {
        let key = self.key(store_id, product_id);
        let entry = CacheEntry {
            saved_at_ms: self.clock.now_ms(),
            version: self.config.schema_version,
            records: records.to_vec(),
        };

        if let Some(store) = &self.durable {
            let written = serde_json::to_string(&entry)
                .map_err(StockmarkError::from)
                .and_then(|text| store.set(&key, &text));
            if let Err(e) = written {
                warn!(%key, error = %e, "durable cache write failed; memory tier only");
            }
        }

        if let Ok(mut memory) = self.memory.lock() {
            memory.insert(key, entry);
        }
    }

    /// Drop the volatile tier
    pub fn clear_memory(&self) {
        if let Ok(mut memory) = self.memory.lock() {
            memory.clear();
        }
    }

    /// Number of entries in the memory tier, fresh or not
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.lock().map(|m| m.len()).unwrap_or(0)
    }
}
