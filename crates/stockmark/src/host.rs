//! Host storefront capabilities.
//!
//! The host exposes three things the engine may use: a page-lifecycle signal,
//! optional globals describing the store and product, and the outbound
//! requests its own catalog code issues. Each is modelled explicitly so a
//! missing capability is a plain `None` rather than a failed property lookup.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Page type tag the host uses for product pages
pub const PRODUCT_PAGE_TYPE: &str = "PRODUCT";

/// Globals a host page may expose
pub trait HostPage: Send + Sync {
    /// Store identifier, if the host exposes one
    fn store_id(&self) -> Option<String>;

    /// Identifier of the product currently displayed, if exposed
    fn product_id(&self) -> Option<String>;
}

/// Host that exposes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHost;

impl HostPage for NoHost {
    fn store_id(&self) -> Option<String> {
        None
    }

    fn product_id(&self) -> Option<String> {
        None
    }
}

/// Host with fixed, mutable globals
#[derive(Debug, Default)]
pub struct StaticHost {
    store_id: Mutex<Option<String>>,
    product_id: Mutex<Option<String>>,
}

impl StaticHost {
    /// Create a host exposing a store id
    #[must_use]
    pub fn new(store_id: Option<&str>) -> Self {
        Self {
            store_id: Mutex::new(store_id.map(str::to_string)),
            product_id: Mutex::new(None),
        }
    }

    /// Replace the exposed product id
    pub fn set_product_id(&self, product_id: Option<&str>) {
        if let Ok(mut current) = self.product_id.lock() {
            *current = product_id.map(str::to_string);
        }
    }
}

impl HostPage for StaticHost {
    fn store_id(&self) -> Option<String> {
        self.store_id.lock().ok().and_then(|s| s.clone())
    }

    fn product_id(&self) -> Option<String> {
        self.product_id.lock().ok().and_then(|p| p.clone())
    }
}

/// "Page rendered" notification from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignal {
    /// Page type tag, e.g. `PRODUCT` or `CATEGORY`
    pub page_type: Option<String>,
    /// Product id carried by product page signals; may be stale
    pub product_id: Option<String>,
}

impl PageSignal {
    /// Signal for a product page
    #[must_use]
    pub fn product(product_id: Option<&str>) -> Self {
        Self {
            page_type: Some(PRODUCT_PAGE_TYPE.to_string()),
            product_id: product_id.map(str::to_string),
        }
    }

    /// Signal for any other page type
    #[must_use]
    pub fn other(page_type: &str) -> Self {
        Self {
            page_type: Some(page_type.to_string()),
            product_id: None,
        }
    }

    /// Whether the signal denotes a product page
    #[must_use]
    pub fn is_product(&self) -> bool {
        self.page_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(PRODUCT_PAGE_TYPE))
    }
}

/// An outbound request the host page issued itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRequest {
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
}

impl ObservedRequest {
    /// A GET request to `url`
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
        }
    }
}

/// Bounded log of observed host requests, newest last
#[derive(Debug, Clone)]
pub struct RequestLog {
    requests: Arc<Mutex<Vec<ObservedRequest>>>,
    capacity: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(32)
    }
}

impl RequestLog {
    /// Create a log keeping at most `capacity` requests
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Record a request, evicting the oldest beyond capacity
    pub fn record(&self, request: ObservedRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
            let overflow = requests.len().saturating_sub(self.capacity);
            requests.drain(..overflow);
        }
    }

    /// Requests newest first
    #[must_use]
    pub fn newest_first(&self) -> Vec<ObservedRequest> {
        self.requests
            .lock()
            .map(|r| r.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of recorded requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether nothing is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only requests matching `keep`; returns how many were dropped
    pub fn retain(&self, keep: impl FnMut(&ObservedRequest) -> bool) -> usize {
        self.requests.lock().map_or(0, |mut requests| {
            let before = requests.len();
            requests.retain(keep);
            before - requests.len()
        })
    }

    /// Forget every recorded request
    pub fn clear(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.clear();
        }
    }
}
