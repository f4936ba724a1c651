//! Product identity resolution.
//!
//! The host never states "this is product X" in one reliable place, so the
//! resolver tries several weak signals in a fixed order and takes the first
//! one that yields an id.

use crate::config::{compile_pattern, parse_selector, IdentityConfig};
use crate::host::{HostPage, RequestLog};
use crate::result::StockmarkResult;
use crate::selector::Selector;
use crate::surface::Surface;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A product scoped to its store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductIdentity {
    /// Store identifier
    pub store_id: String,
    /// Product identifier within the store
    pub product_id: String,
}

impl ProductIdentity {
    /// Create an identity
    #[must_use]
    pub fn new(store_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl fmt::Display for ProductIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.product_id)
    }
}

/// Which signal produced a product id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentitySource {
    /// A catalog request issued by the host page
    ObservedRequest,
    /// A class name on the product container
    ContainerClass,
    /// A declared data attribute
    DataAttribute,
    /// An inline script payload
    InlineScript,
    /// Host-exposed globals
    HostGlobals,
}

/// Resolves the current product from page signals
pub struct IdentityResolver {
    surface: Arc<dyn Surface>,
    host: Arc<dyn HostPage>,
    requests: RequestLog,
    store_id: Option<String>,
    request_pattern: Regex,
    product_container: Selector,
    class_pattern: Regex,
    product_id_attr: String,
    script_pattern: Regex,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("store_id", &self.store_id)
            .field("request_pattern", &self.request_pattern.as_str())
            .field("product_container", &self.product_container.to_string())
            .field("product_id_attr", &self.product_id_attr)
            .finish()
    }
}

impl IdentityResolver {
    /// Create a resolver
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern or selector is invalid
    pub fn new(
        surface: Arc<dyn Surface>,
        host: Arc<dyn HostPage>,
        requests: RequestLog,
        store_id: Option<String>,
        config: &IdentityConfig,
    ) -> StockmarkResult<Self> {
        Ok(Self {
            surface,
            host,
            requests,
            store_id,
            request_pattern: compile_pattern("identity.request_pattern", &config.request_pattern)?,
            product_container: parse_selector(
                "identity.product_container",
                &config.product_container,
            )?,
            class_pattern: compile_pattern("identity.class_pattern", &config.class_pattern)?,
            product_id_attr: config.product_id_attr.clone(),
            script_pattern: compile_pattern("identity.script_pattern", &config.script_pattern)?,
        })
    }

    /// Request log the resolver reads observed requests from
    #[must_use]
    pub const fn requests(&self) -> &RequestLog {
        &self.requests
    }

    /// Product id carried by a request URL, if it is a catalog request
    #[must_use]
    pub fn product_id_in_url(&self, url: &str) -> Option<String> {
        first_capture(&self.request_pattern, url)
    }

    /// Store id from configuration, else from the host
    #[must_use]
    pub fn store_id(&self) -> Option<String> {
        self.store_id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.host.store_id())
            .filter(|s| !s.is_empty())
    }

    /// Resolve the current product, or `None` if not yet determinable
    #[must_use]
    pub fn resolve(&self) -> Option<ProductIdentity> {
        self.resolve_with_source()
            .map(|(identity, _)| identity)
    }

    /// Resolve and report which signal produced the id
    #[must_use]
    pub fn resolve_with_source(&self) -> Option<(ProductIdentity, IdentitySource)> {
        let store_id = self.store_id()?;
        let (product_id, source) = self.product_id()?;
        trace!(%store_id, %product_id, ?source, "identity resolved");
        Some((ProductIdentity::new(store_id, product_id), source))
    }

    fn product_id(&self) -> Option<(String, IdentitySource)> {
        self.from_requests()
            .map(|id| (id, IdentitySource::ObservedRequest))
            .or_else(|| {
                self.from_container_class()
                    .map(|id| (id, IdentitySource::ContainerClass))
            })
            .or_else(|| {
                self.from_data_attribute()
                    .map(|id| (id, IdentitySource::DataAttribute))
            })
            .or_else(|| {
                self.from_inline_scripts()
                    .map(|id| (id, IdentitySource::InlineScript))
            })
            .or_else(|| {
                self.host
                    .product_id()
                    .filter(|id| !id.is_empty())
                    .map(|id| (id, IdentitySource::HostGlobals))
            })
    }

    fn from_requests(&self) -> Option<String> {
        self.requests
            .newest_first()
            .iter()
            .find_map(|r| self.product_id_in_url(&r.url))
    }

    fn from_container_class(&self) -> Option<String> {
        let root = self.surface.root();
        self.surface
            .query_all(root, &self.product_container)
            .into_iter()
            .flat_map(|node| self.surface.class_names(node))
            .find_map(|class| first_capture(&self.class_pattern, &class))
    }

    fn from_data_attribute(&self) -> Option<String> {
        let root = self.surface.root();
        let selector = Selector::attr(&self.product_id_attr);
        self.surface
            .query_all(root, &selector)
            .into_iter()
            .filter_map(|node| self.surface.attribute(node, &self.product_id_attr))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    fn from_inline_scripts(&self) -> Option<String> {
        let root = self.surface.root();
        self.surface
            .query_all(root, &Selector::tag("script"))
            .into_iter()
            .filter(|&node| self.surface.attribute(node, "src").is_none())
            .find_map(|node| first_capture(&self.script_pattern, &self.surface.text(node)))
    }
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)?
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}
