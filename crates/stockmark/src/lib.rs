//! Stockmark: keeps a storefront's variant controls in sync with live
//! combination stock.
//!
//! The host storefront renders product pages on its own schedule and owns the
//! DOM. Stockmark works out which product is on screen, fetches that product's
//! combination stock, decides which option values can still be bought, and
//! marks the rest unavailable. It keeps that marking in place across the
//! host's re-renders.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Trigger      │──►│ Identity     │──►│ Cache /     │──►│ Model        │
//! │ Coordinator  │   │ Resolver     │   │ StockClient │   │ Builder      │
//! │ (Engine)     │   └──────────────┘   └─────────────┘   └──────┬───────┘
//! └──────┬───────┘                                               │
//!        │            ┌──────────────┐                           │
//!        └───────────►│ Reconciler   │◄──────────────────────────┘
//!                     │ (Surface)    │
//!                     └──────────────┘
//! ```
//!
//! All page access goes through capability traits ([`Surface`], [`HostPage`],
//! [`Transport`], [`DurableStore`], [`Clock`]) so the engine runs the same
//! against a browser binding or the in-memory [`DomTree`].

#![warn(missing_docs)]

mod cache;
mod client;
mod clock;
mod config;
mod dom;
mod engine;
mod host;
mod identity;
mod model;
mod reconciler;
mod result;
mod selector;
mod surface;
pub mod telemetry;
mod transport;

pub use cache::{AvailabilityCache, CacheEntry, DurableStore, MemoryStore};
pub use client::{parse_records, StockClient};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    CacheConfig, EngineConfig, FetchConfig, IdentityConfig, ReconcilerConfig, SelectorConfig,
};
pub use dom::{DomElement, DomEvent, DomTree};
pub use engine::{Engine, EngineBuilder, EngineHandle, Outcome, RunState, Trigger};
pub use host::{
    HostPage, NoHost, ObservedRequest, PageSignal, RequestLog, StaticHost, PRODUCT_PAGE_TYPE,
};
pub use identity::{IdentityResolver, IdentitySource, ProductIdentity};
pub use model::{build, AvailabilityDecision, CombinationRecord, OptionPair};
pub use reconciler::{ApplyReport, Reconciler};
pub use result::{StockmarkError, StockmarkResult};
pub use selector::{AttrMatch, Matchable, Selector};
pub use surface::{Mutation, MutationCallback, NodeId, ObserverId, Surface};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{
    CapturedRequest, HttpRequest, HttpResponse, MockReply, MockTransport, Transport,
    TransportFailure,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        AvailabilityDecision, DomElement, DomTree, Engine, EngineConfig, MockReply, MockTransport,
        Outcome, PageSignal, ProductIdentity, Selector, StockClient, StockmarkError,
        StockmarkResult, Surface, Trigger,
    };
}
