//! Trigger coordinator.
//!
//! Several unreliable signals announce "this may be a product page": host
//! page-load events, catalog requests the page issues, and option containers
//! appearing in the document. Any of them can arrive in any order, repeatedly,
//! or not at all. The [`Engine`] turns them into at most one reconciliation
//! run per product view.
//!
//! ```text
//! Idle ──trigger──▶ Resolving ──identity──▶ Fetching ──records──▶ Reconciled
//!   ▲                   │                                             │
//!   └──undetermined─────┘                                             │
//!   └──────────────────────────navigation away────────────────────────┘
//! ```

use crate::cache::{AvailabilityCache, DurableStore};
use crate::client::StockClient;
use crate::clock::{Clock, SystemClock};
use crate::config::{parse_selector, EngineConfig};
use crate::host::{HostPage, NoHost, ObservedRequest, PageSignal, RequestLog};
use crate::identity::{IdentityResolver, ProductIdentity};
use crate::model::{build, AvailabilityDecision};
use crate::reconciler::Reconciler;
use crate::result::StockmarkResult;
use crate::selector::Selector;
use crate::surface::{Mutation, MutationCallback, NodeId, ObserverId, Surface};
use crate::transport::Transport;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

/// An event that may start a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The host finished a page transition
    PageLoaded(PageSignal),
    /// The page issued a network request
    RequestObserved(ObservedRequest),
    /// An option container appeared in the document
    ContainerDiscovered(NodeId),
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunState {
    /// No product context
    Idle,
    /// Looking for a product identity
    Resolving,
    /// Stock request in flight
    Fetching,
    /// A decision is applied and watched
    Reconciled,
}

/// What handling one trigger led to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// A decision was built and applied
    Reconciled {
        /// Product reconciled
        identity: ProductIdentity,
        /// Number of option groups in the decision
        options: usize,
    },
    /// A run for the same product was already in flight
    Coalesced,
    /// The product was already reconciled; its decision was applied again
    Reapplied,
    /// A newer run or a navigation made this run's result obsolete
    Superseded,
    /// No product identity could be found
    IdentityUndetermined,
    /// The host left product pages
    NavigatedAway,
    /// The container had already been handled this session
    AlreadyProcessed,
    /// The trigger carried nothing relevant
    Ignored,
}

#[derive(Debug)]
struct Session {
    state: RunState,
    /// Bumped when a fetch starts or the page navigates away
    generation: u64,
    /// Bumped on navigation away only
    epoch: u64,
    current: Option<ProductIdentity>,
    in_flight: Option<ProductIdentity>,
    decision: Option<AvailabilityDecision>,
    processed: HashSet<NodeId>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            generation: 0,
            epoch: 0,
            current: None,
            in_flight: None,
            decision: None,
            processed: HashSet::new(),
        }
    }
}

enum Step {
    Done(Outcome),
    Fetch(u64),
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: EngineConfig,
    surface: Arc<dyn Surface>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostPage>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    requests: RequestLog,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("durable", &self.durable.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Host globals to fall back on
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostPage>) -> Self {
        self.host = host;
        self
    }

    /// Durable cache tier
    #[must_use]
    pub fn durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Clock for cache freshness
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a request log with whatever intercepts page requests
    #[must_use]
    pub fn request_log(mut self, requests: RequestLog) -> Self {
        self.requests = requests;
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration does not validate
    pub fn build(self) -> StockmarkResult<Engine> {
        let config = self.config;
        config.validate()?;

        let resolver = IdentityResolver::new(
            Arc::clone(&self.surface),
            self.host,
            self.requests,
            config.store_id.clone(),
            &config.identity,
        )?;
        let reconciler = Reconciler::new(
            Arc::clone(&self.surface),
            &config.selectors,
            &config.reconciler,
        )?;
        let containers = vec![
            parse_selector("selectors.options_container", &config.selectors.options_container)?,
            parse_selector("selectors.fallback_container", &config.selectors.fallback_container)?,
        ];

        Ok(Engine {
            client: StockClient::new(self.transport, config.fetch.clone()),
            cache: AvailabilityCache::new(self.durable, self.clock, config.cache.clone()),
            surface: self.surface,
            resolver,
            reconciler,
            containers,
            session: Mutex::new(Session::new()),
            config,
        })
    }
}

/// Coordinates identity, stock, cache and reconciler for one page session
pub struct Engine {
    config: EngineConfig,
    surface: Arc<dyn Surface>,
    resolver: IdentityResolver,
    client: StockClient,
    cache: AvailabilityCache,
    reconciler: Reconciler,
    containers: Vec<Selector>,
    session: Mutex<Session>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("current", &self.current_identity())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    /// Start building an engine over a surface and a transport
    #[must_use]
    pub fn builder(
        config: EngineConfig,
        surface: Arc<dyn Surface>,
        transport: Arc<dyn Transport>,
    ) -> EngineBuilder {
        EngineBuilder {
            config,
            surface,
            transport,
            host: Arc::new(NoHost),
            durable: None,
            clock: Arc::new(SystemClock),
            requests: RequestLog::default(),
        }
    }

    /// Effective configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RunState {
        lock(&self.session).state
    }

    /// Product last reconciled in this view
    #[must_use]
    pub fn current_identity(&self) -> Option<ProductIdentity> {
        lock(&self.session).current.clone()
    }

    /// Decision last applied in this view
    #[must_use]
    pub fn decision(&self) -> Option<AvailabilityDecision> {
        lock(&self.session).decision.clone()
    }

    /// Whether a container has already triggered a run
    #[must_use]
    pub fn is_processed(&self, container: NodeId) -> bool {
        lock(&self.session).processed.contains(&container)
    }

    /// Log of observed page requests
    #[must_use]
    pub const fn requests(&self) -> &RequestLog {
        self.resolver.requests()
    }

    /// The availability cache
    #[must_use]
    pub const fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// The reconciler
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Handle one trigger to completion. Never fails; on any failure the
    /// page is left as the host rendered it.
    pub async fn handle(&self, trigger: Trigger) -> Outcome {
        let outcome = match trigger {
            Trigger::PageLoaded(signal) => {
                if signal.is_product() {
                    if let Some(product_id) = signal.product_id.as_deref() {
                        self.forget_other_products(product_id);
                    }
                    self.run(signal.product_id).await
                } else {
                    self.navigate_away();
                    Outcome::NavigatedAway
                }
            }
            Trigger::RequestObserved(request) => {
                let hint = self.resolver.product_id_in_url(&request.url);
                self.resolver.requests().record(request);
                match hint {
                    Some(product_id) => self.run(Some(product_id)).await,
                    None => Outcome::Ignored,
                }
            }
            Trigger::ContainerDiscovered(container) => {
                if lock(&self.session).processed.insert(container) {
                    self.run(None).await
                } else {
                    Outcome::AlreadyProcessed
                }
            }
        };
        debug!(?outcome, "trigger handled");
        outcome
    }

    fn navigate_away(&self) {
        let mut session = lock(&self.session);
        session.generation += 1;
        session.epoch += 1;
        session.state = RunState::Idle;
        session.current = None;
        session.in_flight = None;
        session.decision = None;
        self.reconciler.stop();
        self.resolver.requests().clear();
        debug!(generation = session.generation, "left product context");
    }

    /// Drop captured requests naming another product once the host reports a
    /// product page for a product other than the one shown.
    fn forget_other_products(&self, product_id: &str) {
        let shown = {
            let session = lock(&self.session);
            session
                .in_flight
                .as_ref()
                .or(session.current.as_ref())
                .map(|identity| identity.product_id.clone())
        };
        match shown {
            Some(shown) if shown != product_id => {}
            _ => return,
        }
        let dropped = self.resolver.requests().retain(|request| {
            self.resolver
                .product_id_in_url(&request.url)
                .map_or(true, |id| id == product_id)
        });
        if dropped > 0 {
            debug!(dropped, product_id, "dropped requests for previous product");
        }
    }

    async fn run(&self, hint: Option<String>) -> Outcome {
        let epoch = {
            let mut session = lock(&self.session);
            if session.state == RunState::Idle {
                session.state = RunState::Resolving;
            }
            session.epoch
        };

        let Some(identity) = self.resolve(hint.as_deref()).await else {
            let mut session = lock(&self.session);
            if session.epoch == epoch && session.state == RunState::Resolving {
                session.state = RunState::Idle;
            }
            info!("product identity undetermined; giving up on this trigger");
            return Outcome::IdentityUndetermined;
        };

        let generation = match self.claim(&identity, epoch) {
            Step::Done(outcome) => return outcome,
            Step::Fetch(generation) => generation,
        };

        let records = match self.cache.get(&identity.store_id, &identity.product_id) {
            Some(records) => {
                debug!(%identity, records = records.len(), "stock served from cache");
                records
            }
            None => {
                let records = self
                    .client
                    .fetch(&identity.store_id, &identity.product_id)
                    .await;
                if !records.is_empty() {
                    self.cache
                        .put(&identity.store_id, &identity.product_id, &records);
                }
                records
            }
        };
        let decision = build(&records);

        let mut session = lock(&self.session);
        if session.generation != generation {
            debug!(%identity, "discarding superseded stock result");
            return Outcome::Superseded;
        }
        let options = decision.option_names().count();
        self.reconciler.watch(decision.clone());
        session.state = RunState::Reconciled;
        session.in_flight = None;
        session.current = Some(identity.clone());
        session.decision = Some(decision);
        info!(%identity, options, records = records.len(), "availability reconciled");
        Outcome::Reconciled { identity, options }
    }

    /// Decide whether a resolved identity needs a fetch.
    fn claim(&self, identity: &ProductIdentity, epoch: u64) -> Step {
        let mut session = lock(&self.session);
        if session.epoch != epoch {
            return Step::Done(Outcome::Superseded);
        }

        if session.in_flight.as_ref() == Some(identity) {
            if session.current.as_ref() == Some(identity) {
                if let Some(decision) = &session.decision {
                    self.reconciler.apply(decision);
                }
            }
            debug!(%identity, "run already in flight");
            return Step::Done(Outcome::Coalesced);
        }

        if session.in_flight.is_none() && session.current.as_ref() == Some(identity) {
            if let Some(decision) = session.decision.clone() {
                self.reconciler.watch(decision);
                session.state = RunState::Reconciled;
                debug!(%identity, "re-applying known decision");
                return Step::Done(Outcome::Reapplied);
            }
        }

        if let Some(previous) = &session.in_flight {
            debug!(%previous, next = %identity, "superseding in-flight run");
        }
        // The previous product's decision must not reach the next product's controls.
        if let Some(previous) = session.current.take() {
            debug!(%previous, next = %identity, "leaving previous product");
            self.reconciler.stop();
            session.decision = None;
        }
        session.generation += 1;
        session.in_flight = Some(identity.clone());
        session.state = RunState::Fetching;
        Step::Fetch(session.generation)
    }

    async fn resolve(&self, hint: Option<&str>) -> Option<ProductIdentity> {
        let retries = self.config.identity.retries;
        for attempt in 0..=retries {
            if let Some(identity) = self.resolver.resolve() {
                return Some(identity);
            }
            let hinted = hint
                .filter(|id| !id.is_empty())
                .zip(self.resolver.store_id())
                .map(|(product_id, store_id)| ProductIdentity::new(store_id, product_id));
            if hinted.is_some() {
                return hinted;
            }
            if attempt < retries {
                debug!(attempt, "identity not yet available; waiting");
                tokio::time::sleep(self.config.identity.retry_delay()).await;
            }
        }
        None
    }

    /// Option containers in the document no run has claimed yet
    fn unseen_containers(&self) -> Vec<NodeId> {
        let root = self.surface.root();
        let mut found: Vec<NodeId> = self
            .containers
            .iter()
            .flat_map(|selector| self.surface.query_all(root, selector))
            .collect();
        found.sort_unstable();
        found.dedup();
        let session = lock(&self.session);
        found.retain(|node| !session.processed.contains(node));
        found
    }

    /// Wire the engine to its event sources.
    ///
    /// Observes the whole document for new option containers and runs every
    /// trigger sent through the returned handle on its own task. Must be
    /// called within a tokio runtime.
    pub fn attach(self: &Arc<Self>) -> EngineHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        let scan = tx.clone();
        let callback: MutationCallback = Arc::new(move |batch: &[Mutation]| {
            if batch.iter().any(|m| matches!(m, Mutation::ChildList { .. })) {
                let _ = scan.send(Dispatch::Scan);
            }
        });
        let observer = self.surface.observe(self.surface.root(), callback);
        let _ = tx.send(Dispatch::Scan);

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut runs = JoinSet::new();
            while let Some(message) = rx.recv().await {
                while runs.try_join_next().is_some() {}
                let triggers = match message {
                    Dispatch::Trigger(trigger) => vec![trigger],
                    Dispatch::Scan => engine
                        .unseen_containers()
                        .into_iter()
                        .map(Trigger::ContainerDiscovered)
                        .collect(),
                };
                for trigger in triggers {
                    let engine = Arc::clone(&engine);
                    runs.spawn(async move { engine.handle(trigger).await });
                }
            }
        });

        EngineHandle {
            surface: Arc::clone(&self.surface),
            tx,
            observer,
            task,
        }
    }
}

enum Dispatch {
    Trigger(Trigger),
    Scan,
}

/// Connection between an attached [`Engine`] and its event sources
pub struct EngineHandle {
    surface: Arc<dyn Surface>,
    tx: mpsc::UnboundedSender<Dispatch>,
    observer: ObserverId,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("observer", &self.observer)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl EngineHandle {
    /// Queue a trigger; returns `false` once detached
    pub fn send(&self, trigger: Trigger) -> bool {
        self.tx.send(Dispatch::Trigger(trigger)).is_ok()
    }

    /// Stop observing and cancel runs still in progress
    pub fn detach(self) {
        self.surface.disconnect(self.observer);
        self.task.abort();
    }
}
