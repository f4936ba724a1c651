//! DOM reconciler.
//!
//! Applies an [`AvailabilityDecision`] to option controls the host renders and
//! re-renders at will, then keeps it applied. Every write is guarded by a
//! read so a repeated apply is free of mutations, and mutations caused by the
//! reconciler itself are not fed back into its own watcher.
//!
//! The watcher only ever re-applies the decision it already has. Fetching a
//! new decision is the coordinator's job and happens on identity changes.

use crate::config::{parse_selector, ReconcilerConfig, SelectorConfig};
use crate::model::AvailabilityDecision;
use crate::result::StockmarkResult;
use crate::selector::Selector;
use crate::surface::{Mutation, MutationCallback, NodeId, ObserverId, Surface};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// ARIA attribute mirrored onto wrappers
const ARIA_DISABLED: &str = "aria-disabled";

/// A burst longer than this many debounce windows is flushed anyway
const MAX_BURST_WINDOWS: u32 = 10;

/// What a single `apply` pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Controls whose value the decision has an opinion on
    pub controls_matched: usize,
    /// Individual writes performed (state, class or attribute)
    pub writes: usize,
    /// Controls selected by auto-correction
    pub selected: Vec<NodeId>,
}

impl ApplyReport {
    /// Whether the pass left the surface untouched
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.writes == 0 && self.selected.is_empty()
    }
}

#[derive(Debug)]
struct Selectors {
    options_container: Selector,
    fallback_container: Selector,
    control: Selector,
    wrappers: Vec<Selector>,
    option_name_attr: String,
    value_attr: String,
    disabled_class: String,
}

impl Selectors {
    fn from_config(config: &SelectorConfig) -> StockmarkResult<Self> {
        Ok(Self {
            options_container: parse_selector(
                "selectors.options_container",
                &config.options_container,
            )?,
            fallback_container: parse_selector(
                "selectors.fallback_container",
                &config.fallback_container,
            )?,
            control: parse_selector("selectors.control", &config.control)?,
            wrappers: config
                .wrappers
                .iter()
                .map(|w| parse_selector("selectors.wrappers", w))
                .collect::<StockmarkResult<_>>()?,
            option_name_attr: config.option_name_attr.clone(),
            value_attr: config.value_attr.clone(),
            disabled_class: config.disabled_class.clone(),
        })
    }
}

struct WatchState {
    root: NodeId,
    observer: ObserverId,
    task: JoinHandle<()>,
}

struct Shared {
    surface: Arc<dyn Surface>,
    selectors: Selectors,
    auto_select: bool,
    debounce: Duration,
    decision: Mutex<Option<AvailabilityDecision>>,
    /// Nesting depth of the reconciler's own writes
    suppress: AtomicUsize,
    apply_lock: Mutex<()>,
    watch: Mutex<Option<WatchState>>,
    reapplies: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the reconciler's own writes so its watcher ignores them
struct SuppressGuard<'a>(&'a AtomicUsize);

impl<'a> SuppressGuard<'a> {
    fn new(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    fn controls_for(&self, option: &str) -> Vec<NodeId> {
        let surface = &self.surface;
        surface
            .query_all(surface.root(), &self.selectors.control)
            .into_iter()
            .filter(|&node| {
                surface.attribute(node, &self.selectors.option_name_attr).as_deref()
                    == Some(option)
            })
            .collect()
    }

    fn wrapper(&self, control: NodeId) -> Option<NodeId> {
        self.selectors
            .wrappers
            .iter()
            .find_map(|pattern| self.surface.closest(control, pattern))
    }

    fn apply(&self, decision: &AvailabilityDecision) -> ApplyReport {
        let _serial = lock(&self.apply_lock);
        let _suppress = SuppressGuard::new(&self.suppress);
        let mut report = ApplyReport::default();

        for option in decision.option_names() {
            let controls = self.controls_for(option);
            let mut matched = false;
            for &control in &controls {
                let Some(value) = self.surface.attribute(control, &self.selectors.value_attr)
                else {
                    continue;
                };
                let Some(available) = decision.get(option, &value) else {
                    continue;
                };
                matched = true;
                report.controls_matched += 1;
                report.writes += self.mark(control, available);
            }
            if matched && self.auto_select {
                if let Some(selected) = self.auto_correct(&controls) {
                    report.selected.push(selected);
                }
            }
        }

        if !report.is_noop() {
            debug!(
                matched = report.controls_matched,
                writes = report.writes,
                selected = report.selected.len(),
                "availability applied"
            );
        }
        report
    }

    /// Bring one control and its wrapper in line; returns the write count.
    fn mark(&self, control: NodeId, available: bool) -> usize {
        let surface = &self.surface;
        let mut writes = 0;

        if surface.is_disabled(control) == available {
            surface.set_disabled(control, !available);
            writes += 1;
        }

        if let Some(wrapper) = self.wrapper(control) {
            let class = &self.selectors.disabled_class;
            let has_class = surface.has_class(wrapper, class);
            if !available && !has_class {
                surface.add_class(wrapper, class);
                writes += 1;
            } else if available && has_class {
                surface.remove_class(wrapper, class);
                writes += 1;
            }

            let aria = surface.attribute(wrapper, ARIA_DISABLED);
            if !available && aria.as_deref() != Some("true") {
                surface.set_attribute(wrapper, ARIA_DISABLED, "true");
                writes += 1;
            } else if available && aria.is_some() {
                surface.remove_attribute(wrapper, ARIA_DISABLED);
                writes += 1;
            }
        }
        writes
    }

    fn auto_correct(&self, controls: &[NodeId]) -> Option<NodeId> {
        let _suppress = SuppressGuard::new(&self.suppress);
        let surface = &self.surface;
        let checked = controls.iter().copied().find(|&c| surface.is_checked(c));
        if checked.is_some_and(|c| !surface.is_disabled(c)) {
            return None;
        }
        let target = controls
            .iter()
            .copied()
            .find(|&c| surface.is_connected(c) && !surface.is_disabled(c))?;
        debug!(%target, previous = ?checked, "moving selection to an available value");
        surface.select(target);
        Some(target)
    }

    fn reapply(&self) -> Option<ApplyReport> {
        let decision = lock(&self.decision).clone()?;
        let report = self.apply(&decision);
        self.reapplies.fetch_add(1, Ordering::SeqCst);
        Some(report)
    }

    fn watch_root(&self) -> NodeId {
        let surface = &self.surface;
        let root = surface.root();
        surface
            .query(root, &self.selectors.options_container)
            .or_else(|| surface.query(root, &self.selectors.fallback_container))
            .unwrap_or(root)
    }
}

/// Collapse a burst of notifications into one reapply.
async fn debounce_loop(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<()>, window: Duration) {
    while rx.recv().await.is_some() {
        let flush_by = tokio::time::Instant::now() + window * MAX_BURST_WINDOWS;
        loop {
            let wait = window.min(flush_by.saturating_duration_since(tokio::time::Instant::now()));
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(())) if tokio::time::Instant::now() < flush_by => continue,
                Ok(Some(())) | Err(_) => break,
                Ok(None) => return,
            }
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        trace!("external render burst settled; reapplying");
        shared.reapply();
    }
}

/// Keeps option controls in agreement with the latest availability decision
pub struct Reconciler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("selectors", &self.shared.selectors)
            .field("watching", &self.is_watching())
            .field("reapplies", &self.reapply_count())
            .finish()
    }
}

impl Reconciler {
    /// Create a reconciler over a surface
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a selector is invalid
    pub fn new(
        surface: Arc<dyn Surface>,
        selectors: &SelectorConfig,
        config: &ReconcilerConfig,
    ) -> StockmarkResult<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                surface,
                selectors: Selectors::from_config(selectors)?,
                auto_select: config.auto_select,
                debounce: config.debounce(),
                decision: Mutex::new(None),
                suppress: AtomicUsize::new(0),
                apply_lock: Mutex::new(()),
                watch: Mutex::new(None),
                reapplies: AtomicU64::new(0),
            }),
        })
    }

    /// Controls for an option, in document order
    #[must_use]
    pub fn controls_for(&self, option: &str) -> Vec<NodeId> {
        self.shared.controls_for(option)
    }

    /// Apply a decision once.
    ///
    /// Values the decision does not mention are left alone; absent controls
    /// make this a no-op.
    pub fn apply(&self, decision: &AvailabilityDecision) -> ApplyReport {
        self.shared.apply(decision)
    }

    /// Move the selection within a group off a disabled value.
    ///
    /// If the checked control is disabled, or nothing is checked, the first
    /// enabled control in document order is selected with a synthetic user
    /// selection. Returns the control selected, if any.
    pub fn auto_correct_selection(&self, controls: &[NodeId]) -> Option<NodeId> {
        self.shared.auto_correct(controls)
    }

    /// Remember `decision`, apply it, and re-apply it after every burst of
    /// external changes until [`Reconciler::stop`]
    ///
    /// Must be called within a tokio runtime.
    pub fn watch(&self, decision: AvailabilityDecision) -> ApplyReport {
        self.disarm();
        *lock(&self.shared.decision) = Some(decision.clone());
        let report = self.shared.apply(&decision);

        let root = self.shared.watch_root();
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&self.shared);
        let callback: MutationCallback = Arc::new(move |batch: &[Mutation]| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if shared.suppress.load(Ordering::SeqCst) == 0 {
                trace!(mutations = batch.len(), "external mutation");
                let _ = tx.send(());
            }
        });
        let observer = self.shared.surface.observe(root, callback);
        let task = tokio::spawn(debounce_loop(
            Arc::downgrade(&self.shared),
            rx,
            self.shared.debounce,
        ));
        debug!(%root, "watching option controls");
        *lock(&self.shared.watch) = Some(WatchState {
            root,
            observer,
            task,
        });
        report
    }

    /// Re-apply the remembered decision now
    pub fn reapply(&self) -> Option<ApplyReport> {
        self.shared.reapply()
    }

    fn disarm(&self) {
        if let Some(state) = lock(&self.shared.watch).take() {
            self.shared.surface.disconnect(state.observer);
            state.task.abort();
        }
    }

    /// Stop watching and forget the decision
    pub fn stop(&self) {
        self.disarm();
        *lock(&self.shared.decision) = None;
    }

    /// Whether a watcher is armed
    #[must_use]
    pub fn is_watching(&self) -> bool {
        lock(&self.shared.watch).is_some()
    }

    /// Element the watcher observes
    #[must_use]
    pub fn watch_root(&self) -> Option<NodeId> {
        lock(&self.shared.watch).as_ref().map(|w| w.root)
    }

    /// Decision currently remembered
    #[must_use]
    pub fn decision(&self) -> Option<AvailabilityDecision> {
        lock(&self.shared.decision).clone()
    }

    /// Debounced reapply passes run so far
    #[must_use]
    pub fn reapply_count(&self) -> u64 {
        self.shared.reapplies.load(Ordering::SeqCst)
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::{DomElement, DomEvent, DomTree};
    use crate::model::{build, CombinationRecord};

    fn option_row(option: &str, value: &str) -> DomElement {
        DomElement::new("label")
            .with_class("form-control")
            .with_child(DomElement::radio(option, value))
    }

    fn sizes(values: &[&str]) -> Vec<DomElement> {
        values.iter().map(|v| option_row("Size", v)).collect()
    }

    fn page(dom: &DomTree, values: &[&str]) -> NodeId {
        let details = dom.append(dom.root(), DomElement::new("div").with_class("product-details"));
        let container = dom.append(
            details,
            DomElement::new("div").with_class("product-details-module__content"),
        );
        dom.replace_children(container, sizes(values));
        container
    }

    fn decision(pairs: &[(&str, bool)]) -> AvailabilityDecision {
        let records: Vec<CombinationRecord> = pairs
            .iter()
            .map(|(value, available)| {
                CombinationRecord::new(&[("Size", value)]).with_in_stock(*available)
            })
            .collect();
        build(&records)
    }

    fn reconciler(dom: &Arc<DomTree>) -> Reconciler {
        Reconciler::new(
            Arc::clone(dom) as Arc<dyn Surface>,
            &SelectorConfig::default(),
            &ReconcilerConfig::default(),
        )
        .unwrap()
    }

    fn control(dom: &DomTree, value: &str) -> NodeId {
        dom.find(&Selector::parse(&format!("input[value={value}]")).unwrap())
            .unwrap()
    }

    fn wrapper_of(dom: &DomTree, value: &str) -> NodeId {
        dom.closest(control(dom, value), &Selector::tag("label"))
            .unwrap()
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn test_apply_disables_and_marks_wrapper() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M", "L"]);
            dom.set_checked(control(&dom, "S"), true);
            let r = reconciler(&dom);

            let report = r.apply(&decision(&[("S", true), ("M", false), ("L", true)]));

            assert_eq!(report.controls_matched, 3);
            assert!(dom.is_disabled(control(&dom, "M")));
            assert!(!dom.is_disabled(control(&dom, "S")));
            let m = wrapper_of(&dom, "M");
            assert!(dom.has_class(m, "stockmark-unavailable"));
            assert_eq!(dom.attribute(m, "aria-disabled").as_deref(), Some("true"));
            assert!(!dom.has_class(wrapper_of(&dom, "S"), "stockmark-unavailable"));
            assert!(report.selected.is_empty());
        }

        #[test]
        fn test_second_apply_is_mutation_free() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            let r = reconciler(&dom);
            let d = decision(&[("S", false), ("M", true)]);

            let first = r.apply(&d);
            let after_first = dom.mutation_count();
            let second = r.apply(&d);

            assert!(!first.is_noop());
            assert!(second.is_noop());
            assert_eq!(dom.mutation_count(), after_first);
        }

        #[test]
        fn test_unknown_values_untouched() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "XXL"]);
            dom.set_checked(control(&dom, "S"), true);
            let r = reconciler(&dom);

            r.apply(&decision(&[("S", true)]));

            assert!(!dom.is_disabled(control(&dom, "XXL")));
            assert_eq!(dom.attribute(wrapper_of(&dom, "XXL"), "aria-disabled"), None);
        }

        #[test]
        fn test_empty_decision_touches_nothing() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            let before = dom.mutation_count();

            let report = reconciler(&dom).apply(&AvailabilityDecision::new());

            assert!(report.is_noop());
            assert_eq!(dom.mutation_count(), before);
            assert!(dom.events().is_empty());
        }

        #[test]
        fn test_missing_controls_is_noop() {
            let dom = Arc::new(DomTree::new());
            let report = reconciler(&dom).apply(&decision(&[("S", false)]));
            assert_eq!(report, ApplyReport::default());
        }

        #[test]
        fn test_restock_re_enables() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            dom.set_checked(control(&dom, "M"), true);
            let r = reconciler(&dom);

            r.apply(&decision(&[("S", false), ("M", true)]));
            r.apply(&decision(&[("S", true), ("M", true)]));

            assert!(!dom.is_disabled(control(&dom, "S")));
            let s = wrapper_of(&dom, "S");
            assert!(!dom.has_class(s, "stockmark-unavailable"));
            assert_eq!(dom.attribute(s, "aria-disabled"), None);
        }

        #[test]
        fn test_wrapper_patterns_tried_in_order() {
            let dom = Arc::new(DomTree::new());
            let container = page(&dom, &[]);
            dom.append(
                container,
                DomElement::new("label").with_child(
                    DomElement::new("div")
                        .with_class("form-control")
                        .with_child(DomElement::radio("Size", "S")),
                ),
            );
            reconciler(&dom).apply(&decision(&[("S", false)]));

            let inner = dom.closest(control(&dom, "S"), &Selector::class("form-control")).unwrap();
            let outer = dom.closest(control(&dom, "S"), &Selector::tag("label")).unwrap();
            assert!(dom.has_class(inner, "stockmark-unavailable"));
            assert!(!dom.has_class(outer, "stockmark-unavailable"));
        }
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn test_moves_selection_to_first_available_once() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M", "L", "XL"]);
            dom.set_checked(control(&dom, "S"), true);
            let r = reconciler(&dom);

            let report = r.apply(&decision(&[("S", false), ("M", false), ("L", true), ("XL", true)]));

            let l = control(&dom, "L");
            assert_eq!(report.selected, vec![l]);
            assert!(dom.is_checked(l));
            assert!(!dom.is_checked(control(&dom, "S")));
            assert_eq!(
                dom.events(),
                vec![
                    DomEvent::Click { node: l },
                    DomEvent::Input { node: l },
                    DomEvent::Change { node: l },
                ]
            );

            let again = r.apply(&decision(&[("S", false), ("M", false), ("L", true), ("XL", true)]));
            assert!(again.selected.is_empty());
            assert_eq!(dom.events().len(), 3);
        }

        #[test]
        fn test_selects_when_nothing_checked() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            let r = reconciler(&dom);
            let report = r.apply(&decision(&[("S", false), ("M", true)]));
            assert_eq!(report.selected, vec![control(&dom, "M")]);
        }

        #[test]
        fn test_nothing_available_selects_nothing() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            dom.set_checked(control(&dom, "S"), true);
            let report = reconciler(&dom).apply(&decision(&[("S", false), ("M", false)]));
            assert!(report.selected.is_empty());
            assert!(dom.events().is_empty());
        }

        #[test]
        fn test_auto_select_can_be_turned_off() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            dom.set_checked(control(&dom, "S"), true);
            let r = Reconciler::new(
                Arc::clone(&dom) as Arc<dyn Surface>,
                &SelectorConfig::default(),
                &ReconcilerConfig {
                    auto_select: false,
                    ..ReconcilerConfig::default()
                },
            )
            .unwrap();
            let report = r.apply(&decision(&[("S", false), ("M", true)]));
            assert!(report.selected.is_empty());
            assert!(dom.is_checked(control(&dom, "S")));
        }

        #[test]
        fn test_direct_auto_correct() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            let r = reconciler(&dom);
            dom.set_disabled(control(&dom, "S"), true);
            let controls = r.controls_for("Size");
            assert_eq!(r.auto_correct_selection(&controls), Some(control(&dom, "M")));
            assert_eq!(r.auto_correct_selection(&controls), None);
        }
    }

    mod watch_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_rerender_is_reapplied_once_per_burst() {
            let dom = Arc::new(DomTree::new());
            let container = page(&dom, &["S", "M"]);
            dom.set_checked(control(&dom, "M"), true);
            let r = reconciler(&dom);

            r.watch(decision(&[("S", false), ("M", true)]));
            assert_eq!(r.watch_root(), Some(container));
            assert!(dom.is_disabled(control(&dom, "S")));

            // The host re-renders in several small steps.
            dom.replace_children(container, sizes(&["S"]));
            dom.append(container, option_row("Size", "M"));
            dom.set_checked(control(&dom, "M"), true);
            assert!(!dom.is_disabled(control(&dom, "S")));

            tokio::time::sleep(Duration::from_millis(200)).await;

            assert_eq!(r.reapply_count(), 1);
            assert!(dom.is_disabled(control(&dom, "S")));
            assert!(dom.has_class(wrapper_of(&dom, "S"), "stockmark-unavailable"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_own_writes_do_not_retrigger() {
            let dom = Arc::new(DomTree::new());
            page(&dom, &["S", "M"]);
            dom.set_checked(control(&dom, "S"), true);
            let r = reconciler(&dom);

            let report = r.watch(decision(&[("S", false), ("M", true)]));
            assert_eq!(report.selected, vec![control(&dom, "M")]);

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(r.reapply_count(), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unrelated_mutation_reapply_writes_nothing() {
            let dom = Arc::new(DomTree::new());
            let container = page(&dom, &["S", "M"]);
            let r = reconciler(&dom);
            r.watch(decision(&[("S", false), ("M", true)]));

            // Same shape as a batch delivered after the write it reports.
            dom.append(container, DomElement::new("span").with_text("Only 2 left"));
            let before = dom.mutation_count();
            tokio::time::sleep(Duration::from_millis(200)).await;

            assert_eq!(r.reapply_count(), 1);
            assert_eq!(dom.mutation_count(), before);
            assert!(dom.is_disabled(control(&dom, "S")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_falls_back_to_broader_root() {
            let dom = Arc::new(DomTree::new());
            let details =
                dom.append(dom.root(), DomElement::new("div").with_class("product-details"));
            let r = reconciler(&dom);

            r.watch(decision(&[("S", false)]));
            assert_eq!(r.watch_root(), Some(details));

            // Controls show up later; the armed watcher picks them up.
            dom.append(details, option_row("Size", "S"));
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(dom.is_disabled(control(&dom, "S")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_falls_back_to_document() {
            let dom = Arc::new(DomTree::new());
            let r = reconciler(&dom);
            r.watch(decision(&[("S", false)]));
            assert_eq!(r.watch_root(), Some(dom.root()));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stop_disarms() {
            let dom = Arc::new(DomTree::new());
            let container = page(&dom, &["S"]);
            let r = reconciler(&dom);
            r.watch(decision(&[("S", false)]));
            assert_eq!(dom.observer_count(), 1);

            r.stop();
            assert!(!r.is_watching());
            assert_eq!(dom.observer_count(), 0);
            assert_eq!(r.decision(), None);

            dom.replace_children(container, sizes(&["S"]));
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(!dom.is_disabled(control(&dom, "S")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_endless_burst_still_flushes() {
            let dom = Arc::new(DomTree::new());
            let container = page(&dom, &["S"]);
            let r = reconciler(&dom);
            r.watch(decision(&[("S", false)]));

            for _ in 0..40 {
                dom.replace_children(container, sizes(&["S"]));
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            assert!(r.reapply_count() >= 1);
        }
    }
}
