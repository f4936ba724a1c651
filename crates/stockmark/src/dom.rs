//! In-memory DOM surface.
//!
//! [`DomTree`] implements [`Surface`] without a browser so the reconciler and
//! identity resolver can be exercised deterministically. It behaves like a
//! browser `MutationObserver` would: every write records a mutation, even one
//! that leaves the value unchanged, so idempotence has to come from the caller.

use crate::selector::{Matchable, Selector};
use crate::surface::{Mutation, MutationCallback, NodeId, ObserverId, Surface};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Element description used to build trees
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomElement {
    /// Element tag name
    pub tag: String,
    /// Own text content
    pub text_content: String,
    /// Element attributes
    pub attributes: HashMap<String, String>,
    /// CSS classes
    pub classes: Vec<String>,
    /// Initial checked state for choice controls
    pub checked: bool,
    /// Child elements
    pub children: Vec<DomElement>,
}

impl DomElement {
    /// Creates a new element with the given tag
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Creates a radio input for an option value
    #[must_use]
    pub fn radio(option: &str, value: &str) -> Self {
        Self::new("input")
            .with_attr("type", "radio")
            .with_attr("name", option)
            .with_attr("value", value)
    }

    /// Sets the text content
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text_content = text.to_string();
        self
    }

    /// Adds a class
    #[must_use]
    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    /// Sets an attribute
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Marks a choice control as selected
    #[must_use]
    pub const fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    /// Adds a child element
    #[must_use]
    pub fn with_child(mut self, child: DomElement) -> Self {
        self.children.push(child);
        self
    }
}

/// Events dispatched by synthetic user interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    /// Click on an element
    Click {
        /// Clicked element
        node: NodeId,
    },
    /// Input event on a form control
    Input {
        /// Target control
        node: NodeId,
    },
    /// Change event on a form control
    Change {
        /// Target control
        node: NodeId,
    },
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    text: String,
    attributes: HashMap<String, String>,
    classes: Vec<String>,
    checked: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    connected: bool,
}

impl Matchable for NodeData {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        if name == "class" {
            return None;
        }
        self.attributes.get(name).map(String::as_str)
    }
}

struct Observer {
    id: ObserverId,
    root: NodeId,
    callback: MutationCallback,
}

struct Inner {
    nodes: Vec<NodeData>,
    observers: Vec<Observer>,
    next_observer: u64,
    events: Vec<DomEvent>,
    mutations: Vec<Mutation>,
}

impl Inner {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    fn insert(&mut self, parent: NodeId, element: DomElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        let connected = self.node(parent).is_some_and(|p| p.connected);
        self.nodes.push(NodeData {
            tag: element.tag,
            text: element.text_content,
            attributes: element.attributes,
            classes: element.classes,
            checked: element.checked,
            parent: Some(parent),
            children: Vec::new(),
            connected,
        });
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        for child in element.children {
            self.insert(id, child);
        }
        id
    }

    fn detach_subtree(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => {
                node.connected = false;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            self.detach_subtree(child);
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.node(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn collect(&self, scope: NodeId, selector: &Selector, out: &mut Vec<NodeId>) {
        let Some(node) = self.node(scope) else {
            return;
        };
        for &child in &node.children {
            if self.node(child).is_some_and(|c| selector.matches(c)) {
                out.push(child);
            }
            self.collect(child, selector, out);
        }
    }

    fn text_of(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for &child in &node.children {
                self.text_of(child, out);
            }
        }
    }

    /// Record mutations and return the callbacks that must see them.
    fn record(&mut self, batch: &[Mutation]) -> Vec<MutationCallback> {
        self.mutations.extend_from_slice(batch);
        self.observers
            .iter()
            .filter(|o| {
                batch
                    .iter()
                    .any(|m| self.is_inclusive_ancestor(o.root, m.target()))
            })
            .map(|o| MutationCallback::clone(&o.callback))
            .collect()
    }
}

/// Thread-safe in-memory document implementing [`Surface`]
pub struct DomTree {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for DomTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DomTree")
            .field("nodes", &inner.nodes.len())
            .field("observers", &inner.observers.len())
            .field("events", &inner.events.len())
            .field("mutations", &inner.mutations.len())
            .finish()
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Creates a document with an empty `html` root
    #[must_use]
    pub fn new() -> Self {
        let root = NodeData {
            tag: "html".to_string(),
            text: String::new(),
            attributes: HashMap::new(),
            classes: Vec::new(),
            checked: false,
            parent: None,
            children: Vec::new(),
            connected: true,
        };
        Self {
            inner: Mutex::new(Inner {
                nodes: vec![root],
                observers: Vec::new(),
                next_observer: 1,
                events: Vec::new(),
                mutations: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a change under the lock, then notify observers outside it so
    /// callbacks may read the tree.
    fn mutate<T>(&self, change: impl FnOnce(&mut Inner) -> (T, Vec<Mutation>)) -> T {
        let (value, batch, callbacks) = {
            let mut inner = self.lock();
            let (value, batch) = change(&mut inner);
            let callbacks = if batch.is_empty() {
                Vec::new()
            } else {
                inner.record(&batch)
            };
            (value, batch, callbacks)
        };
        for callback in callbacks {
            callback(&batch);
        }
        value
    }

    /// Append an element tree under `parent`
    pub fn append(&self, parent: NodeId, element: DomElement) -> NodeId {
        self.mutate(|inner| {
            let id = inner.insert(parent, element);
            (id, vec![Mutation::ChildList { target: parent }])
        })
    }

    /// Replace every child of `parent`, the way a host re-render does
    pub fn replace_children(&self, parent: NodeId, elements: Vec<DomElement>) -> Vec<NodeId> {
        self.mutate(|inner| {
            let old = inner
                .node_mut(parent)
                .map(|p| std::mem::take(&mut p.children))
                .unwrap_or_default();
            for child in old {
                if let Some(node) = inner.node_mut(child) {
                    node.parent = None;
                }
                inner.detach_subtree(child);
            }
            let ids = elements
                .into_iter()
                .map(|element| inner.insert(parent, element))
                .collect();
            (ids, vec![Mutation::ChildList { target: parent }])
        })
    }

    /// Detach a node and its subtree
    pub fn remove(&self, node: NodeId) {
        self.mutate(|inner| {
            let parent = inner.node(node).and_then(|n| n.parent);
            let Some(parent) = parent else {
                return ((), Vec::new());
            };
            if let Some(p) = inner.node_mut(parent) {
                p.children.retain(|&c| c != node);
            }
            if let Some(n) = inner.node_mut(node) {
                n.parent = None;
            }
            inner.detach_subtree(node);
            ((), vec![Mutation::ChildList { target: parent }])
        });
    }

    /// Set a control's checked state without dispatching events, as host
    /// rendering code would
    pub fn set_checked(&self, node: NodeId, checked: bool) {
        self.mutate(|inner| {
            if let Some(n) = inner.node_mut(node) {
                n.checked = checked;
            }
            (
                (),
                vec![Mutation::Attribute {
                    target: node,
                    name: "checked".to_string(),
                }],
            )
        });
    }

    /// First element in the document matching `selector`
    #[must_use]
    pub fn find(&self, selector: &Selector) -> Option<NodeId> {
        self.query(self.root(), selector)
    }

    /// Events dispatched so far
    #[must_use]
    pub fn events(&self) -> Vec<DomEvent> {
        self.lock().events.clone()
    }

    /// Number of mutations recorded so far
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    /// Number of active observers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

impl Surface for DomTree {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let inner = self.lock();
        let mut out = Vec::new();
        inner.collect(scope, selector, &mut out);
        out
    }

    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let inner = self.lock();
        let mut current = Some(node);
        while let Some(id) = current {
            let data = inner.node(id)?;
            if selector.matches(data) {
                return Some(id);
            }
            current = data.parent;
        }
        None
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.lock().node(node).is_some_and(|n| n.connected)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let inner = self.lock();
        let data = inner.node(node)?;
        if name == "class" {
            return Some(data.classes.join(" "));
        }
        data.attributes.get(name).cloned()
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.mutate(|inner| {
            if let Some(n) = inner.node_mut(node) {
                n.attributes.insert(name.to_string(), value.to_string());
            }
            (
                (),
                vec![Mutation::Attribute {
                    target: node,
                    name: name.to_string(),
                }],
            )
        });
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        self.mutate(|inner| {
            if let Some(n) = inner.node_mut(node) {
                n.attributes.remove(name);
            }
            (
                (),
                vec![Mutation::Attribute {
                    target: node,
                    name: name.to_string(),
                }],
            )
        });
    }

    fn class_names(&self, node: NodeId) -> Vec<String> {
        self.lock()
            .node(node)
            .map(|n| n.classes.clone())
            .unwrap_or_default()
    }

    fn add_class(&self, node: NodeId, class: &str) {
        self.mutate(|inner| {
            if let Some(n) = inner.node_mut(node) {
                if !n.classes.iter().any(|c| c == class) {
                    n.classes.push(class.to_string());
                }
            }
            (
                (),
                vec![Mutation::Attribute {
                    target: node,
                    name: "class".to_string(),
                }],
            )
        });
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        self.mutate(|inner| {
            if let Some(n) = inner.node_mut(node) {
                n.classes.retain(|c| c != class);
            }
            (
                (),
                vec![Mutation::Attribute {
                    target: node,
                    name: "class".to_string(),
                }],
            )
        });
    }

    fn text(&self, node: NodeId) -> String {
        let inner = self.lock();
        let mut out = String::new();
        inner.text_of(node, &mut out);
        out
    }

    fn is_disabled(&self, node: NodeId) -> bool {
        self.lock()
            .node(node)
            .is_some_and(|n| n.attributes.contains_key("disabled"))
    }

    fn set_disabled(&self, node: NodeId, disabled: bool) {
        if disabled {
            self.set_attribute(node, "disabled", "");
        } else {
            self.remove_attribute(node, "disabled");
        }
    }

    fn is_checked(&self, node: NodeId) -> bool {
        self.lock().node(node).is_some_and(|n| n.checked)
    }

    fn select(&self, node: NodeId) {
        self.mutate(|inner| {
            let mut batch = Vec::new();
            let group = inner
                .node(node)
                .filter(|n| n.attributes.get("type").is_some_and(|t| t == "radio"))
                .and_then(|n| n.attributes.get("name").cloned());

            if let Some(group) = group {
                let peers: Vec<NodeId> = (0..inner.nodes.len())
                    .map(NodeId)
                    .filter(|&id| id != node)
                    .filter(|&id| {
                        inner.node(id).is_some_and(|n| {
                            n.connected
                                && n.checked
                                && n.attributes.get("name") == Some(&group)
                        })
                    })
                    .collect();
                for peer in peers {
                    if let Some(n) = inner.node_mut(peer) {
                        n.checked = false;
                    }
                    batch.push(Mutation::Attribute {
                        target: peer,
                        name: "checked".to_string(),
                    });
                }
            }

            if let Some(n) = inner.node_mut(node) {
                n.checked = true;
            }
            batch.push(Mutation::Attribute {
                target: node,
                name: "checked".to_string(),
            });
            inner.events.extend([
                DomEvent::Click { node },
                DomEvent::Input { node },
                DomEvent::Change { node },
            ]);
            ((), batch)
        });
    }

    fn observe(&self, root: NodeId, callback: MutationCallback) -> ObserverId {
        let mut inner = self.lock();
        let id = ObserverId(inner.next_observer);
        inner.next_observer += 1;
        inner.observers.push(Observer { id, root, callback });
        id
    }

    fn disconnect(&self, observer: ObserverId) {
        self.lock().observers.retain(|o| o.id != observer);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn size_picker() -> DomElement {
        DomElement::new("div").with_class("options").with_child(
            DomElement::new("label")
                .with_class("form-control")
                .with_child(DomElement::radio("Size", "S").checked()),
        )
        .with_child(
            DomElement::new("label")
                .with_class("form-control")
                .with_child(DomElement::radio("Size", "M")),
        )
    }

    mod tree_tests {
        use super::*;

        #[test]
        fn test_query_all_in_document_order() {
            let dom = DomTree::new();
            dom.append(dom.root(), size_picker());
            let radios = dom.query_all(dom.root(), &Selector::parse("input[name=Size]").unwrap());
            assert_eq!(radios.len(), 2);
            assert_eq!(dom.attribute(radios[0], "value").as_deref(), Some("S"));
            assert_eq!(dom.attribute(radios[1], "value").as_deref(), Some("M"));
        }

        #[test]
        fn test_closest_is_inclusive() {
            let dom = DomTree::new();
            dom.append(dom.root(), size_picker());
            let radio = dom.find(&Selector::parse("[value=M]").unwrap()).unwrap();
            let label = dom.closest(radio, &Selector::class("form-control")).unwrap();
            assert_eq!(dom.class_names(label), vec!["form-control".to_string()]);
            assert_eq!(dom.closest(radio, &Selector::tag("input")), Some(radio));
            assert_eq!(dom.closest(radio, &Selector::tag("table")), None);
        }

        #[test]
        fn test_replace_children_detaches_old_nodes() {
            let dom = DomTree::new();
            let container = dom.append(dom.root(), size_picker());
            let old = dom.find(&Selector::parse("[value=S]").unwrap()).unwrap();
            dom.replace_children(container, vec![DomElement::radio("Size", "L")]);
            assert!(!dom.is_connected(old));
            assert!(dom.find(&Selector::parse("[value=S]").unwrap()).is_none());
            assert!(dom.find(&Selector::parse("[value=L]").unwrap()).is_some());
        }

        #[test]
        fn test_text_concatenates_descendants() {
            let dom = DomTree::new();
            let script = dom.append(
                dom.root(),
                DomElement::new("script").with_text("var a = 1;"),
            );
            assert_eq!(dom.text(script), "var a = 1;");
        }
    }

    mod state_tests {
        use super::*;

        #[test]
        fn test_disabled_round_trip() {
            let dom = DomTree::new();
            let radio = dom.append(dom.root(), DomElement::radio("Size", "S"));
            assert!(!dom.is_disabled(radio));
            dom.set_disabled(radio, true);
            assert!(dom.is_disabled(radio));
            dom.set_disabled(radio, false);
            assert!(!dom.is_disabled(radio));
        }

        #[test]
        fn test_select_unchecks_group_and_dispatches_events() {
            let dom = DomTree::new();
            dom.append(dom.root(), size_picker());
            let s = dom.find(&Selector::parse("[value=S]").unwrap()).unwrap();
            let m = dom.find(&Selector::parse("[value=M]").unwrap()).unwrap();
            assert!(dom.is_checked(s));

            dom.select(m);

            assert!(!dom.is_checked(s));
            assert!(dom.is_checked(m));
            assert_eq!(
                dom.events(),
                vec![
                    DomEvent::Click { node: m },
                    DomEvent::Input { node: m },
                    DomEvent::Change { node: m },
                ]
            );
        }

        #[test]
        fn test_class_attribute_view() {
            let dom = DomTree::new();
            let node = dom.append(dom.root(), DomElement::new("div").with_class("a"));
            dom.add_class(node, "b");
            dom.add_class(node, "b");
            assert_eq!(dom.attribute(node, "class").as_deref(), Some("a b"));
            dom.remove_class(node, "a");
            assert!(!dom.has_class(node, "a"));
        }
    }

    mod observer_tests {
        use super::*;

        fn counter(dom: &DomTree, root: NodeId) -> (Arc<AtomicUsize>, ObserverId) {
            let count = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&count);
            let id = dom.observe(
                root,
                Arc::new(move |batch: &[Mutation]| {
                    seen.fetch_add(batch.len(), Ordering::SeqCst);
                }),
            );
            (count, id)
        }

        #[test]
        fn test_every_write_is_recorded() {
            let dom = DomTree::new();
            let node = dom.append(dom.root(), DomElement::new("div"));
            let before = dom.mutation_count();
            dom.set_attribute(node, "aria-disabled", "true");
            dom.set_attribute(node, "aria-disabled", "true");
            assert_eq!(dom.mutation_count(), before + 2);
        }

        #[test]
        fn test_observer_scoped_to_subtree() {
            let dom = DomTree::new();
            let inside = dom.append(dom.root(), DomElement::new("div"));
            let outside = dom.append(dom.root(), DomElement::new("div"));
            let (count, _) = counter(&dom, inside);

            dom.set_attribute(outside, "x", "1");
            assert_eq!(count.load(Ordering::SeqCst), 0);

            dom.set_attribute(inside, "x", "1");
            dom.append(inside, DomElement::new("span"));
            assert_eq!(count.load(Ordering::SeqCst), 2);
        }

        #[test]
        fn test_disconnect_stops_notifications() {
            let dom = DomTree::new();
            let (count, id) = counter(&dom, dom.root());
            dom.append(dom.root(), DomElement::new("div"));
            dom.disconnect(id);
            dom.append(dom.root(), DomElement::new("div"));
            assert_eq!(count.load(Ordering::SeqCst), 1);
            assert_eq!(dom.observer_count(), 0);
        }

        #[test]
        fn test_callback_may_read_tree() {
            let dom = Arc::new(DomTree::new());
            let reader = Arc::clone(&dom);
            let seen = Arc::new(AtomicUsize::new(0));
            let seen_in_cb = Arc::clone(&seen);
            dom.observe(
                dom.root(),
                Arc::new(move |_: &[Mutation]| {
                    let n = reader.query_all(reader.root(), &Selector::tag("input")).len();
                    seen_in_cb.store(n, Ordering::SeqCst);
                }),
            );
            dom.append(dom.root(), DomElement::radio("Size", "S"));
            assert_eq!(seen.load(Ordering::SeqCst), 1);
        }
    }
}
