//! Rendering surface capability.
//!
//! The engine never owns the page it decorates. Everything it needs from the
//! DOM goes through [`Surface`], which keeps the reconciler independent of the
//! environment: a browser binding in production, [`crate::DomTree`] in tests
//! and headless runs.

use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Handle to an element on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle to a registered mutation observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// A structural or attribute change on the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Children were added to or removed from `target`
    ChildList {
        /// Parent whose children changed
        target: NodeId,
    },
    /// An attribute (or attribute-like property) of `target` was written
    Attribute {
        /// Element written to
        target: NodeId,
        /// Attribute name
        name: String,
    },
}

impl Mutation {
    /// Element the mutation was recorded on
    #[must_use]
    pub const fn target(&self) -> NodeId {
        match self {
            Self::ChildList { target } | Self::Attribute { target, .. } => *target,
        }
    }
}

/// Callback invoked with each batch of mutations under an observed root
pub type MutationCallback = Arc<dyn Fn(&[Mutation]) + Send + Sync>;

/// DOM access required by the identity resolver and the reconciler
pub trait Surface: Send + Sync {
    /// Document root element
    fn root(&self) -> NodeId;

    /// Descendants of `scope` matching `selector`, in document order
    fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId>;

    /// First descendant of `scope` matching `selector`
    fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_all(scope, selector).into_iter().next()
    }

    /// Nearest inclusive ancestor of `node` matching `selector`
    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId>;

    /// Whether the node is still attached to the document
    fn is_connected(&self, node: NodeId) -> bool;

    /// Attribute value
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Write an attribute
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    /// Remove an attribute
    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Class names in declaration order
    fn class_names(&self, node: NodeId) -> Vec<String>;

    /// Whether the node carries `class`
    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_names(node).iter().any(|c| c == class)
    }

    /// Add a class
    fn add_class(&self, node: NodeId, class: &str);

    /// Remove a class
    fn remove_class(&self, node: NodeId, class: &str);

    /// Text content of the node and its descendants
    fn text(&self, node: NodeId) -> String;

    /// Whether a form control is disabled
    fn is_disabled(&self, node: NodeId) -> bool;

    /// Enable or disable a form control
    fn set_disabled(&self, node: NodeId, disabled: bool);

    /// Whether a choice control is currently selected
    fn is_checked(&self, node: NodeId) -> bool;

    /// Select a choice control the way a user click would, dispatching the
    /// same events so the host's selection-dependent rendering follows
    fn select(&self, node: NodeId);

    /// Start observing changes in the subtree rooted at `root`.
    ///
    /// The reconciler tells its own writes apart from host re-renders by
    /// expecting the callback to run inside the write that caused it, as
    /// [`crate::DomTree`] does. A surface that delivers batches later (a
    /// browser `MutationObserver` queues them as microtasks) stays correct
    /// because every reconciler write is guarded by a read. Each such batch
    /// costs one extra reapply that writes nothing.
    fn observe(&self, root: NodeId, callback: MutationCallback) -> ObserverId;

    /// Stop an observer; unknown ids are ignored
    fn disconnect(&self, observer: ObserverId);
}
