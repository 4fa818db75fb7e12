//! Host page access layer
//!
//! The engine never touches a concrete page. Everything it needs (selector
//! resolution, ancestor matching, text reads and subtree subscriptions) goes
//! through the [`Document`] capability, so the same watchers run against a
//! browser binding or the in-memory [`VirtualDocument`].

pub mod selector;
pub mod virtual_dom;

pub use selector::{Selector, SelectorElement, SelectorError};
pub use virtual_dom::{DomError, NodeSpec, VirtualDocument};

use std::fmt;

/// Opaque handle to a node of the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a host-specific node index
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The host-specific node index
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Cancelable handle for a subtree subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a host-specific subscription index
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The host-specific subscription index
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Capability over the observed page
pub trait Document {
    /// First node in document order matching the selector
    fn query_selector(&self, selector: &Selector) -> Option<NodeId>;

    /// The node itself or its nearest ancestor matching the selector
    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId>;

    /// Concatenated text of the node and its descendants
    fn text_content(&self, node: NodeId) -> Option<String>;

    /// Observe content and structural mutations within the node's subtree
    fn observe_subtree(&mut self, node: NodeId) -> SubscriptionId;

    /// Stop delivering notifications for a subscription
    fn disconnect(&mut self, subscription: SubscriptionId);

    /// Drain pending notifications, one entry per mutation per subscription,
    /// in the order the mutations happened
    fn take_mutations(&mut self) -> Vec<SubscriptionId>;
}

/// Try each selector in order, returning the first one that resolves
pub fn resolve_first<D: Document + ?Sized>(document: &D, selectors: &[Selector]) -> Option<NodeId> {
    selectors
        .iter()
        .find_map(|selector| document.query_selector(selector))
}

/// Delegated match: the node or an ancestor matching any of the selectors
pub fn closest_any<D: Document + ?Sized>(
    document: &D,
    node: NodeId,
    selectors: &[Selector],
) -> Option<NodeId> {
    selectors
        .iter()
        .find_map(|selector| document.closest(node, selector))
}
