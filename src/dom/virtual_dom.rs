//! In-memory document
//!
//! A small element tree with subtree mutation notifications. Used by the
//! replay harness and by tests to drive watchers without a browser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::{Document, NodeId, Selector, SelectorElement, SubscriptionId};

/// Errors from mutating a [`VirtualDocument`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The handle does not belong to this document
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The root element cannot be detached
    #[error("the root element cannot be removed")]
    RootRemoval,
}

/// Declarative description of an element subtree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Tag name
    pub tag: String,
    /// Element id attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Class names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Other attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    /// Text placed before any children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    /// Create an element spec with the given tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set the id attribute
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class name
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element
    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory document with subtree observation
#[derive(Debug)]
pub struct VirtualDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    observers: BTreeMap<SubscriptionId, NodeId>,
    next_subscription: u64,
    pending: Vec<SubscriptionId>,
}

impl VirtualDocument {
    /// Build a document whose root element is described by `root`
    pub fn new(root: &NodeSpec) -> Self {
        let mut document = Self {
            nodes: Vec::new(),
            root: NodeId::from_raw(0),
            observers: BTreeMap::new(),
            next_subscription: 1,
            pending: Vec::new(),
        };
        document.root = document.build(root, None);
        document
    }

    /// The root element
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether the node is reachable from the root
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.data(id).and_then(|data| data.parent);
        }
        false
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.observers.len()
    }

    /// Replace the node's content with plain text, detaching its children
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> Result<(), DomError> {
        let children = {
            let data = self.data_mut(node)?;
            data.text = text.into();
            std::mem::take(&mut data.children)
        };
        self.orphan(&children);
        self.notify(node);
        Ok(())
    }

    /// Append a new subtree under `parent`
    pub fn append_child(&mut self, parent: NodeId, spec: &NodeSpec) -> Result<NodeId, DomError> {
        self.data(parent).ok_or(DomError::UnknownNode(parent))?;
        let child = self.build(spec, Some(parent));
        self.data_mut(parent)?.children.push(child);
        self.notify(parent);
        Ok(child)
    }

    /// Swap all children of `node` for freshly built subtrees
    pub fn replace_children(&mut self, node: NodeId, specs: &[NodeSpec]) -> Result<Vec<NodeId>, DomError> {
        let old = std::mem::take(&mut self.data_mut(node)?.children);
        self.orphan(&old);

        let fresh: Vec<NodeId> = specs.iter().map(|spec| self.build(spec, Some(node))).collect();
        self.data_mut(node)?.children = fresh.clone();
        self.notify(node);
        Ok(fresh)
    }

    /// Detach a node (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        if node == self.root {
            return Err(DomError::RootRemoval);
        }
        let Some(parent) = self.data(node).ok_or(DomError::UnknownNode(node))?.parent else {
            return Ok(());
        };
        self.data_mut(parent)?.children.retain(|child| *child != node);
        self.orphan(&[node]);
        self.notify(parent);
        Ok(())
    }

    fn build(&mut self, spec: &NodeSpec, parent: Option<NodeId>) -> NodeId {
        let mut attributes = spec.attrs.clone();
        if let Some(id) = &spec.id {
            attributes.insert("id".to_string(), id.clone());
        }
        if !spec.classes.is_empty() {
            attributes.insert("class".to_string(), spec.classes.join(" "));
        }

        let id = NodeId::from_raw(self.nodes.len() as u64);
        self.nodes.push(NodeData {
            tag: spec.tag.to_ascii_lowercase(),
            attributes,
            text: spec.text.clone().unwrap_or_default(),
            parent,
            children: Vec::new(),
        });

        let children: Vec<NodeId> = spec
            .children
            .iter()
            .map(|child| self.build(child, Some(id)))
            .collect();
        self.nodes[id.raw() as usize].children = children;
        id
    }

    fn orphan(&mut self, nodes: &[NodeId]) {
        for node in nodes {
            if let Ok(data) = self.data_mut(*node) {
                data.parent = None;
            }
        }
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.raw() as usize)
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes
            .get_mut(node.raw() as usize)
            .ok_or(DomError::UnknownNode(node))
    }

    /// Queue one notification for every subscription covering `target`
    fn notify(&mut self, target: NodeId) {
        let mut chain = Vec::new();
        let mut current = Some(target);
        while let Some(id) = current {
            chain.push(id);
            current = self.data(id).and_then(|data| data.parent);
        }

        for (subscription, observed) in &self.observers {
            if chain.contains(observed) {
                self.pending.push(*subscription);
            }
        }
    }

    fn element(&self, node: NodeId) -> ElementRef<'_> {
        ElementRef { document: self, node }
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        if let Some(data) = self.data(node) {
            out.push_str(&data.text);
            for child in &data.children {
                self.collect_text(*child, out);
            }
        }
    }

    fn find_in(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let data = self.data(node)?;
        if selector.matches(self.element(node)) {
            return Some(node);
        }
        data.children
            .iter()
            .find_map(|child| self.find_in(*child, selector))
    }
}

impl Document for VirtualDocument {
    fn query_selector(&self, selector: &Selector) -> Option<NodeId> {
        self.find_in(self.root, selector)
    }

    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = self.data(node).map(|_| node);
        while let Some(id) = current {
            if selector.matches(self.element(id)) {
                return Some(id);
            }
            current = self.data(id).and_then(|data| data.parent);
        }
        None
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        self.data(node)?;
        let mut text = String::new();
        self.collect_text(node, &mut text);
        Some(text)
    }

    fn observe_subtree(&mut self, node: NodeId) -> SubscriptionId {
        let subscription = SubscriptionId::from_raw(self.next_subscription);
        self.next_subscription += 1;
        self.observers.insert(subscription, node);
        subscription
    }

    fn disconnect(&mut self, subscription: SubscriptionId) {
        self.observers.remove(&subscription);
        self.pending.retain(|pending| *pending != subscription);
    }

    fn take_mutations(&mut self) -> Vec<SubscriptionId> {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Clone, Copy)]
struct ElementRef<'a> {
    document: &'a VirtualDocument,
    node: NodeId,
}

impl<'a> ElementRef<'a> {
    fn data(&self) -> &'a NodeData {
        &self.document.nodes[self.node.raw() as usize]
    }
}

impl SelectorElement for ElementRef<'_> {
    fn tag_name(&self) -> &str {
        &self.data().tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.data().attributes.get(name).map(String::as_str)
    }

    fn parent_element(&self) -> Option<Self> {
        self.data().parent.map(|node| ElementRef {
            document: self.document,
            node,
        })
    }
}
