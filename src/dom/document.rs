use std::collections::HashMap;

use serde::Serialize;
use url::Url;

use crate::types::errors::DocumentError;

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObserverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeType {
    Document,
    Element,
    Text,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub tag_name: String,
    pub text_content: String,
    pub attributes: HashMap<String, String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(id: NodeId, node_type: NodeType, tag_name: &str) -> Self {
        Self {
            id,
            node_type,
            tag_name: tag_name.to_ascii_lowercase(),
            text_content: String::new(),
            attributes: HashMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attribute("class")
            .map(|list| list.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

/// A child-list change: `added_nodes` were inserted into, or `removed_nodes`
/// taken out of, `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

#[derive(Debug)]
struct Observer {
    id: ObserverId,
    target: NodeId,
    subtree: bool,
    records: Vec<MutationRecord>,
}

/// An arena-backed page document with child-list mutation observers.
///
/// Every document has fixed `html`, `head` and `body` elements. Nodes removed
/// from the tree stay in the arena, detached, so callers can still inspect them.
#[derive(Debug)]
pub struct Document {
    url: String,
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    observers: Vec<Observer>,
    next_observer_id: u64,
}

impl Document {
    pub fn new(url: &str) -> Self {
        let mut doc = Self {
            url: url.to_string(),
            nodes: HashMap::new(),
            next_id: 1,
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            observers: Vec::new(),
            next_observer_id: 1,
        };

        let root = doc.insert_node(NodeType::Document, "#document");
        let html = doc.insert_node(NodeType::Element, "html");
        let head = doc.insert_node(NodeType::Element, "head");
        let body = doc.insert_node(NodeType::Element, "body");
        doc.link(root, html);
        doc.link(html, head);
        doc.link(html, body);
        doc.root = root;
        doc.head = head;
        doc.body = body;
        doc
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(DocumentError::NodeNotFound(id.0))
    }

    fn require(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(DocumentError::NodeNotFound(id.0))
    }

    fn insert_node(&mut self, node_type: NodeType, tag_name: &str) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, node_type, tag_name));
        id
    }

    // Raw tree link used while building the skeleton; records nothing.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    // === Node creation ===

    /// Creates a detached element.
    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.insert_node(NodeType::Element, tag_name)
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = self.insert_node(NodeType::Text, "#text");
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text_content = text.to_string();
        }
        id
    }

    /// Creates a detached `<a href=...>`.
    pub fn create_link(&mut self, href: &str) -> NodeId {
        let id = self.create_element("a");
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attributes.insert("href".to_string(), href.to_string());
        }
        id
    }

    // === Tree mutation ===

    /// Appends `child` to `parent`, moving it out of its current parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.require(parent)?;
        if parent_node.node_type == NodeType::Text {
            return Err(DocumentError::HierarchyRequest(
                "text nodes cannot have children".to_string(),
            ));
        }
        self.require(child)?;
        if child == self.root {
            return Err(DocumentError::HierarchyRequest(
                "the document node cannot be moved".to_string(),
            ));
        }
        if child == parent || self.is_inclusive_ancestor(child, parent) {
            return Err(DocumentError::HierarchyRequest(format!(
                "node {} cannot be inserted into its own subtree",
                child.0
            )));
        }

        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.queue_record(MutationRecord {
            target: parent,
            added_nodes: vec![child],
            removed_nodes: Vec::new(),
        });
        Ok(())
    }

    /// Detaches `node` from its parent. Removing a detached node is a no-op.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        self.require(node)?;
        if node == self.root {
            return Err(DocumentError::HierarchyRequest(
                "the document node cannot be removed".to_string(),
            ));
        }
        self.detach(node)
    }

    /// Removes every child of `parent` as a single mutation.
    pub fn clear_children(&mut self, parent: NodeId) -> Result<()> {
        let children = std::mem::take(&mut self.node_mut(parent)?.children);
        if children.is_empty() {
            return Ok(());
        }
        for child in &children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
        }
        self.queue_record(MutationRecord {
            target: parent,
            added_nodes: Vec::new(),
            removed_nodes: children,
        });
        Ok(())
    }

    fn detach(&mut self, node: NodeId) -> Result<()> {
        let Some(old_parent) = self.require(node)?.parent else {
            return Ok(());
        };
        self.node_mut(old_parent)?.children.retain(|c| *c != node);
        self.node_mut(node)?.parent = None;
        self.queue_record(MutationRecord {
            target: old_parent,
            added_nodes: Vec::new(),
            removed_nodes: vec![node],
        });
        Ok(())
    }

    // === Content and attributes ===

    /// Replaces the node's own text (a `<style>` body, a text node's data).
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<()> {
        self.node_mut(node)?.text_content = text.to_string();
        Ok(())
    }

    /// The node's own text followed by that of its descendants, in tree order.
    pub fn text_content(&self, node: NodeId) -> Option<String> {
        self.nodes.get(&node)?;
        let mut out = String::new();
        for id in self.descendants_and_self(node) {
            if let Some(n) = self.nodes.get(&id) {
                out.push_str(&n.text_content);
            }
        }
        Some(out)
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.node_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&node)?.get_attribute(name)
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.node_mut(node)?.attributes.remove(name);
        Ok(())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes.get(&node).map(|n| n.has_class(class)).unwrap_or(false)
    }

    /// Adds `class` to the node's class list. Adding a present class does nothing.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        let n = self.node_mut(node)?;
        if n.has_class(class) {
            return Ok(());
        }
        let list = match n.attributes.get("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        n.attributes.insert("class".to_string(), list);
        Ok(())
    }

    /// Removes `class` from the node's class list, dropping the attribute once empty.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<()> {
        let n = self.node_mut(node)?;
        let Some(existing) = n.attributes.get("class") else {
            return Ok(());
        };
        let remaining: Vec<&str> = existing
            .split_ascii_whitespace()
            .filter(|c| *c != class)
            .collect();
        if remaining.is_empty() {
            n.attributes.remove("class");
        } else {
            let list = remaining.join(" ");
            n.attributes.insert("class".to_string(), list);
        }
        Ok(())
    }

    // === Queries ===

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// True if the node is attached to the document.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node) && self.is_inclusive_ancestor(self.root, node)
    }

    /// `node` followed by all its descendants, in tree order.
    pub fn descendants_and_self(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(&node) {
            return out;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = self.nodes.get(&id) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    /// Elements named `tag_name` within `root`, including `root` itself, in tree order.
    pub fn elements_by_tag(&self, root: NodeId, tag_name: &str) -> Vec<NodeId> {
        self.descendants_and_self(root)
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(id)
                    .map(|n| n.is_element() && n.tag_name.eq_ignore_ascii_case(tag_name))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Every link currently in the document.
    pub fn links(&self) -> Vec<NodeId> {
        self.elements_by_tag(self.root, "a")
    }

    /// The link's `href` resolved against the document URL.
    ///
    /// Falls back to the raw attribute when either side does not parse.
    pub fn resolve_href(&self, node: NodeId) -> Option<String> {
        let raw = self.get_attribute(node, "href")?;
        let resolved = Url::parse(&self.url)
            .and_then(|base| base.join(raw))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string());
        Some(resolved)
    }

    // === Mutation observers ===

    /// Starts recording child-list changes of `target` (and its whole subtree if `subtree`).
    pub fn observe(&mut self, target: NodeId, subtree: bool) -> Result<ObserverId> {
        self.require(target)?;
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push(Observer {
            id,
            target,
            subtree,
            records: Vec::new(),
        });
        Ok(id)
    }

    /// Takes the records queued for `observer` since the last call.
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .iter_mut()
            .find(|o| o.id == observer)
            .map(|o| std::mem::take(&mut o.records))
            .unwrap_or_default()
    }

    /// Stops the observer and discards its pending records.
    pub fn disconnect(&mut self, observer: ObserverId) {
        self.observers.retain(|o| o.id != observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn queue_record(&mut self, record: MutationRecord) {
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.target == record.target
                    || (o.subtree && self.is_inclusive_ancestor(o.target, record.target))
            })
            .map(|(i, _)| i)
            .collect();
        for i in interested {
            self.observers[i].records.push(record.clone());
        }
    }
}
