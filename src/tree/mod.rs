//! The document tree: an arena of [`DocumentNode`]s addressed by [`NodeId`].
//!
//! Parents own their children through an ordered id list; the parent link is
//! a plain id, so there are no reference cycles. Re-fetching a container
//! detaches its old subtree, leaving empty slots behind, and ids are never reused
//! within one tree.

mod node;

pub use node::{DocumentNode, NodeReport, NodeStatus};

use crate::locator::Locator;
use serde::Serialize;
use std::fmt;

/// Index of a node inside its [`DocumentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena owning every node of one ingestion.
#[derive(Debug, Default, Clone)]
pub struct DocumentTree {
    slots: Vec<Option<DocumentNode>>,
    roots: Vec<NodeId>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level node.
    pub fn insert_root(&mut self, locator: Locator) -> NodeId {
        let id = self.alloc(locator, None);
        self.roots.push(id);
        id
    }

    /// Add a child under `parent`, establishing the parent link.
    ///
    /// # Panics
    /// If `parent` is not a live node of this tree.
    pub fn add_child(&mut self, parent: NodeId, locator: Locator) -> NodeId {
        let id = self.alloc(locator, Some(parent));
        self.node_mut(parent).children.push(id);
        id
    }

    fn alloc(&mut self, locator: Locator, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Some(DocumentNode::new(id, locator, parent)));
        id
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&DocumentNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut DocumentNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Borrow a live node.
    ///
    /// # Panics
    /// If `id` was detached or belongs to another tree.
    pub fn node(&self, id: NodeId) -> &DocumentNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id} is not part of this tree"),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DocumentNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("node {id} is not part of this tree"),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(DocumentNode::parent)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth-first pre-order walk starting at `id` (inclusive).
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.get(next).is_none() {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Drop every descendant of `id` and clear its child list.
    pub(crate) fn detach_children(&mut self, id: NodeId) {
        let descendants: Vec<NodeId> = self.walk(id).into_iter().skip(1).collect();
        for d in descendants {
            if let Some(slot) = self.slots.get_mut(d.0) {
                *slot = None;
            }
        }
        if let Some(node) = self.get_mut(id) {
            node.children.clear();
        }
    }

    /// Serialisable snapshot of the subtree rooted at `id`.
    pub fn report(&self, id: NodeId) -> NodeReport {
        let node = self.node(id);
        NodeReport {
            locator: node.locator().to_string(),
            filename: node.filename().to_string(),
            doc_type: node.doc_type().map(ToString::to_string),
            status: node.status().clone(),
            title: node.title().map(str::to_string),
            author: node.author().map(str::to_string),
            has_cover: node.cover().is_some(),
            size: node.size(),
            modified: node.modified(),
            needs_chunking: node.needs_chunking(),
            content: node.exported_content().to_vec(),
            children: node.children().iter().map(|c| self.report(*c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn local(p: &str) -> Locator {
        Locator::Local(PathBuf::from(p))
    }

    #[test]
    fn children_keep_insertion_order_and_parent_link() {
        let mut tree = DocumentTree::new();
        let root = tree.insert_root(local("/no/such/dir"));
        let a = tree.add_child(root, local("/no/such/dir/a.txt"));
        let b = tree.add_child(root, local("/no/such/dir/b.txt"));

        assert_eq!(tree.children(root), &[a, b]);
        assert_eq!(tree.parent(a), Some(root));
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.roots(), &[root]);
    }

    #[test]
    fn walk_is_preorder() {
        let mut tree = DocumentTree::new();
        let root = tree.insert_root(local("/r"));
        let a = tree.add_child(root, local("/r/a"));
        let a1 = tree.add_child(a, local("/r/a/1.txt"));
        let b = tree.add_child(root, local("/r/b.txt"));
        assert_eq!(tree.walk(root), vec![root, a, a1, b]);
    }

    #[test]
    fn detach_drops_whole_subtree() {
        let mut tree = DocumentTree::new();
        let root = tree.insert_root(local("/r"));
        let a = tree.add_child(root, local("/r/a"));
        tree.add_child(a, local("/r/a/1.txt"));
        assert_eq!(tree.len(), 3);

        tree.detach_children(root);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());
        assert!(tree.get(a).is_none());

        // New ids do not collide with detached ones.
        let c = tree.add_child(root, local("/r/c.txt"));
        assert_ne!(c, a);
    }

    #[test]
    fn report_includes_children() {
        let mut tree = DocumentTree::new();
        let root = tree.insert_root(local("/r"));
        tree.add_child(root, local("/r/x.png"));
        let report = tree.report(root);
        assert_eq!(report.children.len(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["children"][0]["status"]["state"], "failed");
    }
}
