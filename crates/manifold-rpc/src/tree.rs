//! Combined handler tree.
//!
//! One tree carries both the declared shape and the bound runtime chains:
//! a [`HandlerNode`] is either a `Leaf` (one chain plus a `skip_parents`
//! opt-out flag) or a `Branch` (its own cross-cutting chain plus children).
//! The tree is built once from the [`EndpointSpec`] and its shape never
//! changes afterwards; only the chains it holds are populated.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use manifold_core::spec::{EndpointSpec, PATH_SEPARATOR};

use crate::chain::HandlerChain;

/// Terminal position: one chain, optionally detached from ancestor chains.
pub struct LeafNode {
    chain: Arc<HandlerChain>,
    /// When set, ancestor chains are not composed in front of this leaf.
    skip_parents: AtomicBool,
}

impl LeafNode {
    fn new() -> Self {
        Self {
            chain: Arc::new(HandlerChain::new()),
            skip_parents: AtomicBool::new(false),
        }
    }

    /// The leaf's own chain.
    pub fn chain(&self) -> &Arc<HandlerChain> {
        &self.chain
    }

    /// Whether this leaf bypasses inherited ancestor steps.
    pub fn skip_parents(&self) -> bool {
        self.skip_parents.load(Ordering::SeqCst)
    }

    /// Set the ancestor-bypass flag.
    pub fn set_skip_parents(&self, skip: bool) {
        self.skip_parents.store(skip, Ordering::SeqCst);
    }
}

/// Nested position: its own cross-cutting chain plus named children.
pub struct BranchNode {
    chain: Arc<HandlerChain>,
    children: HashMap<String, Arc<HandlerNode>>,
}

impl BranchNode {
    /// The branch's own chain, inherited by descendants.
    pub fn chain(&self) -> &Arc<HandlerChain> {
        &self.chain
    }

    /// Child nodes by field name.
    pub fn children(&self) -> &HashMap<String, Arc<HandlerNode>> {
        &self.children
    }

    /// Look up a direct child.
    pub fn get(&self, name: &str) -> Option<&Arc<HandlerNode>> {
        self.children.get(name)
    }
}

/// One position in the combined handler tree.
pub enum HandlerNode {
    /// Terminal operation position.
    Leaf(LeafNode),
    /// Nested mapping to child positions.
    Branch(BranchNode),
}

impl HandlerNode {
    /// Build a tree mirroring `spec`, with a fresh empty chain per position.
    ///
    /// The spec must already be validated (see [`EndpointSpec::validate`]).
    pub fn from_spec(spec: &EndpointSpec) -> Self {
        match spec {
            EndpointSpec::Leaf => Self::Leaf(LeafNode::new()),
            EndpointSpec::Branch(children) => Self::Branch(BranchNode {
                chain: Arc::new(HandlerChain::new()),
                children: children
                    .iter()
                    .map(|(name, child)| (name.clone(), Arc::new(Self::from_spec(child))))
                    .collect(),
            }),
        }
    }

    /// This position's own chain.
    pub fn chain(&self) -> &Arc<HandlerChain> {
        match self {
            Self::Leaf(leaf) => leaf.chain(),
            Self::Branch(branch) => branch.chain(),
        }
    }

    /// Branch view, if this is a branch.
    pub fn as_branch(&self) -> Option<&BranchNode> {
        match self {
            Self::Branch(branch) => Some(branch),
            Self::Leaf(_) => None,
        }
    }

    /// Leaf view, if this is a leaf.
    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Branch(_) => None,
        }
    }

    /// Resolve a dotted path; the empty path is this node.
    pub fn node_at(&self, path: &str) -> Option<&HandlerNode> {
        if path.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for segment in path.split(PATH_SEPARATOR) {
            node = node.as_branch()?.get(segment)?;
        }
        Some(node)
    }

    /// Deep clone: fresh chains seeded with copies of the current step lists,
    /// copied `skip_parents` flags. Steps themselves are shared (they are
    /// immutable behind `Arc`); chain state is not.
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Leaf(leaf) => {
                let cloned = LeafNode {
                    chain: Arc::new(HandlerChain::from_steps(leaf.chain().steps())),
                    skip_parents: AtomicBool::new(leaf.skip_parents()),
                };
                Self::Leaf(cloned)
            }
            Self::Branch(branch) => Self::Branch(BranchNode {
                chain: Arc::new(HandlerChain::from_steps(branch.chain().steps())),
                children: branch
                    .children
                    .iter()
                    .map(|(name, child)| (name.clone(), Arc::new(child.deep_clone())))
                    .collect(),
            }),
        }
    }

    /// Sorted dotted paths of every leaf under this node.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_leaf_paths(self, "", &mut paths);
        paths.sort();
        paths
    }
}

fn collect_leaf_paths(node: &HandlerNode, prefix: &str, out: &mut Vec<String>) {
    match node {
        HandlerNode::Leaf(_) => out.push(prefix.to_owned()),
        HandlerNode::Branch(branch) => {
            for (name, child) in &branch.children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}{PATH_SEPARATOR}{name}")
                };
                collect_leaf_paths(child, &path, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_spec() -> EndpointSpec {
        EndpointSpec::branch([
            ("ping", EndpointSpec::leaf()),
            (
                "profile",
                EndpointSpec::branch([
                    ("get", EndpointSpec::leaf()),
                    ("update", EndpointSpec::leaf()),
                ]),
            ),
        ])
    }

    #[test]
    fn tree_mirrors_spec_shape() {
        let tree = HandlerNode::from_spec(&nested_spec());
        let root = tree.as_branch().unwrap();
        assert!(root.get("ping").unwrap().as_leaf().is_some());
        let profile = root.get("profile").unwrap().as_branch().unwrap();
        assert!(profile.get("get").is_some());
        assert!(profile.get("update").is_some());
        assert!(root.get("missing").is_none());
    }

    #[test]
    fn node_at_resolves_dotted_paths() {
        let tree = HandlerNode::from_spec(&nested_spec());
        assert!(tree.node_at("").is_some());
        assert!(tree.node_at("ping").unwrap().as_leaf().is_some());
        assert!(tree.node_at("profile.get").unwrap().as_leaf().is_some());
        assert!(tree.node_at("profile").unwrap().as_branch().is_some());
        assert!(tree.node_at("profile.missing").is_none());
        assert!(tree.node_at("ping.deeper").is_none());
    }

    #[test]
    fn skip_parents_defaults_false() {
        let tree = HandlerNode::from_spec(&nested_spec());
        let leaf = tree.node_at("ping").unwrap().as_leaf().unwrap();
        assert!(!leaf.skip_parents());
        leaf.set_skip_parents(true);
        assert!(leaf.skip_parents());
    }

    #[test]
    fn leaf_paths_cover_tree() {
        let tree = HandlerNode::from_spec(&nested_spec());
        assert_eq!(tree.leaf_paths(), vec!["ping", "profile.get", "profile.update"]);
    }

    #[tokio::test]
    async fn deep_clone_does_not_share_chain_state() {
        let tree = HandlerNode::from_spec(&nested_spec());
        tree.node_at("ping")
            .unwrap()
            .chain()
            .append_operation("ping", crate::step::operation_fn(|_, _| Ok(json!("pong"))))
            .unwrap();

        let clone = tree.deep_clone();
        // Cloned chain carries the copied step...
        assert_eq!(clone.node_at("ping").unwrap().chain().len(), 1);

        // ...but later mutations are independent in both directions.
        clone
            .node_at("ping")
            .unwrap()
            .chain()
            .append_operation("extra", crate::step::operation_fn(|_, _| Ok(json!(1))))
            .unwrap();
        assert_eq!(tree.node_at("ping").unwrap().chain().len(), 1);
        assert_eq!(clone.node_at("ping").unwrap().chain().len(), 2);
    }

    #[test]
    fn deep_clone_copies_skip_flag() {
        let tree = HandlerNode::from_spec(&nested_spec());
        tree.node_at("profile.get")
            .unwrap()
            .as_leaf()
            .unwrap()
            .set_skip_parents(true);

        let clone = tree.deep_clone();
        assert!(clone.node_at("profile.get").unwrap().as_leaf().unwrap().skip_parents());
        // Flag mutations after the clone are independent.
        clone
            .node_at("profile.get")
            .unwrap()
            .as_leaf()
            .unwrap()
            .set_skip_parents(false);
        assert!(tree.node_at("profile.get").unwrap().as_leaf().unwrap().skip_parents());
    }
}
