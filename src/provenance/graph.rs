//! Explanation graphs
//!
//! Nodes live in an arena addressed by [`NodeId`]. `Part` nodes are
//! hash-consed on their [`PartRef`], so each `(subject, part)` pair is
//! expanded at most once and shared subtrees stay shared. A pair met again
//! while its own expansion is in progress becomes a `Loop` leaf, and a
//! pointer to a subject the lab does not know becomes a `Broken` leaf: the
//! graph is finite and acyclic even over malformed lineage.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::{LineageSource, PartRef, Provenance};

/// Index of a node in an [`ExplanationGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Node of an explanation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
    /// A piece of a lab object; a leaf when it has no children
    Part {
        /// The piece
        target: PartRef,
        /// What it derives from
        children: Vec<NodeId>,
    },
    /// Every child contributes
    And(Vec<NodeId>),
    /// Any child explains
    Or(Vec<NodeId>),
    /// Origin not recorded
    Unknown,
    /// Pointer to an object that does not exist
    Broken(PartRef),
    /// Pointer back into its own ancestry
    Loop(PartRef),
}

impl Node {
    /// Outgoing edges.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match self {
            Self::Part { children, .. } | Self::And(children) | Self::Or(children) => children,
            Self::Unknown | Self::Broken(_) | Self::Loop(_) => &[],
        }
    }

    /// Check whether the node has no outgoing edges.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }
}

/// AND/OR DAG answering "where does this value come from".
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationGraph {
    nodes: Vec<Node>,
    #[serde(skip)]
    index: FxHashMap<PartRef, NodeId>,
    root: NodeId,
}

struct Expander<'a, S: ?Sized> {
    source: &'a S,
    nodes: Vec<Node>,
    index: FxHashMap<PartRef, NodeId>,
    in_progress: FxHashSet<PartRef>,
}

impl<S: LineageSource + ?Sized> Expander<'_, S> {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn part(&mut self, target: &PartRef) -> NodeId {
        if self.in_progress.contains(target) {
            return self.push(Node::Loop(target.clone()));
        }
        if let Some(id) = self.index.get(target) {
            return *id;
        }
        let Some(lineage) = self.source.lineage(target) else {
            let id = self.push(Node::Broken(target.clone()));
            self.index.insert(target.clone(), id);
            return id;
        };
        let id = self.push(Node::Part {
            target: target.clone(),
            children: Vec::new(),
        });
        self.index.insert(target.clone(), id);
        self.in_progress.insert(target.clone());
        let child = self.provenance(&lineage);
        self.in_progress.remove(target);
        if let (Some(child), Node::Part { children, .. }) = (child, &mut self.nodes[id.0]) {
            children.push(child);
        }
        id
    }

    fn provenance(&mut self, provenance: &Provenance) -> Option<NodeId> {
        match provenance {
            Provenance::Leaf => None,
            Provenance::Unknown => Some(self.push(Node::Unknown)),
            Provenance::Part(target) => Some(self.part(target)),
            Provenance::And(items) => {
                let children: Vec<NodeId> = items.iter().filter_map(|p| self.provenance(p)).collect();
                (!children.is_empty()).then(|| self.push(Node::And(children)))
            }
            Provenance::Or(items) => {
                let children: Vec<NodeId> = items.iter().filter_map(|p| self.provenance(p)).collect();
                (!children.is_empty()).then(|| self.push(Node::Or(children)))
            }
        }
    }
}

impl ExplanationGraph {
    /// Unfold the lineage of `target` through `source`.
    pub fn explain<S: LineageSource + ?Sized>(source: &S, target: &PartRef) -> Self {
        let mut expander = Expander {
            source,
            nodes: Vec::new(),
            index: FxHashMap::default(),
            in_progress: FxHashSet::default(),
        };
        let root = expander.part(target);
        Self {
            nodes: expander.nodes,
            index: expander.index,
            root,
        }
    }

    /// Root node (the queried piece).
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Node for a piece, if it appears in the graph.
    #[must_use]
    pub fn find(&self, target: &PartRef) -> Option<NodeId> {
        self.index.get(target).copied()
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the arena is empty (never true for a built graph).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node reachable from the root, depth first, each once.
    #[must_use]
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children().iter().rev().copied());
            }
        }
        order
    }

    /// Reachable leaf nodes.
    #[must_use]
    pub fn leaves(&self) -> Vec<NodeId> {
        self.reachable()
            .into_iter()
            .filter(|id| self.node(*id).is_some_and(Node::is_leaf))
            .collect()
    }

    /// Pieces at reachable `Part` leaves, sorted and deduplicated.
    #[must_use]
    pub fn leaf_parts(&self) -> Vec<PartRef> {
        let mut parts: Vec<PartRef> = self
            .leaves()
            .into_iter()
            .filter_map(|id| match self.node(id) {
                Some(Node::Part { target, .. }) => Some(target.clone()),
                _ => None,
            })
            .collect();
        parts.sort();
        parts.dedup();
        parts
    }

    /// Collapse redundant structure without changing the leaf set.
    ///
    /// - `And`/`Or` nodes with a single child are replaced by the child.
    /// - `And` under `And` and `Or` under `Or` are flattened.
    /// - A non-root `Part` node whose only child is a `Part` of the same
    ///   subject is replaced by that child.
    #[must_use]
    pub fn simplify(&self) -> Self {
        let mut out = Self {
            nodes: Vec::new(),
            index: FxHashMap::default(),
            root: NodeId(0),
        };
        let mut memo = FxHashMap::default();
        out.root = self.rebuild(self.root, true, &mut out, &mut memo);
        out
    }

    fn rebuild(
        &self,
        id: NodeId,
        is_root: bool,
        out: &mut Self,
        memo: &mut FxHashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(done) = memo.get(&id) {
            return *done;
        }
        let Some(node) = self.node(id) else {
            return out.push(Node::Unknown);
        };
        let children: Vec<NodeId> = node
            .children()
            .iter()
            .map(|c| self.rebuild(*c, false, out, memo))
            .collect();
        let new_id = match node {
            Node::Part { target, .. } => {
                let same_subject_child = match children.as_slice() {
                    [only] => matches!(
                        out.node(*only),
                        Some(Node::Part { target: t, .. }) if t.subject == target.subject
                    ),
                    _ => false,
                };
                if same_subject_child && !is_root {
                    children[0]
                } else {
                    let new_id = out.push(Node::Part {
                        target: target.clone(),
                        children,
                    });
                    out.index.insert(target.clone(), new_id);
                    new_id
                }
            }
            Node::And(_) => out.connective(children, true),
            Node::Or(_) => out.connective(children, false),
            other => {
                let new_id = out.push(other.clone());
                if let Node::Broken(target) = other {
                    out.index.insert(target.clone(), new_id);
                }
                new_id
            }
        };
        memo.insert(id, new_id);
        new_id
    }

    fn connective(&mut self, children: Vec<NodeId>, is_and: bool) -> NodeId {
        let mut flat: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            match self.node(child) {
                Some(Node::And(grand)) if is_and => flat.extend(grand.iter().copied()),
                Some(Node::Or(grand)) if !is_and => flat.extend(grand.iter().copied()),
                _ => flat.push(child),
            }
        }
        let mut seen = FxHashSet::default();
        flat.retain(|c| seen.insert(*c));
        if let [only] = flat.as_slice() {
            return *only;
        }
        self.push(if is_and { Node::And(flat) } else { Node::Or(flat) })
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}
