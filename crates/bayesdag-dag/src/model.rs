use std::collections::BTreeSet;
use std::sync::Arc;

use bayesdag_core::{DagError, Distribution, ErrorInfo, Function, NodeId, Value};
use indexmap::IndexMap;
use tracing::debug;

use crate::node::{DagNode, NodeKind};

/// One independently cloneable DAG instance.
///
/// The model exclusively owns its nodes in an arena; every parent and child
/// link is an index into the same arena. Cloning a model therefore produces
/// a fully independent copy whose links already point at the cloned nodes.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub(crate) nodes: Vec<DagNode>,
    names: IndexMap<String, NodeId>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constant node.
    pub fn add_constant(&mut self, name: &str, value: impl Into<Value>) -> Result<NodeId, DagError> {
        let node = DagNode::new(name.to_string(), NodeKind::Constant, value.into(), Vec::new());
        self.insert(node)
    }

    /// Adds a free stochastic node with an initial value.
    pub fn add_stochastic(
        &mut self,
        name: &str,
        distribution: Arc<dyn Distribution>,
        parents: &[NodeId],
        initial: impl Into<Value>,
    ) -> Result<NodeId, DagError> {
        self.ensure_parents(parents)?;
        let kind = NodeKind::Stochastic {
            distribution,
            clamped: false,
        };
        let node = DagNode::new(name.to_string(), kind, initial.into(), parents.to_vec());
        self.insert(node)
    }

    /// Adds a deterministic node; its value is computed immediately.
    pub fn add_deterministic(
        &mut self,
        name: &str,
        function: Arc<dyn Function>,
        parents: &[NodeId],
    ) -> Result<NodeId, DagError> {
        self.ensure_parents(parents)?;
        for parent in parents {
            self.refresh(*parent)?;
        }
        let value = {
            let inputs = self.parent_values(parents);
            function.compute(&inputs).map_err(|err| {
                err.with_context("node", name)
                    .with_context("function", function.name())
            })?
        };
        let mut node = DagNode::new(
            name.to_string(),
            NodeKind::Deterministic { function },
            value,
            parents.to_vec(),
        );
        node.dirty = false;
        self.insert(node)
    }

    fn insert(&mut self, node: DagNode) -> Result<NodeId, DagError> {
        if !node.name.is_empty() && self.names.contains_key(&node.name) {
            return Err(graph_error("duplicate-name", "node name is already in use")
                .with_context("name", &node.name));
        }
        let id = NodeId::from_raw(self.nodes.len() as u64);
        for parent in &node.parents {
            self.nodes[parent.index()].children.insert(id);
        }
        if !node.name.is_empty() {
            self.names.insert(node.name.clone(), id);
        }
        self.nodes.push(node);
        Ok(id)
    }

    fn ensure_parents(&self, parents: &[NodeId]) -> Result<(), DagError> {
        for parent in parents {
            self.node(*parent)
                .map_err(|err| err.with_context("role", "parent"))?;
        }
        Ok(())
    }

    /// Number of nodes in the model.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the model holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node record for `id`.
    pub fn node(&self, id: NodeId) -> Result<&DagNode, DagError> {
        self.nodes.get(id.index()).ok_or_else(|| {
            graph_error("unknown-node", "node does not exist").with_context("node", id)
        })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut DagNode, DagError> {
        self.nodes.get_mut(id.index()).ok_or_else(|| {
            graph_error("unknown-node", "node does not exist").with_context("node", id)
        })
    }

    /// Looks up a node by its name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Human readable label of a node (its name, or its identifier when anonymous).
    pub fn label(&self, id: NodeId) -> String {
        self.nodes
            .get(id.index())
            .map(|node| node.label(id))
            .unwrap_or_else(|| id.to_string())
    }

    /// All node identifiers in construction order.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(|idx| NodeId::from_raw(idx as u64))
            .collect()
    }

    /// Nodes touched since the last `keep`/`restore` (holding a rollback backup).
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        self.filter_nodes(|node| node.backup.is_some())
    }

    /// Nodes whose cached value or log-probability is stale.
    pub fn touched_nodes(&self) -> Vec<NodeId> {
        self.filter_nodes(|node| node.dirty)
    }

    fn filter_nodes(&self, predicate: impl Fn(&DagNode) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| predicate(node))
            .map(|(idx, _)| NodeId::from_raw(idx as u64))
            .collect()
    }

    /// Node identifiers in a topological order (parents before children).
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.parents.iter().collect::<BTreeSet<_>>().len())
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| idx)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = ready.pop_first() {
            order.push(NodeId::from_raw(idx as u64));
            for child in &self.nodes[idx].children {
                let degree = &mut in_degree[child.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child.index());
                }
            }
        }
        order
    }

    /// Stochastic nodes (clamped included) in topological order.
    pub fn ordered_stochastic_nodes(&self) -> Vec<NodeId> {
        self.topological_order()
            .into_iter()
            .filter(|id| self.nodes[id.index()].is_stochastic())
            .collect()
    }

    /// Transitive closure of children of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Result<BTreeSet<NodeId>, DagError> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.nodes[next.index()].children.iter().copied());
            }
        }
        Ok(seen)
    }

    /// Replaces every occurrence of parent `old` of `child` by `new`.
    ///
    /// Edits that would make `child` depend on itself are rejected and leave
    /// the model unchanged. The child is touched afterwards.
    pub fn swap_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> Result<(), DagError> {
        self.node(new)?;
        if !self.node(child)?.parents.contains(&old) {
            return Err(graph_error("not-a-parent", "node is not a parent of the child")
                .with_context("child", self.label(child))
                .with_context("parent", self.label(old)));
        }
        if self.would_create_cycle(new, child) {
            return Err(graph_error(
                "would-create-cycle",
                "operation would introduce a directed cycle",
            )
            .with_context("child", self.label(child))
            .with_context("parent", self.label(new)));
        }
        for parent in self.nodes[child.index()].parents.iter_mut() {
            if *parent == old {
                *parent = new;
            }
        }
        self.nodes[old.index()].children.remove(&child);
        self.nodes[new.index()].children.insert(child);
        debug!(
            child = %self.label(child),
            old = %self.label(old),
            new = %self.label(new),
            "swapped parent"
        );
        self.touch(child)
    }

    /// Returns true when an edge `parent -> child` would close a cycle.
    fn would_create_cycle(&self, parent: NodeId, child: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        reaches(child, parent, &self.nodes, &mut visited)
    }

    pub(crate) fn parent_values(&self, parents: &[NodeId]) -> Vec<&Value> {
        parents
            .iter()
            .map(|parent| &self.nodes[parent.index()].value)
            .collect()
    }
}

fn reaches(
    node: NodeId,
    target: NodeId,
    nodes: &[DagNode],
    visited: &mut BTreeSet<NodeId>,
) -> bool {
    if node == target {
        return true;
    }
    if !visited.insert(node) {
        return false;
    }
    nodes[node.index()]
        .children
        .iter()
        .any(|child| reaches(*child, target, nodes, visited))
}

pub(crate) fn graph_error(code: impl Into<String>, message: impl Into<String>) -> DagError {
    DagError::Graph(ErrorInfo::new(code, message))
}
