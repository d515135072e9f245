use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bayesdag_core::{Distribution, Function, NodeId, Value};

/// Variant tag of a graph node.
#[derive(Clone)]
pub enum NodeKind {
    /// Immutable value, never dirty, zero probability contribution.
    Constant,
    /// Random variable with a distribution over its value.
    Stochastic {
        /// Density and sampling adapter.
        distribution: Arc<dyn Distribution>,
        /// Whether the value is fixed to observed data.
        clamped: bool,
    },
    /// Value derived from the parents by a pure function.
    Deterministic {
        /// Value computation adapter.
        function: Arc<dyn Function>,
    },
}

impl NodeKind {
    /// Short label used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Constant => "constant",
            NodeKind::Stochastic { clamped: true, .. } => "clamped",
            NodeKind::Stochastic { .. } => "stochastic",
            NodeKind::Deterministic { .. } => "deterministic",
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Constant => f.write_str("Constant"),
            NodeKind::Stochastic {
                distribution,
                clamped,
            } => f
                .debug_struct("Stochastic")
                .field("distribution", &distribution.name())
                .field("clamped", clamped)
                .finish(),
            NodeKind::Deterministic { function } => f
                .debug_struct("Deterministic")
                .field("function", &function.name())
                .finish(),
        }
    }
}

/// Rollback state captured the first time a node is touched within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Backup {
    pub(crate) value: Value,
    pub(crate) ln_probability: f64,
    pub(crate) dirty: bool,
}

/// A single node of the dependency graph.
///
/// Parent links are ordered and define the positional arguments of the
/// node's adapter. Child links are non-owning back-references used only for
/// dirty propagation.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) value: Value,
    pub(crate) ln_probability: f64,
    pub(crate) dirty: bool,
    pub(crate) backup: Option<Backup>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: BTreeSet<NodeId>,
}

impl DagNode {
    pub(crate) fn new(name: String, kind: NodeKind, value: Value, parents: Vec<NodeId>) -> Self {
        let dirty = !matches!(kind, NodeKind::Constant);
        Self {
            name,
            kind,
            value,
            ln_probability: 0.0,
            dirty,
            backup: None,
            parents,
            children: BTreeSet::new(),
        }
    }

    /// Name of the node; empty for anonymous nodes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variant of the node.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Ordered parent identifiers.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Child identifiers.
    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    /// Whether the cached value or log-probability is stale.
    pub fn is_touched(&self) -> bool {
        self.dirty
    }

    /// Whether a rollback backup is held for the current cycle.
    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// The value saved at the first touch of the current cycle.
    pub fn stored_value(&self) -> Option<&Value> {
        self.backup.as_ref().map(|backup| &backup.value)
    }

    /// Raw cached value. Stale for a touched deterministic node; use
    /// [`Model::value`](crate::Model::value) to force recomputation.
    pub fn cached_value(&self) -> &Value {
        &self.value
    }

    /// Raw cached log-probability. Stale while the node is touched.
    pub fn cached_ln_probability(&self) -> f64 {
        self.ln_probability
    }

    /// Returns true for constant nodes.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    /// Returns true for stochastic nodes, clamped or not.
    pub fn is_stochastic(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { .. })
    }

    /// Returns true for deterministic nodes.
    pub fn is_deterministic(&self) -> bool {
        matches!(self.kind, NodeKind::Deterministic { .. })
    }

    /// Returns true for stochastic nodes bound to observed data.
    pub fn is_clamped(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { clamped: true, .. })
    }

    /// Returns the distribution adapter of a stochastic node.
    pub fn distribution(&self) -> Option<&Arc<dyn Distribution>> {
        match &self.kind {
            NodeKind::Stochastic { distribution, .. } => Some(distribution),
            _ => None,
        }
    }

    /// Label combining name and identifier for diagnostics.
    pub(crate) fn label(&self, id: NodeId) -> String {
        if self.name.is_empty() {
            id.to_string()
        } else {
            self.name.clone()
        }
    }
}
