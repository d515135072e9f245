//! Touch / recompute / keep / restore protocol.
//!
//! A node moves from clean to touched on [`Model::touch`], saving a backup
//! of its value and log-probability the first time within a cycle. Reading
//! a touched node recomputes it (parents first) and makes it clean again,
//! while the backup is retained until the cycle is resolved by
//! [`Model::keep`] (acceptance) or [`Model::restore`] (rejection).

use bayesdag_core::{DagError, NodeId, RngHandle, Value};
use tracing::trace;

use crate::model::{graph_error, Model};
use crate::node::{Backup, NodeKind};

impl Model {
    /// Marks `id` and every clean descendant as touched.
    ///
    /// Propagation stops at descendants that are already touched: their
    /// caches are invalid already and so are those of their own descendants.
    /// Constant nodes ignore touches.
    pub fn touch(&mut self, id: NodeId) -> Result<(), DagError> {
        if self.node(id)?.is_constant() {
            return Ok(());
        }
        self.mark(id);
        let mut stack: Vec<NodeId> = self.nodes[id.index()].children.iter().copied().collect();
        while let Some(next) = stack.pop() {
            let node = &self.nodes[next.index()];
            if node.dirty || node.is_constant() {
                continue;
            }
            self.mark(next);
            stack.extend(self.nodes[next.index()].children.iter().copied());
        }
        Ok(())
    }

    fn mark(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        if node.backup.is_none() {
            node.backup = Some(Backup {
                value: node.value.clone(),
                ln_probability: node.ln_probability,
                dirty: node.dirty,
            });
        }
        node.dirty = true;
    }

    /// Recomputes a touched node, refreshing deterministic ancestors first.
    pub(crate) fn refresh(&mut self, id: NodeId) -> Result<(), DagError> {
        if !self.node(id)?.dirty {
            return Ok(());
        }
        let parents = self.nodes[id.index()].parents.clone();
        for parent in &parents {
            if self.nodes[parent.index()].is_deterministic() {
                self.refresh(*parent)?;
            }
        }
        let node = &self.nodes[id.index()];
        let inputs = self.parent_values(&parents);
        let (value, ln_probability) = match &node.kind {
            NodeKind::Constant => (None, 0.0),
            NodeKind::Stochastic { distribution, .. } => {
                let ln = distribution
                    .ln_density(&node.value, &inputs)
                    .map_err(|err| err.with_context("node", node.label(id)))?;
                (None, ln)
            }
            NodeKind::Deterministic { function } => {
                let value = function
                    .compute(&inputs)
                    .map_err(|err| err.with_context("node", node.label(id)))?;
                (Some(value), 0.0)
            }
        };
        let node = &mut self.nodes[id.index()];
        if let Some(value) = value {
            node.value = value;
        }
        node.ln_probability = ln_probability;
        node.dirty = false;
        Ok(())
    }

    /// Current value of `id`, recomputed first if the node is touched.
    pub fn value(&mut self, id: NodeId) -> Result<&Value, DagError> {
        self.refresh(id)?;
        Ok(&self.nodes[id.index()].value)
    }

    /// Log-probability contributed by `id`, recomputed first if touched.
    ///
    /// Constant and deterministic nodes contribute zero. A non-finite result
    /// is returned as-is; callers treat it as a rejection signal.
    pub fn ln_probability(&mut self, id: NodeId) -> Result<f64, DagError> {
        self.refresh(id)?;
        Ok(self.nodes[id.index()].ln_probability)
    }

    /// Log-probability of `id` before the current cycle started, if touched.
    pub fn stored_ln_probability(&self, id: NodeId) -> Result<Option<f64>, DagError> {
        Ok(self
            .node(id)?
            .backup
            .as_ref()
            .map(|backup| backup.ln_probability))
    }

    /// Commits the recomputed state of `id` and every descendant holding a
    /// backup, discarding the backups.
    pub fn keep(&mut self, id: NodeId) -> Result<(), DagError> {
        self.node(id)?;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            self.refresh(next)?;
            self.nodes[next.index()].backup = None;
            for child in &self.nodes[next.index()].children {
                let node = &self.nodes[child.index()];
                if node.backup.is_some() || node.dirty {
                    stack.push(*child);
                }
            }
        }
        Ok(())
    }

    /// Commits every node: recomputes touched nodes and drops all backups.
    pub fn keep_all(&mut self) -> Result<(), DagError> {
        for id in self.topological_order() {
            self.refresh(id)?;
            self.nodes[id.index()].backup = None;
        }
        Ok(())
    }

    /// Reverts `id` and every descendant holding a backup to the state
    /// saved at their first touch.
    pub fn restore(&mut self, id: NodeId) -> Result<(), DagError> {
        self.node(id)?;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = &mut self.nodes[next.index()];
            if let Some(backup) = node.backup.take() {
                node.value = backup.value;
                node.ln_probability = backup.ln_probability;
                node.dirty = backup.dirty;
            }
            for child in &self.nodes[next.index()].children {
                if self.nodes[child.index()].backup.is_some() {
                    stack.push(*child);
                }
            }
        }
        Ok(())
    }

    /// Reverts every node holding a backup.
    pub fn restore_all(&mut self) -> Result<(), DagError> {
        for id in self.pending_nodes() {
            self.restore(id)?;
        }
        Ok(())
    }

    /// Touches `id` and then replaces its value.
    ///
    /// Only free stochastic nodes can be assigned; deterministic nodes are
    /// derived, constants are immutable and clamped nodes hold observed data.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<(), DagError> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::Stochastic { clamped: false, .. } => {}
            _ => {
                return Err(graph_error("immutable-node", "node value cannot be assigned")
                    .with_context("node", node.label(id))
                    .with_context("kind", node.kind.label()))
            }
        }
        self.touch(id)?;
        self.nodes[id.index()].value = value;
        Ok(())
    }

    /// Writes a value back into a node that is already part of the current
    /// cycle, without re-propagating. Used by proposals to undo their edit.
    pub fn revert_value(&mut self, id: NodeId, value: Value) -> Result<(), DagError> {
        let node = self.node_mut(id)?;
        if node.backup.is_none() {
            return Err(graph_error(
                "not-touched",
                "node must be touched before its value is reverted",
            )
            .with_context("node", id));
        }
        node.value = value;
        node.dirty = true;
        Ok(())
    }

    /// Draws a new value for a free stochastic node from its distribution.
    pub fn redraw(&mut self, id: NodeId, rng: &mut RngHandle) -> Result<(), DagError> {
        let node = self.node(id)?;
        let distribution = match &node.kind {
            NodeKind::Stochastic {
                distribution,
                clamped: false,
            } => distribution.clone(),
            _ => {
                return Err(graph_error("not-redrawable", "only free stochastic nodes can be redrawn")
                    .with_context("node", node.label(id))
                    .with_context("kind", node.kind.label()))
            }
        };
        let parents = node.parents.clone();
        for parent in &parents {
            self.refresh(*parent)?;
        }
        let value = distribution
            .sample(&self.parent_values(&parents), rng)
            .map_err(|err| err.with_context("node", self.label(id)))?;
        trace!(node = %self.label(id), value = %value, "redrew node");
        self.set_value(id, value)
    }

    /// Binds a stochastic node to observed data.
    pub fn clamp(&mut self, id: NodeId, value: Value) -> Result<(), DagError> {
        self.set_clamped(id, true)?;
        self.touch(id)?;
        self.nodes[id.index()].value = value;
        Ok(())
    }

    /// Releases a clamped node so that it can be resampled.
    pub fn unclamp(&mut self, id: NodeId) -> Result<(), DagError> {
        self.set_clamped(id, false)?;
        self.touch(id)
    }

    fn set_clamped(&mut self, id: NodeId, flag: bool) -> Result<(), DagError> {
        let label = self.label(id);
        match &mut self.node_mut(id)?.kind {
            NodeKind::Stochastic { clamped, .. } => {
                *clamped = flag;
                Ok(())
            }
            other => Err(graph_error("not-stochastic", "only stochastic nodes can be clamped")
                .with_context("node", label)
                .with_context("kind", other.label())),
        }
    }
}
