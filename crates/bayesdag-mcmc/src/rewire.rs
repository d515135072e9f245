use bayesdag_core::{DagError, ErrorInfo, NodeId};
use bayesdag_dag::Model;

use crate::monitor::Monitor;
use crate::moves::Move;

/// Maps `nodes` of `source` onto `target` by node name.
///
/// Unnamed nodes and names missing from `target` are fatal: they mean the
/// collaborator was built against a model it cannot be replicated from.
pub fn map_by_name(
    owner: &str,
    nodes: &[NodeId],
    source: &Model,
    target: &Model,
) -> Result<Vec<NodeId>, DagError> {
    nodes
        .iter()
        .map(|id| {
            let node = source
                .node(*id)
                .map_err(|err| err.with_context("owner", owner))?;
            if node.name().is_empty() {
                return Err(DagError::Rewire(
                    ErrorInfo::new("unnamed-node", "cannot rewire a node without a name")
                        .with_context("owner", owner)
                        .with_context("node", id)
                        .with_hint("give every node referenced by a move or monitor a name"),
                ));
            }
            target.node_by_name(node.name()).ok_or_else(|| {
                DagError::Rewire(
                    ErrorInfo::new("missing-node", "no node with this name in the target model")
                        .with_context("owner", owner)
                        .with_context("node", node.name()),
                )
            })
        })
        .collect()
}

/// Clones `mv` and rebinds it from `source` to `target`.
pub fn rewire_move(mv: &Move, source: &Model, target: &Model) -> Result<Move, DagError> {
    let nodes = map_by_name(mv.name(), &mv.nodes(), source, target)?;
    let mut copy = mv.clone();
    copy.replace_nodes(&nodes);
    Ok(copy)
}

/// Clones `monitor` and rebinds it from `source` to `target`.
pub fn rewire_monitor(
    monitor: &dyn Monitor,
    source: &Model,
    target: &Model,
) -> Result<Box<dyn Monitor>, DagError> {
    let mut copy = monitor.clone_box();
    rebind_monitor(copy.as_mut(), source, target)?;
    Ok(copy)
}

/// Rebinds `monitor` in place, keeping any open output.
pub fn rebind_monitor(
    monitor: &mut dyn Monitor,
    source: &Model,
    target: &Model,
) -> Result<(), DagError> {
    let nodes = map_by_name(monitor.name(), &monitor.nodes(), source, target)?;
    monitor.replace_nodes(&nodes);
    Ok(())
}
