use std::fmt;

use bayesdag_core::{DagError, ErrorInfo, NodeId, RngHandle, Value};
use bayesdag_dag::Model;

/// Acceptance rate the built-in proposals tune toward.
pub const TARGET_ACCEPTANCE: f64 = 0.44;

/// Perturbation of one or more model nodes that can be undone.
///
/// A proposal is driven through `prepare`, `propose` and then exactly one of
/// the acceptance path (`cleanup`) or the rejection path (`undo` followed by
/// `cleanup`). `propose` must touch every node it edits so that the model can
/// roll the change back with `restore_all`.
pub trait Proposal: fmt::Debug + Send + Sync {
    /// Short name used in summaries and logs.
    fn name(&self) -> &str;

    /// Nodes the proposal acts on, in a stable order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Replaces the referenced nodes positionally (same order as [`Proposal::nodes`]).
    fn replace_nodes(&mut self, nodes: &[NodeId]);

    /// Replaces every reference to `old` by `new`.
    fn swap_node(&mut self, old: NodeId, new: NodeId) {
        let nodes: Vec<NodeId> = self
            .nodes()
            .into_iter()
            .map(|node| if node == old { new } else { node })
            .collect();
        self.replace_nodes(&nodes);
    }

    /// Chooses what to perturb before the edit.
    fn prepare(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<(), DagError>;

    /// Applies the edit and returns the log Hastings ratio.
    fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError>;

    /// Reverts exactly what [`Proposal::propose`] changed.
    fn undo(&mut self, model: &mut Model) -> Result<(), DagError>;

    /// Releases scratch state once the decision is final.
    fn cleanup(&mut self) {}

    /// Adapts the step size given the acceptance rate since the last tune.
    fn tune(&mut self, acceptance_rate: f64);

    /// Current tuning parameter, if the proposal has one.
    fn tuning_parameter(&self) -> Option<f64>;

    /// Overrides the tuning parameter. Ignored by untunable proposals.
    fn set_tuning_parameter(&mut self, value: f64);

    /// Clones the proposal behind a box.
    fn clone_box(&self) -> Box<dyn Proposal>;
}

impl Clone for Box<dyn Proposal> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Multiplicative tuning rule shared by the built-in proposals.
pub fn tune_toward_target(parameter: &mut f64, acceptance_rate: f64) {
    if acceptance_rate > TARGET_ACCEPTANCE {
        *parameter *= 1.0 + (acceptance_rate - TARGET_ACCEPTANCE) / (1.0 - TARGET_ACCEPTANCE);
    } else {
        *parameter /= 2.0 - acceptance_rate / TARGET_ACCEPTANCE;
    }
}

fn proposal_error(code: &str, message: &str, proposal: &str) -> DagError {
    DagError::Proposal(ErrorInfo::new(code, message).with_context("proposal", proposal))
}

fn require_free_stochastic(model: &Model, node: NodeId, proposal: &str) -> Result<(), DagError> {
    let record = model.node(node)?;
    if !record.is_stochastic() || record.is_clamped() {
        return Err(proposal_error(
            "invalid-target",
            "proposals can only act on free stochastic nodes",
            proposal,
        )
        .with_context("node", model.label(node))
        .with_context("kind", record.kind().label()));
    }
    Ok(())
}

fn require_value(model: &Model, node: NodeId, proposal: &str, expected: &str) -> Result<(), DagError> {
    let found = model.node(node)?.cached_value().type_name();
    if found != expected {
        return Err(proposal_error(
            "unsupported-value",
            "proposal does not support the node's value type",
            proposal,
        )
        .with_context("node", model.label(node))
        .with_context("expected", expected)
        .with_context("found", found));
    }
    Ok(())
}

fn require_positive(value: f64, proposal: &str) -> Result<(), DagError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(proposal_error(
            "invalid-tuning-parameter",
            "tuning parameter must be positive and finite",
            proposal,
        )
        .with_context("value", value));
    }
    Ok(())
}

/// Symmetric sliding window: `x + delta * (u - 0.5)`.
#[derive(Debug, Clone)]
pub struct SlideProposal {
    node: NodeId,
    delta: f64,
    stored: Option<f64>,
}

impl SlideProposal {
    /// Creates a slide over a free real-valued stochastic node.
    pub fn new(model: &Model, node: NodeId, delta: f64) -> Result<Self, DagError> {
        require_free_stochastic(model, node, "slide")?;
        require_value(model, node, "slide", "real")?;
        require_positive(delta, "slide")?;
        Ok(Self {
            node,
            delta,
            stored: None,
        })
    }
}

impl Proposal for SlideProposal {
    fn name(&self) -> &str {
        "slide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        if let Some(node) = nodes.first() {
            self.node = *node;
        }
    }

    fn prepare(&mut self, _model: &mut Model, _rng: &mut RngHandle) -> Result<(), DagError> {
        self.stored = None;
        Ok(())
    }

    fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError> {
        let old = model.value(self.node)?.as_real()?;
        let new = old + self.delta * (rng.uniform01() - 0.5);
        model.set_value(self.node, Value::Real(new))?;
        self.stored = Some(old);
        Ok(0.0)
    }

    fn undo(&mut self, model: &mut Model) -> Result<(), DagError> {
        if let Some(old) = self.stored.take() {
            model.revert_value(self.node, Value::Real(old))?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stored = None;
    }

    fn tune(&mut self, acceptance_rate: f64) {
        tune_toward_target(&mut self.delta, acceptance_rate);
    }

    fn tuning_parameter(&self) -> Option<f64> {
        Some(self.delta)
    }

    fn set_tuning_parameter(&mut self, value: f64) {
        self.delta = value;
    }

    fn clone_box(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

/// Multiplier `exp(lambda * (u - 0.5))`; Hastings ratio is the log multiplier.
#[derive(Debug, Clone)]
pub struct ScaleProposal {
    node: NodeId,
    lambda: f64,
    stored: Option<f64>,
}

impl ScaleProposal {
    /// Creates a scale move over a free real-valued stochastic node.
    pub fn new(model: &Model, node: NodeId, lambda: f64) -> Result<Self, DagError> {
        require_free_stochastic(model, node, "scale")?;
        require_value(model, node, "scale", "real")?;
        require_positive(lambda, "scale")?;
        Ok(Self {
            node,
            lambda,
            stored: None,
        })
    }
}

impl Proposal for ScaleProposal {
    fn name(&self) -> &str {
        "scale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        if let Some(node) = nodes.first() {
            self.node = *node;
        }
    }

    fn prepare(&mut self, _model: &mut Model, _rng: &mut RngHandle) -> Result<(), DagError> {
        self.stored = None;
        Ok(())
    }

    fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError> {
        let old = model.value(self.node)?.as_real()?;
        let ln_factor = self.lambda * (rng.uniform01() - 0.5);
        model.set_value(self.node, Value::Real(old * ln_factor.exp()))?;
        self.stored = Some(old);
        Ok(ln_factor)
    }

    fn undo(&mut self, model: &mut Model) -> Result<(), DagError> {
        if let Some(old) = self.stored.take() {
            model.revert_value(self.node, Value::Real(old))?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stored = None;
    }

    fn tune(&mut self, acceptance_rate: f64) {
        tune_toward_target(&mut self.lambda, acceptance_rate);
    }

    fn tuning_parameter(&self) -> Option<f64> {
        Some(self.lambda)
    }

    fn set_tuning_parameter(&mut self, value: f64) {
        self.lambda = value;
    }

    fn clone_box(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

/// Slides a single element of a real vector.
///
/// With a fixed index the same element is always perturbed; otherwise an
/// element is drawn uniformly in `prepare`.
#[derive(Debug, Clone)]
pub struct VectorElementSlideProposal {
    node: NodeId,
    lambda: f64,
    fixed_index: Option<usize>,
    index: usize,
    stored: Option<f64>,
}

impl VectorElementSlideProposal {
    /// Creates a slide acting on a random element of a free vector node.
    pub fn new(model: &Model, node: NodeId, lambda: f64) -> Result<Self, DagError> {
        Self::build(model, node, lambda, None)
    }

    /// Creates a slide that always acts on element `index`.
    pub fn fixed(model: &Model, node: NodeId, index: usize, lambda: f64) -> Result<Self, DagError> {
        Self::build(model, node, lambda, Some(index))
    }

    fn build(
        model: &Model,
        node: NodeId,
        lambda: f64,
        fixed_index: Option<usize>,
    ) -> Result<Self, DagError> {
        require_free_stochastic(model, node, "vector-element-slide")?;
        require_value(model, node, "vector-element-slide", "real-vector")?;
        require_positive(lambda, "vector-element-slide")?;
        let len = model.node(node)?.cached_value().as_vector()?.len();
        let out_of_range = match fixed_index {
            Some(index) => index >= len,
            None => len == 0,
        };
        if out_of_range {
            return Err(proposal_error(
                "element-out-of-range",
                "vector has no element at the requested index",
                "vector-element-slide",
            )
            .with_context("node", model.label(node))
            .with_context("len", len)
            .with_context("index", fixed_index.unwrap_or(0)));
        }
        Ok(Self {
            node,
            lambda,
            fixed_index,
            index: fixed_index.unwrap_or(0),
            stored: None,
        })
    }

    /// Element chosen by the last `prepare`.
    pub fn current_index(&self) -> usize {
        self.index
    }
}

impl Proposal for VectorElementSlideProposal {
    fn name(&self) -> &str {
        "vector-element-slide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        if let Some(node) = nodes.first() {
            self.node = *node;
        }
    }

    fn prepare(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<(), DagError> {
        self.stored = None;
        self.index = match self.fixed_index {
            Some(index) => index,
            None => rng.index(model.value(self.node)?.as_vector()?.len()),
        };
        Ok(())
    }

    fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError> {
        let mut value = model.value(self.node)?.clone();
        let elements = value.as_vector_mut()?;
        let old = elements.get(self.index).copied().ok_or_else(|| {
            proposal_error(
                "element-out-of-range",
                "vector has no element at the requested index",
                "vector-element-slide",
            )
            .with_context("index", self.index)
        })?;
        elements[self.index] = old + self.lambda * (rng.uniform01() - 0.5);
        model.set_value(self.node, value)?;
        self.stored = Some(old);
        Ok(0.0)
    }

    fn undo(&mut self, model: &mut Model) -> Result<(), DagError> {
        if let Some(old) = self.stored.take() {
            let mut value = model.node(self.node)?.cached_value().clone();
            if let Some(element) = value.as_vector_mut()?.get_mut(self.index) {
                *element = old;
            }
            model.revert_value(self.node, value)?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stored = None;
    }

    fn tune(&mut self, acceptance_rate: f64) {
        tune_toward_target(&mut self.lambda, acceptance_rate);
    }

    fn tuning_parameter(&self) -> Option<f64> {
        Some(self.lambda)
    }

    fn set_tuning_parameter(&mut self, value: f64) {
        self.lambda = value;
    }

    fn clone_box(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

/// Independence proposal drawing a fresh value from the node's own distribution.
///
/// The Hastings ratio `ln p(old) - ln p(new)` cancels the node's prior term,
/// so acceptance depends on the rest of the model only.
#[derive(Debug, Clone)]
pub struct PriorRedrawProposal {
    node: NodeId,
    stored: Option<Value>,
}

impl PriorRedrawProposal {
    /// Creates a redraw proposal over a free stochastic node of any value type.
    pub fn new(model: &Model, node: NodeId) -> Result<Self, DagError> {
        require_free_stochastic(model, node, "prior-redraw")?;
        Ok(Self { node, stored: None })
    }
}

impl Proposal for PriorRedrawProposal {
    fn name(&self) -> &str {
        "prior-redraw"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn replace_nodes(&mut self, nodes: &[NodeId]) {
        if let Some(node) = nodes.first() {
            self.node = *node;
        }
    }

    fn prepare(&mut self, _model: &mut Model, _rng: &mut RngHandle) -> Result<(), DagError> {
        self.stored = None;
        Ok(())
    }

    fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError> {
        let old = model.value(self.node)?.clone();
        let ln_old = model.ln_probability(self.node)?;
        model.redraw(self.node, rng)?;
        self.stored = Some(old);
        let ln_new = model.ln_probability(self.node)?;
        Ok(ln_old - ln_new)
    }

    fn undo(&mut self, model: &mut Model) -> Result<(), DagError> {
        if let Some(old) = self.stored.take() {
            model.revert_value(self.node, old)?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stored = None;
    }

    fn tune(&mut self, _acceptance_rate: f64) {}

    fn tuning_parameter(&self) -> Option<f64> {
        None
    }

    fn set_tuning_parameter(&mut self, _value: f64) {}

    fn clone_box(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}
