use bayesdag_core::{DagError, ErrorInfo, NodeId, RngHandle};
use bayesdag_dag::Model;
use serde::{Deserialize, Serialize};

use crate::proposal::Proposal;

/// Acceptance bookkeeping of a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCounters {
    /// Proposals issued since the last reset.
    pub tried: u64,
    /// Proposals accepted since the last reset.
    pub accepted: u64,
    /// Proposals issued since the last tuning pass.
    pub tried_since_tune: u64,
    /// Proposals accepted since the last tuning pass.
    pub accepted_since_tune: u64,
}

/// Human readable statistics of a move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveSummary {
    /// Proposal name.
    pub name: String,
    /// Labels of the nodes the move acts on.
    pub nodes: Vec<String>,
    /// Relative update weight.
    pub weight: f64,
    /// Proposals issued.
    pub tried: u64,
    /// Proposals accepted.
    pub accepted: u64,
    /// `accepted / tried`, zero when nothing was tried.
    pub acceptance_ratio: f64,
    /// Current tuning parameter, if any.
    pub tuning_parameter: Option<f64>,
}

/// Weighted, tunable wrapper around a [`Proposal`].
#[derive(Debug, Clone)]
pub struct Move {
    proposal: Box<dyn Proposal>,
    weight: f64,
    auto_tuning: bool,
    counters: MoveCounters,
}

impl Move {
    /// Wraps `proposal` with an update weight. The weight must be positive.
    pub fn new(proposal: impl Proposal + 'static, weight: f64) -> Result<Self, DagError> {
        Self::from_box(Box::new(proposal), weight)
    }

    /// Wraps an already boxed proposal.
    pub fn from_box(proposal: Box<dyn Proposal>, weight: f64) -> Result<Self, DagError> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(DagError::Config(
                ErrorInfo::new("invalid-weight", "move weight must be positive and finite")
                    .with_context("move", proposal.name())
                    .with_context("weight", weight),
            ));
        }
        Ok(Self {
            proposal,
            weight,
            auto_tuning: true,
            counters: MoveCounters::default(),
        })
    }

    /// Enables or disables adaptation during tuning passes.
    pub fn with_auto_tuning(mut self, enabled: bool) -> Self {
        self.auto_tuning = enabled;
        self
    }

    /// Proposal name.
    pub fn name(&self) -> &str {
        self.proposal.name()
    }

    /// Relative update weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Nodes the wrapped proposal acts on.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.proposal.nodes()
    }

    /// Rebinds the proposal positionally.
    pub fn replace_nodes(&mut self, nodes: &[NodeId]) {
        self.proposal.replace_nodes(nodes);
    }

    /// Replaces every reference to `old` by `new`.
    pub fn swap_node(&mut self, old: NodeId, new: NodeId) {
        self.proposal.swap_node(old, new);
    }

    /// Wrapped proposal.
    pub fn proposal(&self) -> &dyn Proposal {
        self.proposal.as_ref()
    }

    /// Acceptance counters.
    pub fn counters(&self) -> MoveCounters {
        self.counters
    }

    /// Overwrites the acceptance counters.
    pub fn set_counters(&mut self, counters: MoveCounters) {
        self.counters = counters;
    }

    /// Current tuning parameter of the proposal.
    pub fn tuning_parameter(&self) -> Option<f64> {
        self.proposal.tuning_parameter()
    }

    /// Overrides the tuning parameter of the proposal.
    pub fn set_tuning_parameter(&mut self, value: f64) {
        self.proposal.set_tuning_parameter(value);
    }

    /// `accepted / tried` since the last reset.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.counters.tried == 0 {
            0.0
        } else {
            self.counters.accepted as f64 / self.counters.tried as f64
        }
    }

    /// Starts a proposal cycle.
    pub fn prepare(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<(), DagError> {
        self.proposal.prepare(model, rng)
    }

    /// Applies the proposal, counting it as tried, and returns the log Hastings ratio.
    pub fn propose(&mut self, model: &mut Model, rng: &mut RngHandle) -> Result<f64, DagError> {
        self.counters.tried += 1;
        self.counters.tried_since_tune += 1;
        self.proposal.propose(model, rng)
    }

    /// Finalizes an accepted proposal.
    pub fn accept(&mut self) {
        self.counters.accepted += 1;
        self.counters.accepted_since_tune += 1;
        self.proposal.cleanup();
    }

    /// Undoes a rejected proposal. The caller restores the model afterwards.
    pub fn reject(&mut self, model: &mut Model) -> Result<(), DagError> {
        self.proposal.undo(model)?;
        self.proposal.cleanup();
        Ok(())
    }

    /// Tunes the proposal from the acceptance rate since the last tune.
    ///
    /// Returns the rate used, or `None` when tuning is disabled or nothing
    /// was tried.
    pub fn auto_tune(&mut self) -> Option<f64> {
        if !self.auto_tuning || self.counters.tried_since_tune == 0 {
            return None;
        }
        let rate =
            self.counters.accepted_since_tune as f64 / self.counters.tried_since_tune as f64;
        self.proposal.tune(rate);
        self.counters.tried_since_tune = 0;
        self.counters.accepted_since_tune = 0;
        Some(rate)
    }

    /// Clears all counters.
    pub fn reset_counters(&mut self) {
        self.counters = MoveCounters::default();
    }

    /// Statistics with node labels resolved against `model`.
    pub fn summary(&self, model: &Model) -> MoveSummary {
        MoveSummary {
            name: self.name().to_string(),
            nodes: self.nodes().into_iter().map(|id| model.label(id)).collect(),
            weight: self.weight,
            tried: self.counters.tried,
            accepted: self.counters.accepted,
            acceptance_ratio: self.acceptance_ratio(),
            tuning_parameter: self.tuning_parameter(),
        }
    }
}
