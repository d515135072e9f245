use bayesdag_core::DagError;

use crate::model::Model;

/// Joint log density split into likelihood (clamped) and prior (free) terms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LnComponents {
    /// Sum over clamped stochastic nodes.
    pub likelihood: f64,
    /// Sum over free stochastic nodes.
    pub prior: f64,
}

impl LnComponents {
    /// Unheated log posterior.
    pub fn posterior(&self) -> f64 {
        self.likelihood + self.prior
    }

    /// Log posterior with the likelihood raised to `likelihood_heat` and the
    /// whole expression to `posterior_heat`.
    pub fn heated(&self, likelihood_heat: f64, posterior_heat: f64) -> f64 {
        posterior_heat * (likelihood_heat * self.likelihood + self.prior)
    }
}

impl Model {
    /// Evaluates every stochastic node, recomputing touched ones.
    pub fn ln_components(&mut self) -> Result<LnComponents, DagError> {
        let mut components = LnComponents::default();
        for id in self.all_nodes() {
            let node = self.node(id)?;
            if !node.is_stochastic() {
                continue;
            }
            let clamped = node.is_clamped();
            let ln = self.ln_probability(id)?;
            if clamped {
                components.likelihood += ln;
            } else {
                components.prior += ln;
            }
        }
        Ok(components)
    }
}
