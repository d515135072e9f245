use bayesdag_dag::LnComponents;
use serde::{Deserialize, Serialize};

use crate::config::LadderPolicy;

/// Heat pair assigned to one chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainHeat {
    /// Exponent on the likelihood terms.
    pub likelihood: f64,
    /// Exponent on the whole posterior.
    pub posterior: f64,
}

impl ChainHeat {
    /// The unheated target.
    pub const COLD: ChainHeat = ChainHeat {
        likelihood: 1.0,
        posterior: 1.0,
    };

    /// Heated log posterior of `components` under this heat.
    pub fn apply(&self, components: &LnComponents) -> f64 {
        components.heated(self.likelihood, self.posterior)
    }

    /// Ordering key; larger means colder.
    pub fn temperature_rank(&self) -> f64 {
        self.likelihood * self.posterior
    }
}

/// Builds one heat per chain following `policy`. Chain 0 is the coldest.
pub fn build_ladder(policy: &LadderPolicy, chains: usize) -> Vec<ChainHeat> {
    let chains = chains.max(1);
    match policy {
        LadderPolicy::Mc3 { delta } => (0..chains)
            .map(|i| ChainHeat {
                likelihood: 1.0,
                posterior: 1.0 / (1.0 + delta * i as f64),
            })
            .collect(),
        LadderPolicy::PowerPosterior { alpha } => (0..chains)
            .map(|i| {
                let likelihood = if chains == 1 {
                    1.0
                } else {
                    ((chains - 1 - i) as f64 / (chains - 1) as f64).powf(1.0 / alpha)
                };
                ChainHeat {
                    likelihood,
                    posterior: 1.0,
                }
            })
            .collect(),
        LadderPolicy::Manual { heats } => heats
            .iter()
            .map(|heat| ChainHeat {
                likelihood: 1.0,
                posterior: *heat,
            })
            .collect(),
    }
}

/// Log acceptance ratio of exchanging the heats of two chains.
///
/// For pure posterior heats this reduces to `(h_j - h_i)(lnP_i - lnP_j)`.
pub fn swap_ln_acceptance(
    heat_i: &ChainHeat,
    state_i: &LnComponents,
    heat_j: &ChainHeat,
    state_j: &LnComponents,
) -> f64 {
    heat_i.apply(state_j) + heat_j.apply(state_i) - heat_i.apply(state_i) - heat_j.apply(state_j)
}
