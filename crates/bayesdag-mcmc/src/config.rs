use std::fs;
use std::path::Path;

use bayesdag_core::{DagError, ErrorInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleKind;

/// Per-chain sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Move schedule policy.
    #[serde(default)]
    pub schedule: ScheduleKind,
    /// Evaluation attempts before initialization gives up.
    #[serde(default = "default_max_init_attempts")]
    pub max_init_attempts: usize,
    /// Exponent applied to the likelihood terms.
    #[serde(default = "default_heat")]
    pub likelihood_heat: f64,
    /// Exponent applied to the whole (likelihood-heated) posterior.
    #[serde(default = "default_heat")]
    pub posterior_heat: f64,
    /// Position of the chain within an ensemble.
    #[serde(default)]
    pub chain_index: usize,
    /// Active chains emit to monitors; inactive chains redraw on initialization.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Ignore clamped likelihood terms in the acceptance ratio.
    #[serde(default)]
    pub prior_only: bool,
    /// Seed of the chain's random source.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_init_attempts() -> usize {
    100
}

fn default_heat() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

fn default_seed() -> u64 {
    0x0BAD_5EED_CAFE_F00D_u64
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleKind::default(),
            max_init_attempts: default_max_init_attempts(),
            likelihood_heat: default_heat(),
            posterior_heat: default_heat(),
            chain_index: 0,
            active: default_active(),
            prior_only: false,
            seed: default_seed(),
        }
    }
}

impl SamplerConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), DagError> {
        if self.max_init_attempts == 0 {
            return Err(config_error(
                "invalid-init-attempts",
                "initialization needs at least one attempt",
            ));
        }
        check_heat("likelihood_heat", self.likelihood_heat)?;
        check_heat("posterior_heat", self.posterior_heat)
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, DagError> {
        let config: Self = parse_yaml(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn load(path: &Path) -> Result<Self, DagError> {
        Self::from_yaml_str(&read(path)?).map_err(|err| err.with_context("path", path.display()))
    }
}

/// Generation budget of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSchedule {
    /// Sampling generations.
    #[serde(default = "default_generations")]
    pub generations: u64,
    /// Burn-in iterations, which do not advance the generation counter.
    #[serde(default)]
    pub burn_in: u64,
    /// Iterations between tuning passes during burn-in (0 disables tuning).
    #[serde(default = "default_tuning_interval")]
    pub tuning_interval: u64,
}

fn default_generations() -> u64 {
    1_000
}

fn default_tuning_interval() -> u64 {
    100
}

impl Default for RunSchedule {
    fn default() -> Self {
        Self {
            generations: default_generations(),
            burn_in: 0,
            tuning_interval: default_tuning_interval(),
        }
    }
}

/// Heat ladder construction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LadderPolicy {
    /// Metropolis-coupled chains, posterior heat `1 / (1 + delta * i)`.
    Mc3 {
        /// Heat spacing.
        #[serde(default = "default_delta")]
        delta: f64,
    },
    /// Likelihood heats `((K - 1 - i) / (K - 1))^(1 / alpha)` from 1 down to 0.
    PowerPosterior {
        /// Shape of the power spacing.
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
    /// Explicit posterior heats, one per chain.
    Manual {
        /// Heats in chain order.
        heats: Vec<f64>,
    },
}

fn default_delta() -> f64 {
    0.2
}

fn default_alpha() -> f64 {
    0.3
}

impl Default for LadderPolicy {
    fn default() -> Self {
        LadderPolicy::Mc3 {
            delta: default_delta(),
        }
    }
}

/// Multi-chain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of chains.
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Heat ladder.
    #[serde(default)]
    pub ladder: LadderPolicy,
    /// Generations each chain advances between swap attempts.
    #[serde(default = "default_swap_interval")]
    pub swap_interval: u64,
    /// Worker threads; `None` uses the global rayon pool.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Seed from which chain and swap streams are derived.
    #[serde(default = "default_seed")]
    pub master_seed: u64,
    /// Settings shared by every chain. Heats, index, seed and activity are
    /// overridden per chain.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Generation budget.
    #[serde(default)]
    pub run: RunSchedule,
}

fn default_chains() -> usize {
    4
}

fn default_swap_interval() -> u64 {
    1
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            ladder: LadderPolicy::default(),
            swap_interval: default_swap_interval(),
            threads: None,
            master_seed: default_seed(),
            sampler: SamplerConfig::default(),
            run: RunSchedule::default(),
        }
    }
}

impl EnsembleConfig {
    /// Checks value ranges and ladder consistency.
    pub fn validate(&self) -> Result<(), DagError> {
        if self.chains == 0 {
            return Err(config_error("invalid-chain-count", "ensemble needs at least one chain"));
        }
        if self.swap_interval == 0 {
            return Err(config_error(
                "invalid-swap-interval",
                "swap interval must be at least one generation",
            ));
        }
        if self.threads == Some(0) {
            return Err(config_error("invalid-threads", "thread count must be positive"));
        }
        match &self.ladder {
            LadderPolicy::Mc3 { delta } if !(delta.is_finite() && *delta >= 0.0) => {
                return Err(config_error("invalid-ladder", "mc3 delta must be non-negative")
                    .with_context("delta", delta));
            }
            LadderPolicy::PowerPosterior { alpha } if !(alpha.is_finite() && *alpha > 0.0) => {
                return Err(config_error(
                    "invalid-ladder",
                    "power-posterior alpha must be positive",
                )
                .with_context("alpha", alpha));
            }
            LadderPolicy::Manual { heats } => {
                if heats.len() != self.chains {
                    return Err(config_error(
                        "invalid-ladder",
                        "manual ladder needs one heat per chain",
                    )
                    .with_context("chains", self.chains)
                    .with_context("heats", heats.len()));
                }
                for heat in heats {
                    check_heat("heats", *heat)?;
                }
            }
            _ => {}
        }
        self.sampler.validate()
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, DagError> {
        let config: Self = parse_yaml(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn load(path: &Path) -> Result<Self, DagError> {
        Self::from_yaml_str(&read(path)?).map_err(|err| err.with_context("path", path.display()))
    }
}

fn check_heat(field: &str, heat: f64) -> Result<(), DagError> {
    if !(heat.is_finite() && heat >= 0.0) {
        return Err(config_error("invalid-heat", "heats must be finite and non-negative")
            .with_context("field", field)
            .with_context("value", heat));
    }
    Ok(())
}

fn config_error(code: &str, message: &str) -> DagError {
    DagError::Config(ErrorInfo::new(code, message))
}

fn parse_yaml<T: DeserializeOwned>(text: &str) -> Result<T, DagError> {
    serde_yaml::from_str(text)
        .map_err(|err| DagError::Config(ErrorInfo::new("config-parse", err.to_string())))
}

fn read(path: &Path) -> Result<String, DagError> {
    fs::read_to_string(path).map_err(|err| {
        DagError::Config(
            ErrorInfo::new("config-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}
