use std::fs;
use std::path::{Path, PathBuf};

use bayesdag_core::errors::ErrorInfo;
use bayesdag_core::{DagError, SchemaVersion, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::moves::MoveCounters;
use crate::sampler::Sampler;
use crate::tempering::ChainHeat;

/// Schema of checkpoint payloads written by this crate.
pub const CHECKPOINT_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Saved state of one move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCheckpoint {
    /// Proposal name.
    pub name: String,
    /// Names of the nodes the move acts on.
    pub nodes: Vec<String>,
    /// Acceptance counters.
    pub counters: MoveCounters,
    /// Tuning parameter, if the proposal has one.
    pub tuning_parameter: Option<f64>,
}

/// Serializable state of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Payload schema.
    pub schema: SchemaVersion,
    /// Generation at which the checkpoint was taken.
    pub generation: u64,
    /// Position within an ensemble.
    pub chain_index: usize,
    /// Heats at checkpoint time.
    pub heat: ChainHeat,
    /// Whether the chain was emitting to monitors.
    pub active: bool,
    /// Values of the named free stochastic nodes, in construction order.
    pub values: IndexMap<String, Value>,
    /// Move states, in chain order.
    pub moves: Vec<MoveCheckpoint>,
}

impl ChainCheckpoint {
    /// Captures the state of `sampler`.
    pub fn capture(sampler: &Sampler) -> Self {
        let model = sampler.model();
        let mut values = IndexMap::new();
        for id in model.ordered_stochastic_nodes() {
            if let Ok(node) = model.node(id) {
                if !node.is_clamped() && !node.name().is_empty() {
                    values.insert(node.name().to_string(), node.cached_value().clone());
                }
            }
        }
        let moves = sampler
            .moves()
            .iter()
            .map(|mv| MoveCheckpoint {
                name: mv.name().to_string(),
                nodes: mv.nodes().into_iter().map(|id| model.label(id)).collect(),
                counters: mv.counters(),
                tuning_parameter: mv.tuning_parameter(),
            })
            .collect();
        Self {
            schema: CHECKPOINT_SCHEMA,
            generation: sampler.generation(),
            chain_index: sampler.chain_index(),
            heat: sampler.heat(),
            active: sampler.is_active(),
            values,
            moves,
        }
    }

    /// Restores the payload from disk.
    pub fn load(path: &Path) -> Result<Self, DagError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            DagError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let payload: Self = serde_json::from_str(&contents).map_err(|err| {
            DagError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if !CHECKPOINT_SCHEMA.is_compatible_with(&payload.schema) {
            return Err(DagError::Serde(
                ErrorInfo::new("checkpoint-schema", "checkpoint schema is not supported")
                    .with_context("path", path.display().to_string())
                    .with_context("found", payload.schema.major),
            ));
        }
        Ok(payload)
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> Result<(), DagError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                DagError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            DagError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            DagError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

impl Sampler {
    /// Captures the chain state.
    pub fn checkpoint(&self) -> ChainCheckpoint {
        ChainCheckpoint::capture(self)
    }

    /// Applies a checkpoint by node name, initializing the chain first if
    /// needed. Moves are matched by position and must agree on name.
    pub fn restore_checkpoint(&mut self, checkpoint: &ChainCheckpoint) -> Result<(), DagError> {
        if checkpoint.moves.len() != self.moves.len() {
            return Err(DagError::Serde(
                ErrorInfo::new("checkpoint-mismatch", "checkpoint holds a different move set")
                    .with_context("expected", self.moves.len())
                    .with_context("found", checkpoint.moves.len()),
            ));
        }
        for (mv, saved) in self.moves.iter().zip(&checkpoint.moves) {
            if mv.name() != saved.name {
                return Err(DagError::Serde(
                    ErrorInfo::new("checkpoint-mismatch", "checkpoint move does not match")
                        .with_context("expected", mv.name())
                        .with_context("found", &saved.name),
                ));
            }
        }
        if !self.is_initialized() {
            self.initialize()?;
        }

        for (name, value) in &checkpoint.values {
            let id = self.model.node_by_name(name).ok_or_else(|| {
                DagError::Rewire(
                    ErrorInfo::new("missing-node", "no node with this name in the chain model")
                        .with_context("owner", "checkpoint")
                        .with_context("node", name),
                )
            })?;
            self.model.set_value(id, value.clone())?;
        }
        self.model.keep_all()?;

        for (mv, saved) in self.moves.iter_mut().zip(&checkpoint.moves) {
            mv.set_counters(saved.counters);
            if let Some(value) = saved.tuning_parameter {
                mv.set_tuning_parameter(value);
            }
        }
        self.generation = checkpoint.generation;
        self.set_chain_index(checkpoint.chain_index);
        self.set_heat(checkpoint.heat);
        self.set_active(checkpoint.active);
        Ok(())
    }
}

/// Deterministic checkpoint file name for a generation.
pub fn checkpoint_path(root: &Path, generation: u64) -> PathBuf {
    root.join(format!("chain_{generation:08}.json"))
}
