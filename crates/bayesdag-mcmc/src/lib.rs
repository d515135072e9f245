#![deny(missing_docs)]
#![doc = "Metropolis-Hastings sampling over bayesdag models: proposals, moves, schedules, monitors and heated multi-chain ensembles."]

/// Serializable chain snapshots.
pub mod checkpoint;
/// YAML-backed sampler and ensemble settings.
pub mod config;
/// Seed derivation for chains and swaps.
pub mod determinism;
pub mod ensemble;
pub mod monitor;
/// Weighted proposals with acceptance bookkeeping.
pub mod moves;
/// Proposal kernels.
pub mod proposal;
/// Name-based rebinding of moves and monitors onto model copies.
pub mod rewire;
pub mod sampler;
pub mod schedule;
/// Heat ladders and swap acceptance.
pub mod tempering;

pub use checkpoint::{checkpoint_path, ChainCheckpoint, MoveCheckpoint, CHECKPOINT_SCHEMA};
pub use config::{EnsembleConfig, LadderPolicy, RunSchedule, SamplerConfig};
pub use ensemble::{Ensemble, SwapStats};
pub use monitor::{FileMonitor, Monitor, TraceMonitor, TraceRow};
pub use moves::{Move, MoveCounters, MoveSummary};
pub use proposal::{
    PriorRedrawProposal, Proposal, ScaleProposal, SlideProposal, VectorElementSlideProposal,
    TARGET_ACCEPTANCE,
};
pub use sampler::Sampler;
pub use schedule::{MoveSchedule, RandomSchedule, ScheduleKind, SequentialSchedule, SingleSchedule};
pub use tempering::{build_ladder, swap_ln_acceptance, ChainHeat};
