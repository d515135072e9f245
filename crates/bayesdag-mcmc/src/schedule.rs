//! Policies selecting which moves run in a sampler iteration.

use std::fmt;

use bayesdag_core::{DagError, ErrorInfo, RngHandle};
use serde::{Deserialize, Serialize};

/// Selects the moves executed per iteration.
pub trait MoveSchedule: fmt::Debug + Send + Sync {
    /// Variant of the schedule.
    fn kind(&self) -> ScheduleKind;

    /// Expected number of moves per iteration; the sampler rounds it.
    fn moves_per_iteration(&self) -> f64;

    /// Index of the next move to perform.
    fn next_move(&mut self, generation: u64, rng: &mut RngHandle) -> usize;

    /// Clones the schedule behind a box.
    fn clone_box(&self) -> Box<dyn MoveSchedule>;
}

impl Clone for Box<dyn MoveSchedule> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Schedule variants selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    /// `round(sum of weights)` weighted draws with replacement.
    #[default]
    Random,
    /// Every move `round(weight)` times, in order.
    Sequential,
    /// One weighted draw per iteration.
    Single,
}

impl ScheduleKind {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Random => "random",
            ScheduleKind::Sequential => "sequential",
            ScheduleKind::Single => "single",
        }
    }

    /// Builds the schedule for moves with the given weights.
    pub fn build(&self, weights: &[f64]) -> Result<Box<dyn MoveSchedule>, DagError> {
        if weights.is_empty() {
            return Err(schedule_error("no-moves", "a schedule needs at least one move")
                .with_context("schedule", self.as_str()));
        }
        if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(
                schedule_error("invalid-weight", "move weights must be positive and finite")
                    .with_context("schedule", self.as_str())
                    .with_context("weight", bad),
            );
        }
        Ok(match self {
            ScheduleKind::Random => Box::new(RandomSchedule::new(weights)),
            ScheduleKind::Sequential => Box::new(SequentialSchedule::new(weights)?),
            ScheduleKind::Single => Box::new(SingleSchedule::new(weights)),
        })
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn schedule_error(code: &str, message: &str) -> DagError {
    DagError::Schedule(ErrorInfo::new(code, message))
}

#[derive(Debug, Clone)]
struct WeightTable {
    cumulative: Vec<f64>,
    total: f64,
}

impl WeightTable {
    fn new(weights: &[f64]) -> Self {
        let mut total = 0.0;
        let cumulative = weights
            .iter()
            .map(|w| {
                total += w;
                total
            })
            .collect();
        Self { cumulative, total }
    }

    fn draw(&self, rng: &mut RngHandle) -> usize {
        let u = rng.uniform01() * self.total;
        self.cumulative
            .partition_point(|bound| *bound <= u)
            .min(self.cumulative.len() - 1)
    }
}

/// Weighted sampling with replacement, `sum(weights)` moves per iteration.
#[derive(Debug, Clone)]
pub struct RandomSchedule {
    table: WeightTable,
}

impl RandomSchedule {
    /// Creates the schedule. `weights` must be non-empty.
    pub fn new(weights: &[f64]) -> Self {
        Self {
            table: WeightTable::new(weights),
        }
    }
}

impl MoveSchedule for RandomSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::Random
    }

    fn moves_per_iteration(&self) -> f64 {
        self.table.total
    }

    fn next_move(&mut self, _generation: u64, rng: &mut RngHandle) -> usize {
        self.table.draw(rng)
    }

    fn clone_box(&self) -> Box<dyn MoveSchedule> {
        Box::new(self.clone())
    }
}

/// Fixed order, each move repeated `round(weight)` times.
#[derive(Debug, Clone)]
pub struct SequentialSchedule {
    sequence: Vec<usize>,
    cursor: usize,
}

impl SequentialSchedule {
    /// Creates the schedule; fails when every weight rounds to zero.
    pub fn new(weights: &[f64]) -> Result<Self, DagError> {
        let sequence: Vec<usize> = weights
            .iter()
            .enumerate()
            .flat_map(|(idx, w)| std::iter::repeat(idx).take(w.round() as usize))
            .collect();
        if sequence.is_empty() {
            return Err(schedule_error(
                "empty-sequence",
                "every move weight rounds to zero repetitions",
            ));
        }
        Ok(Self {
            sequence,
            cursor: 0,
        })
    }
}

impl MoveSchedule for SequentialSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::Sequential
    }

    fn moves_per_iteration(&self) -> f64 {
        self.sequence.len() as f64
    }

    fn next_move(&mut self, _generation: u64, _rng: &mut RngHandle) -> usize {
        let index = self.sequence[self.cursor];
        self.cursor = (self.cursor + 1) % self.sequence.len();
        index
    }

    fn clone_box(&self) -> Box<dyn MoveSchedule> {
        Box::new(self.clone())
    }
}

/// Exactly one weighted draw per iteration.
#[derive(Debug, Clone)]
pub struct SingleSchedule {
    table: WeightTable,
}

impl SingleSchedule {
    /// Creates the schedule. `weights` must be non-empty.
    pub fn new(weights: &[f64]) -> Self {
        Self {
            table: WeightTable::new(weights),
        }
    }
}

impl MoveSchedule for SingleSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::Single
    }

    fn moves_per_iteration(&self) -> f64 {
        1.0
    }

    fn next_move(&mut self, _generation: u64, rng: &mut RngHandle) -> usize {
        self.table.draw(rng)
    }

    fn clone_box(&self) -> Box<dyn MoveSchedule> {
        Box::new(self.clone())
    }
}
