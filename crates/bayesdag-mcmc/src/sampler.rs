//! Single-chain Metropolis-Hastings driver.

use bayesdag_core::{DagError, ErrorInfo, NodeId, RngHandle};
use bayesdag_dag::{LnComponents, Model};
use tracing::{debug, info, warn};

use crate::config::SamplerConfig;
use crate::monitor::Monitor;
use crate::moves::{Move, MoveSummary};
use crate::rewire::{rebind_monitor, rewire_monitor, rewire_move};
use crate::schedule::{MoveSchedule, ScheduleKind};
use crate::tempering::ChainHeat;

/// One MCMC chain: an owned model copy, its moves, monitors and schedule.
///
/// All mutation of the model goes through the propose / keep / restore
/// protocol, so a chain never observes a half-applied proposal.
#[derive(Debug)]
pub struct Sampler {
    pub(crate) model: Model,
    pub(crate) moves: Vec<Move>,
    pub(crate) monitors: Vec<Box<dyn Monitor>>,
    schedule: Option<Box<dyn MoveSchedule>>,
    schedule_kind: ScheduleKind,
    rng: RngHandle,
    seed: u64,
    pub(crate) generation: u64,
    chain_index: usize,
    heat: ChainHeat,
    active: bool,
    prior_only: bool,
    max_init_attempts: usize,
    monitors_started: bool,
}

impl Sampler {
    /// Builds a chain over a private copy of `model`.
    ///
    /// `moves` and `monitors` must reference nodes of `model`; the chain owns
    /// rewired clones of them.
    pub fn new(
        model: &Model,
        moves: &[Move],
        monitors: &[Box<dyn Monitor>],
        config: SamplerConfig,
    ) -> Result<Self, DagError> {
        Self::replace_dag(model, model.clone(), moves, monitors, config)
    }

    /// Builds a chain over `target`, rebinding clones of `moves` and
    /// `monitors` from `source` by node name.
    pub fn replace_dag(
        source: &Model,
        target: Model,
        moves: &[Move],
        monitors: &[Box<dyn Monitor>],
        config: SamplerConfig,
    ) -> Result<Self, DagError> {
        config.validate()?;
        let moves = moves
            .iter()
            .map(|mv| rewire_move(mv, source, &target))
            .collect::<Result<Vec<_>, _>>()?;
        let monitors = monitors
            .iter()
            .map(|monitor| rewire_monitor(monitor.as_ref(), source, &target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            model: target,
            moves,
            monitors,
            schedule: None,
            schedule_kind: config.schedule,
            rng: RngHandle::from_seed(config.seed),
            seed: config.seed,
            generation: 0,
            chain_index: config.chain_index,
            heat: ChainHeat {
                likelihood: config.likelihood_heat,
                posterior: config.posterior_heat,
            },
            active: config.active,
            prior_only: config.prior_only,
            max_init_attempts: config.max_init_attempts,
            monitors_started: false,
        })
    }

    /// Builds an independent chain from this one through name rewiring.
    ///
    /// The replica starts uninitialized, with fresh monitors and the same
    /// configuration.
    pub fn replicate(&self) -> Result<Self, DagError> {
        Self::replace_dag(
            &self.model,
            self.model.clone(),
            &self.moves,
            &self.monitors,
            self.config(),
        )
    }

    /// Configuration reflecting the chain's current settings.
    pub fn config(&self) -> SamplerConfig {
        SamplerConfig {
            schedule: self.schedule_kind,
            max_init_attempts: self.max_init_attempts,
            likelihood_heat: self.heat.likelihood,
            posterior_heat: self.heat.posterior,
            chain_index: self.chain_index,
            active: self.active,
            prior_only: self.prior_only,
            seed: self.seed,
        }
    }

    /// Finds a starting state with computable probability and builds the schedule.
    ///
    /// Every node is touched first; inactive chains additionally redraw all
    /// free stochastic nodes. Each attempt evaluates the stochastic nodes in
    /// topological order and, on a non-finite log-probability or a draw the
    /// distribution refused, redraws the free ones before retrying.
    pub fn initialize(&mut self) -> Result<(), DagError> {
        let order = self.model.ordered_stochastic_nodes();
        for id in self.model.all_nodes() {
            self.model.touch(id)?;
        }
        let mut refused = if self.active {
            None
        } else {
            self.redraw_free_nodes(&order)?
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let failed = match refused.take() {
                Some(id) => Some(id),
                None => self.first_non_computable(&order)?,
            };
            let Some(failed) = failed else {
                break;
            };
            let label = self.model.label(failed);
            if attempt >= self.max_init_attempts {
                self.model.keep_all()?;
                return Err(DagError::Initialization(
                    ErrorInfo::new(
                        "no-computable-starting-state",
                        "unable to find a starting state with computable probability",
                    )
                    .with_context("chain", self.chain_index)
                    .with_context("node", label)
                    .with_context("attempts", attempt)
                    .with_hint("check initial values, clamped data and distribution parameters"),
                ));
            }
            warn!(
                chain = self.chain_index,
                node = %label,
                attempt,
                "could not compute log probability; drawing new initial states"
            );
            refused = self.redraw_free_nodes(&order)?;
        }
        self.model.keep_all()?;

        let weights: Vec<f64> = self.moves.iter().map(Move::weight).collect();
        self.schedule = Some(self.schedule_kind.build(&weights)?);
        self.generation = 0;
        info!(
            chain = self.chain_index,
            attempts = attempt,
            schedule = %self.schedule_kind,
            moves = self.moves.len(),
            "chain initialized"
        );
        Ok(())
    }

    fn first_non_computable(&mut self, order: &[NodeId]) -> Result<Option<NodeId>, DagError> {
        for id in order {
            if !self.model.ln_probability(*id)?.is_finite() {
                return Ok(Some(*id));
            }
        }
        Ok(None)
    }

    /// Redraws every free node; returns the first node whose distribution
    /// refused to sample from its current parents.
    fn redraw_free_nodes(&mut self, order: &[NodeId]) -> Result<Option<NodeId>, DagError> {
        let mut refused = None;
        for id in order {
            let node = self.model.node(*id)?;
            if node.is_clamped() {
                self.model.touch(*id)?;
                continue;
            }
            if let Err(err) = self.model.redraw(*id, &mut self.rng) {
                debug!(
                    chain = self.chain_index,
                    node = %self.model.label(*id),
                    error = %err,
                    "initial draw refused"
                );
                self.model.touch(*id)?;
                refused.get_or_insert(*id);
            }
        }
        Ok(refused)
    }

    /// Returns true once [`Sampler::initialize`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.schedule.is_some()
    }

    fn ensure_initialized(&mut self) -> Result<(), DagError> {
        if !self.is_initialized() {
            self.initialize()?;
        }
        Ok(())
    }

    /// Performs one iteration: `round(moves per iteration)` proposals, each
    /// followed by a Metropolis-Hastings decision.
    ///
    /// The generation counter is advanced only when `advance` is set.
    pub fn next_cycle(&mut self, advance: bool) -> Result<(), DagError> {
        let Some(schedule) = self.schedule.as_mut() else {
            return Err(DagError::Schedule(
                ErrorInfo::new("not-initialized", "chain must be initialized before it runs")
                    .with_context("chain", self.chain_index),
            ));
        };
        let proposals = schedule.moves_per_iteration().round() as usize;
        if !self.model.pending_nodes().is_empty() {
            self.model.keep_all()?;
        }
        for _ in 0..proposals {
            let index = schedule.next_move(self.generation, &mut self.rng);
            let mv = &mut self.moves[index];
            mv.prepare(&mut self.model, &mut self.rng)?;
            let ln_hastings = match mv.propose(&mut self.model, &mut self.rng) {
                Ok(ln) => ln,
                Err(err) => {
                    mv.reject(&mut self.model)?;
                    self.model.restore_all()?;
                    return Err(err.with_context("move", mv.name()));
                }
            };
            let delta = pending_delta(&mut self.model, self.prior_only)?;
            let ln_ratio = self.heat.apply(&delta) + ln_hastings;
            let accepted = ln_ratio.is_finite()
                && (ln_ratio >= 0.0 || self.rng.uniform01().ln() < ln_ratio);
            if accepted {
                self.model.keep_all()?;
                mv.accept();
            } else {
                mv.reject(&mut self.model)?;
                self.model.restore_all()?;
            }
            debug!(
                chain = self.chain_index,
                generation = self.generation,
                proposal = mv.name(),
                ln_ratio,
                accepted,
                "move decided"
            );
        }
        if advance {
            self.generation += 1;
        }
        Ok(())
    }

    /// Opens monitor outputs and writes headers (active chains only).
    pub fn start_monitors(&mut self, expected_samples: usize) -> Result<(), DagError> {
        for monitor in &mut self.monitors {
            monitor.reset(expected_samples);
        }
        if self.active {
            for monitor in &mut self.monitors {
                monitor.open_output()?;
                monitor.write_header(&self.model)?;
            }
            self.monitors_started = true;
        }
        Ok(())
    }

    /// Passes `generation` to every monitor (active chains only).
    pub fn monitor(&mut self, generation: u64) -> Result<(), DagError> {
        if !self.active {
            return Ok(());
        }
        for monitor in &mut self.monitors {
            monitor.record(generation, &mut self.model)?;
        }
        Ok(())
    }

    /// Closes monitor outputs.
    pub fn close_monitors(&mut self) -> Result<(), DagError> {
        for monitor in &mut self.monitors {
            monitor.close()?;
        }
        self.monitors_started = false;
        Ok(())
    }

    /// Advances `generations` iterations, recording after each one.
    pub(crate) fn advance(&mut self, generations: u64) -> Result<(), DagError> {
        for _ in 0..generations {
            self.next_cycle(true)?;
            self.monitor(self.generation)?;
        }
        Ok(())
    }

    /// Samples `generations` generations, initializing first if needed.
    ///
    /// Monitors are opened at the start, record generation 0 of a fresh
    /// chain, and are closed at the end.
    pub fn run(&mut self, generations: u64) -> Result<(), DagError> {
        self.ensure_initialized()?;
        if !self.monitors_started {
            self.start_monitors(generations as usize)?;
        }
        if self.generation == 0 {
            self.monitor(0)?;
        }
        self.advance(generations)?;
        self.close_monitors()?;
        info!(
            chain = self.chain_index,
            generation = self.generation,
            "run finished"
        );
        Ok(())
    }

    /// Runs `generations` iterations without advancing the generation
    /// counter, tuning every `tuning_interval` iterations (0 disables tuning).
    /// Move counters are cleared afterwards.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), DagError> {
        self.ensure_initialized()?;
        for iteration in 1..=generations {
            self.next_cycle(false)?;
            if tuning_interval > 0 && iteration % tuning_interval == 0 {
                self.tune();
            }
        }
        for mv in &mut self.moves {
            mv.reset_counters();
        }
        Ok(())
    }

    /// Tunes every move from its acceptance rate since the last tune.
    pub fn tune(&mut self) {
        for mv in &mut self.moves {
            if let Some(rate) = mv.auto_tune() {
                info!(
                    chain = self.chain_index,
                    proposal = mv.name(),
                    rate,
                    tuning_parameter = mv.tuning_parameter().unwrap_or(f64::NAN),
                    "tuned move"
                );
            }
        }
    }

    /// Resets the generation counter, move counters and monitors.
    pub fn reset(&mut self) {
        self.generation = 0;
        for mv in &mut self.moves {
            mv.reset_counters();
        }
        for monitor in &mut self.monitors {
            monitor.reset(0);
        }
    }

    /// Unheated joint log-probability of the current state.
    pub fn model_ln_probability(&mut self) -> Result<f64, DagError> {
        Ok(self.model.ln_components()?.posterior())
    }

    /// Likelihood and prior terms as seen by the acceptance test.
    pub fn ln_components(&mut self) -> Result<LnComponents, DagError> {
        let mut components = self.model.ln_components()?;
        if self.prior_only {
            components.likelihood = 0.0;
        }
        Ok(components)
    }

    /// Per-move statistics.
    pub fn operator_summary(&self) -> Vec<MoveSummary> {
        self.moves.iter().map(|mv| mv.summary(&self.model)).collect()
    }

    /// One-line description of the move schedule.
    pub fn strategy_description(&self) -> String {
        let per_iteration = match &self.schedule {
            Some(schedule) => schedule.moves_per_iteration(),
            None => match self.schedule_kind {
                ScheduleKind::Single => 1.0,
                ScheduleKind::Random => self.moves.iter().map(Move::weight).sum(),
                ScheduleKind::Sequential => {
                    self.moves.iter().map(|mv| mv.weight().round()).sum()
                }
            },
        };
        format!(
            "{} schedule: {} moves, {} moves per iteration",
            self.schedule_kind,
            self.moves.len(),
            per_iteration.round()
        )
    }

    /// Adds a monitor bound to this chain's model.
    pub fn add_monitor(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    /// Removes every monitor.
    pub fn remove_monitors(&mut self) {
        self.monitors.clear();
        self.monitors_started = false;
    }

    /// The chain's model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Mutable access to the chain's model, e.g. to clamp data.
    ///
    /// Edits left pending are committed before the next iteration's first
    /// proposal, so a rejection never rolls them back.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// Moves bound to this chain.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Mutable access to the moves.
    pub fn moves_mut(&mut self) -> &mut [Move] {
        &mut self.moves
    }

    /// Monitors bound to this chain.
    pub fn monitors(&self) -> &[Box<dyn Monitor>] {
        &self.monitors
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Position within an ensemble.
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    /// Sets the position within an ensemble.
    pub fn set_chain_index(&mut self, index: usize) {
        self.chain_index = index;
    }

    /// Current heats.
    pub fn heat(&self) -> ChainHeat {
        self.heat
    }

    /// Replaces both heats.
    pub fn set_heat(&mut self, heat: ChainHeat) {
        self.heat = heat;
    }

    /// Likelihood heat.
    pub fn likelihood_heat(&self) -> f64 {
        self.heat.likelihood
    }

    /// Sets the likelihood heat.
    pub fn set_likelihood_heat(&mut self, heat: f64) {
        self.heat.likelihood = heat;
    }

    /// Posterior heat.
    pub fn posterior_heat(&self) -> f64 {
        self.heat.posterior
    }

    /// Sets the posterior heat.
    pub fn set_posterior_heat(&mut self, heat: f64) {
        self.heat.posterior = heat;
    }

    /// Whether the chain emits to monitors.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Marks the chain as active or inactive.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether likelihood terms are ignored.
    pub fn is_prior_only(&self) -> bool {
        self.prior_only
    }

    /// Schedule variant.
    pub fn schedule_kind(&self) -> ScheduleKind {
        self.schedule_kind
    }

    /// Switches the schedule variant, rebuilding it if the chain is initialized.
    pub fn set_schedule_kind(&mut self, kind: ScheduleKind) -> Result<(), DagError> {
        self.schedule_kind = kind;
        if self.schedule.is_some() {
            let weights: Vec<f64> = self.moves.iter().map(Move::weight).collect();
            self.schedule = Some(kind.build(&weights)?);
        }
        Ok(())
    }

    pub(crate) fn monitors_started(&self) -> bool {
        self.monitors_started
    }
}

/// Exchanges the monitors of two chains, rebinding each set by name to the
/// model of its new owner. Open outputs travel with their monitors.
pub(crate) fn exchange_monitors(a: &mut Sampler, b: &mut Sampler) -> Result<(), DagError> {
    std::mem::swap(&mut a.monitors, &mut b.monitors);
    std::mem::swap(&mut a.monitors_started, &mut b.monitors_started);
    for monitor in &mut a.monitors {
        rebind_monitor(monitor.as_mut(), &b.model, &a.model)?;
    }
    for monitor in &mut b.monitors {
        rebind_monitor(monitor.as_mut(), &a.model, &b.model)?;
    }
    Ok(())
}

impl Clone for Sampler {
    /// Deep copy; node identifiers stay valid because the model arena is
    /// cloned index for index. Open monitor outputs are not shared.
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            moves: self.moves.clone(),
            monitors: self.monitors.clone(),
            schedule: self.schedule.clone(),
            schedule_kind: self.schedule_kind,
            rng: self.rng.clone(),
            seed: self.seed,
            generation: self.generation,
            chain_index: self.chain_index,
            heat: self.heat,
            active: self.active,
            prior_only: self.prior_only,
            max_init_attempts: self.max_init_attempts,
            monitors_started: false,
        }
    }
}

/// Change of likelihood and prior over the stochastic nodes touched in the
/// current cycle.
fn pending_delta(model: &mut Model, prior_only: bool) -> Result<LnComponents, DagError> {
    let mut delta = LnComponents::default();
    for id in model.pending_nodes() {
        let node = model.node(id)?;
        if !node.is_stochastic() {
            continue;
        }
        let clamped = node.is_clamped();
        let Some(old) = model.stored_ln_probability(id)? else {
            continue;
        };
        let new = model.ln_probability(id)?;
        if clamped {
            if !prior_only {
                delta.likelihood += new - old;
            }
        } else {
            delta.prior += new - old;
        }
    }
    Ok(delta)
}
