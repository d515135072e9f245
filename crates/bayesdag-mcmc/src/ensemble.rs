//! Heated multi-chain coordinator.
//!
//! Chains are advanced in parallel between swap points. A swap only reads
//! each chain's log-probability terms and exchanges heats and the active
//! flag; graphs are never shared between chains.

use bayesdag_core::{DagError, ErrorInfo, RngHandle};
use bayesdag_dag::Model;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EnsembleConfig, RunSchedule, SamplerConfig};
use crate::determinism::{chain_seed, swap_seed};
use crate::monitor::Monitor;
use crate::moves::Move;
use crate::sampler::{exchange_monitors, Sampler};
use crate::tempering::{build_ladder, swap_ln_acceptance, ChainHeat};

/// Swap statistics of one pair of adjacent heat ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStats {
    /// Swap attempts.
    pub tried: u64,
    /// Accepted swaps.
    pub accepted: u64,
}

/// A set of chains replicated from one model, move and monitor configuration.
#[derive(Debug)]
pub struct Ensemble {
    chains: Vec<Sampler>,
    ranks: Vec<usize>,
    swap_rng: RngHandle,
    swap_stats: Vec<SwapStats>,
    swap_interval: u64,
    pool: Option<rayon::ThreadPool>,
    run: RunSchedule,
    generation: u64,
}

impl Ensemble {
    /// Builds one chain per ladder rung, each over its own model copy.
    ///
    /// The coldest chain is active; seeds are derived from the master seed
    /// so results do not depend on the number of worker threads.
    pub fn new(
        model: &Model,
        moves: &[Move],
        monitors: &[Box<dyn Monitor>],
        config: &EnsembleConfig,
    ) -> Result<Self, DagError> {
        config.validate()?;
        let ladder = build_ladder(&config.ladder, config.chains);
        let ranks = rank_by_heat(&ladder);
        let mut chains = Vec::with_capacity(ladder.len());
        for (index, heat) in ladder.iter().enumerate() {
            let chain_config = SamplerConfig {
                chain_index: index,
                likelihood_heat: heat.likelihood,
                posterior_heat: heat.posterior,
                active: index == ranks[0],
                seed: chain_seed(config.master_seed, index),
                ..config.sampler.clone()
            };
            chains.push(Sampler::replace_dag(
                model,
                model.clone(),
                moves,
                monitors,
                chain_config,
            )?);
        }
        let pool = match config.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| {
                        DagError::Config(
                            ErrorInfo::new("thread-pool", err.to_string())
                                .with_context("threads", threads),
                        )
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            swap_stats: vec![SwapStats::default(); chains.len().saturating_sub(1)],
            chains,
            ranks,
            swap_rng: RngHandle::from_seed(swap_seed(config.master_seed)),
            swap_interval: config.swap_interval,
            pool,
            run: config.run.clone(),
            generation: 0,
        })
    }

    fn for_each_chain<F>(&mut self, op: F) -> Result<(), DagError>
    where
        F: Fn(&mut Sampler) -> Result<(), DagError> + Send + Sync,
    {
        let chains = &mut self.chains;
        match &self.pool {
            Some(pool) => pool.install(|| chains.par_iter_mut().try_for_each(|chain| op(chain))),
            None => chains.par_iter_mut().try_for_each(|chain| op(chain)),
        }
    }

    /// Initializes every chain.
    pub fn initialize(&mut self) -> Result<(), DagError> {
        self.for_each_chain(Sampler::initialize)?;
        info!(chains = self.chains.len(), "ensemble initialized");
        Ok(())
    }

    /// Runs burn-in on every chain independently; no swaps are attempted.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), DagError> {
        self.for_each_chain(move |chain| chain.burnin(generations, tuning_interval))
    }

    /// Samples `generations` generations, attempting one adjacent swap
    /// after every block of `swap_interval` generations.
    pub fn run(&mut self, generations: u64) -> Result<(), DagError> {
        self.for_each_chain(|chain| {
            if chain.is_initialized() {
                Ok(())
            } else {
                chain.initialize()
            }
        })?;
        let cold = self.ranks[0];
        if !self.chains[cold].monitors_started() {
            self.chains[cold].start_monitors(generations as usize)?;
        }
        if self.generation == 0 {
            self.chains[cold].monitor(0)?;
        }

        let mut remaining = generations;
        while remaining > 0 {
            let block = remaining.min(self.swap_interval);
            self.for_each_chain(move |chain| chain.advance(block))?;
            remaining -= block;
            self.generation += block;
            self.swap_neighbours()?;
        }

        let cold = self.ranks[0];
        self.chains[cold].close_monitors()?;
        let (tried, accepted) = self
            .swap_stats
            .iter()
            .fold((0, 0), |(t, a), stats| (t + stats.tried, a + stats.accepted));
        info!(
            generation = self.generation,
            swaps_tried = tried,
            swaps_accepted = accepted,
            "ensemble run finished"
        );
        Ok(())
    }

    fn swap_neighbours(&mut self) -> Result<(), DagError> {
        if self.chains.len() < 2 {
            return Ok(());
        }
        let rank = self.swap_rng.index(self.chains.len() - 1);
        let (i, j) = (self.ranks[rank], self.ranks[rank + 1]);
        let state_i = self.chains[i].ln_components()?;
        let state_j = self.chains[j].ln_components()?;
        let heat_i = self.chains[i].heat();
        let heat_j = self.chains[j].heat();
        let ln_acceptance = swap_ln_acceptance(&heat_i, &state_i, &heat_j, &state_j);
        let accepted = ln_acceptance.is_finite()
            && (ln_acceptance >= 0.0 || self.swap_rng.uniform01().ln() < ln_acceptance);

        self.swap_stats[rank].tried += 1;
        if accepted {
            self.swap_stats[rank].accepted += 1;
            let (a, b) = pair_mut(&mut self.chains, i, j);
            a.set_heat(heat_j);
            b.set_heat(heat_i);
            let (active_a, active_b) = (a.is_active(), b.is_active());
            a.set_active(active_b);
            b.set_active(active_a);
            if active_a != active_b {
                exchange_monitors(a, b)?;
            }
            self.ranks.swap(rank, rank + 1);
        }
        debug!(
            generation = self.generation,
            rank,
            chain_i = i,
            chain_j = j,
            ln_acceptance,
            accepted,
            "swap attempted"
        );
        Ok(())
    }

    /// Initializes, burns in and samples following the configured run schedule.
    pub fn execute(&mut self) -> Result<(), DagError> {
        self.initialize()?;
        if self.run.burn_in > 0 {
            self.burnin(self.run.burn_in, self.run.tuning_interval)?;
        }
        self.run(self.run.generations)
    }

    /// Chains in construction order.
    pub fn chains(&self) -> &[Sampler] {
        &self.chains
    }

    /// Chain at `index`.
    pub fn chain(&self, index: usize) -> Option<&Sampler> {
        self.chains.get(index)
    }

    /// The chain currently holding the coldest heat.
    pub fn cold_chain(&self) -> &Sampler {
        &self.chains[self.ranks[0]]
    }

    /// Chain indices ordered from coldest to hottest.
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// Heats in chain order.
    pub fn heats(&self) -> Vec<ChainHeat> {
        self.chains.iter().map(Sampler::heat).collect()
    }

    /// Swap statistics per adjacent rank pair, coldest pair first.
    pub fn swap_stats(&self) -> &[SwapStats] {
        &self.swap_stats
    }

    /// Generations sampled so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn rank_by_heat(ladder: &[ChainHeat]) -> Vec<usize> {
    let mut ranks: Vec<usize> = (0..ladder.len()).collect();
    ranks.sort_by(|a, b| {
        ladder[*b]
            .temperature_rank()
            .total_cmp(&ladder[*a].temperature_rank())
    });
    ranks
}

fn pair_mut(chains: &mut [Sampler], i: usize, j: usize) -> (&mut Sampler, &mut Sampler) {
    if i < j {
        let (low, high) = chains.split_at_mut(j);
        (&mut low[i], &mut high[0])
    } else {
        let (low, high) = chains.split_at_mut(i);
        (&mut high[0], &mut low[j])
    }
}
