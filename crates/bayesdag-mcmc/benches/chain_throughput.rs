use std::sync::Arc;

use bayesdag_core::{NodeId, Value};
use bayesdag_dag::library::Normal;
use bayesdag_dag::Model;
use bayesdag_mcmc::{Ensemble, EnsembleConfig, Move, Sampler, SamplerConfig, SlideProposal};
use criterion::{criterion_group, criterion_main, Criterion};

fn hierarchy(groups: usize, per_group: usize) -> (Model, Vec<NodeId>) {
    let mut model = Model::new();
    let zero = model.add_constant("zero", 0.0).unwrap();
    let one = model.add_constant("one", 1.0).unwrap();
    let ten = model.add_constant("ten", 10.0).unwrap();
    let top = model
        .add_stochastic("top", Arc::new(Normal), &[zero, ten], 0.0)
        .unwrap();
    let mut free = vec![top];
    for g in 0..groups {
        let mean = model
            .add_stochastic(&format!("g{g}"), Arc::new(Normal), &[top, one], 0.0)
            .unwrap();
        free.push(mean);
        for i in 0..per_group {
            let x = model
                .add_stochastic(&format!("x{g}_{i}"), Arc::new(Normal), &[mean, one], 0.0)
                .unwrap();
            model
                .clamp(x, Value::Real(g as f64 + 0.1 * i as f64))
                .unwrap();
        }
    }
    model.keep_all().unwrap();
    (model, free)
}

fn moves(model: &Model, free: &[NodeId]) -> Vec<Move> {
    free.iter()
        .map(|id| Move::new(SlideProposal::new(model, *id, 1.0).unwrap(), 1.0).unwrap())
        .collect()
}

fn chain_bench(c: &mut Criterion) {
    let (model, free) = hierarchy(20, 10);
    let moves = moves(&model, &free);

    let mut sampler = Sampler::new(&model, &moves, &[], SamplerConfig::default()).unwrap();
    sampler.initialize().unwrap();
    c.bench_function("sampler_cycle_21_moves", |b| {
        b.iter(|| sampler.next_cycle(true).unwrap());
    });

    let config = EnsembleConfig {
        chains: 4,
        threads: Some(4),
        ..EnsembleConfig::default()
    };
    let mut ensemble = Ensemble::new(&model, &moves, &[], &config).unwrap();
    ensemble.initialize().unwrap();
    c.bench_function("ensemble_4_chains_10_generations", |b| {
        b.iter(|| ensemble.run(10).unwrap());
    });
}

criterion_group!(benches, chain_bench);
criterion_main!(benches);
