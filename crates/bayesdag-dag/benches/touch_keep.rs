use std::sync::Arc;

use bayesdag_core::{NodeId, Value};
use bayesdag_dag::library::{Normal, Sum};
use bayesdag_dag::Model;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ladder(len: usize) -> (Model, NodeId) {
    let mut model = Model::new();
    let sd = model.add_constant("sd", 1.0).unwrap();
    let zero = model.add_constant("zero", 0.0).unwrap();
    let root = model
        .add_stochastic("root", Arc::new(Normal), &[zero, sd], 0.0)
        .unwrap();
    let mut previous = root;
    for idx in 0..len {
        let mean = model
            .add_deterministic(&format!("m{idx}"), Arc::new(Sum), &[previous])
            .unwrap();
        previous = model
            .add_stochastic(&format!("x{idx}"), Arc::new(Normal), &[mean, sd], 0.0)
            .unwrap();
    }
    model.keep_all().unwrap();
    (model, root)
}

fn touch_keep_bench(c: &mut Criterion) {
    let (mut model, root) = ladder(500);
    let mut step = 0.0;
    c.bench_function("touch_restore_500", |b| {
        b.iter(|| {
            step += 0.001;
            model.set_value(root, Value::Real(step)).unwrap();
            for id in model.ordered_stochastic_nodes() {
                black_box(model.ln_probability(id).unwrap());
            }
            model.restore_all().unwrap();
        });
    });
    c.bench_function("touch_keep_500", |b| {
        b.iter(|| {
            step += 0.001;
            model.set_value(root, Value::Real(step)).unwrap();
            model.keep_all().unwrap();
        });
    });
}

criterion_group!(benches, touch_keep_bench);
criterion_main!(benches);
