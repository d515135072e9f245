use std::sync::Arc;

use bayesdag_core::{NodeId, RngHandle, Value};
use bayesdag_dag::library::{Exp, Normal};
use bayesdag_dag::{state_hash, Model};

struct Chain {
    model: Model,
    a: NodeId,
    b: NodeId,
    c: NodeId,
}

fn chain() -> Chain {
    let mut model = Model::new();
    let mean = model.add_constant("mean", 0.0).unwrap();
    let sd = model.add_constant("sd", 1.0).unwrap();
    let a = model
        .add_stochastic("a", Arc::new(Normal), &[mean, sd], 0.25)
        .unwrap();
    let b = model.add_deterministic("b", Arc::new(Exp), &[a]).unwrap();
    let c = model
        .add_stochastic("c", Arc::new(Normal), &[b, sd], 1.0)
        .unwrap();
    model.clamp(c, Value::Real(1.4)).unwrap();
    model.keep_all().unwrap();
    Chain { model, a, b, c }
}

fn snapshot(model: &Model) -> Vec<(Value, bool, f64, bool)> {
    model
        .all_nodes()
        .into_iter()
        .map(|id| {
            let node = model.node(id).unwrap();
            (
                node.cached_value().clone(),
                node.is_touched(),
                node.cached_ln_probability(),
                node.has_backup(),
            )
        })
        .collect()
}

#[test]
fn touch_marks_downstream_and_read_cleans() {
    let Chain {
        mut model, a, b, c, ..
    } = chain();
    assert!(model.touched_nodes().is_empty());

    model.touch(a).unwrap();
    assert_eq!(model.touched_nodes(), vec![a, b, c]);

    model.ln_probability(c).unwrap();
    assert!(!model.node(b).unwrap().is_touched());
    assert!(!model.node(c).unwrap().is_touched());
    assert!(model.node(a).unwrap().is_touched());
    assert_eq!(model.pending_nodes(), vec![a, b, c]);
}

#[test]
fn rejected_edit_restores_exact_state() {
    let Chain { mut model, a, b, .. } = chain();
    let before = snapshot(&model);
    let hash = state_hash(&model);

    model.set_value(a, Value::Real(2.0)).unwrap();
    let b_value = model.value(b).unwrap().as_real().unwrap();
    assert!((b_value - 2.0_f64.exp()).abs() < 1e-12);
    assert_eq!(model.node(a).unwrap().stored_value(), Some(&Value::Real(0.25)));

    model.restore_all().unwrap();
    assert_eq!(snapshot(&model), before);
    assert_eq!(state_hash(&model), hash);
}

#[test]
fn accepted_edit_leaves_nothing_pending() {
    let Chain { mut model, a, b, c } = chain();
    let hash = state_hash(&model);
    model.set_value(a, Value::Real(-0.5)).unwrap();
    model.keep_all().unwrap();

    assert!(model.touched_nodes().is_empty());
    assert!(model.pending_nodes().is_empty());
    assert_eq!(model.node(b).unwrap().cached_value(), &Value::Real((-0.5_f64).exp()));
    let expected = -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5 * (1.4 - (-0.5_f64).exp()).powi(2);
    assert!((model.node(c).unwrap().cached_ln_probability() - expected).abs() < 1e-12);
    assert_ne!(state_hash(&model), hash);
}

#[test]
fn keep_commits_only_the_touched_subgraph() {
    let Chain { mut model, a, c, .. } = chain();
    model.set_value(a, Value::Real(0.75)).unwrap();
    model.keep(a).unwrap();
    assert!(model.pending_nodes().is_empty());
    assert!(!model.node(c).unwrap().is_touched());
}

#[test]
fn stored_ln_probability_tracks_first_touch() {
    let Chain { mut model, a, .. } = chain();
    let original = model.ln_probability(a).unwrap();
    assert_eq!(model.stored_ln_probability(a).unwrap(), None);

    model.set_value(a, Value::Real(1.0)).unwrap();
    model.ln_probability(a).unwrap();
    model.set_value(a, Value::Real(3.0)).unwrap();
    assert_eq!(model.stored_ln_probability(a).unwrap(), Some(original));
}

#[test]
fn immutable_nodes_reject_assignment() {
    let Chain { mut model, b, c, .. } = chain();
    let mean = model.node_by_name("mean").unwrap();
    for id in [mean, b, c] {
        let err = model.set_value(id, Value::Real(9.0)).unwrap_err();
        assert_eq!(err.code(), "immutable-node");
    }
    let mut rng = RngHandle::from_seed(1);
    let err = model.redraw(c, &mut rng).unwrap_err();
    assert_eq!(err.code(), "not-redrawable");
}

#[test]
fn revert_requires_a_pending_cycle() {
    let Chain { mut model, a, .. } = chain();
    let err = model.revert_value(a, Value::Real(0.0)).unwrap_err();
    assert_eq!(err.code(), "not-touched");

    model.set_value(a, Value::Real(5.0)).unwrap();
    model.revert_value(a, Value::Real(0.25)).unwrap();
    assert_eq!(model.value(a).unwrap(), &Value::Real(0.25));
}

#[test]
fn unclamp_makes_node_redrawable() {
    let Chain { mut model, c, .. } = chain();
    assert!(model.node(c).unwrap().is_clamped());
    model.unclamp(c).unwrap();
    assert!(!model.node(c).unwrap().is_clamped());

    let mut rng = RngHandle::from_seed(11);
    model.redraw(c, &mut rng).unwrap();
    assert!(model.node(c).unwrap().is_touched());
    model.keep_all().unwrap();
    assert!(model.ln_probability(c).unwrap().is_finite());
}

#[test]
fn clones_are_independent() {
    let Chain { mut model, a, b, .. } = chain();
    let mut copy = model.clone();
    copy.set_value(a, Value::Real(3.0)).unwrap();
    copy.keep_all().unwrap();

    assert_eq!(model.value(a).unwrap(), &Value::Real(0.25));
    assert_eq!(copy.value(b).unwrap(), &Value::Real(3.0_f64.exp()));
    assert!(model.touched_nodes().is_empty());
}

#[test]
fn components_split_clamped_and_free_terms() {
    let Chain { mut model, a, c, .. } = chain();
    let components = model.ln_components().unwrap();
    let prior = model.ln_probability(a).unwrap();
    let likelihood = model.ln_probability(c).unwrap();
    assert_eq!(components.prior, prior);
    assert_eq!(components.likelihood, likelihood);
    assert_eq!(components.posterior(), prior + likelihood);
    assert_eq!(components.heated(0.0, 1.0), prior);
}
