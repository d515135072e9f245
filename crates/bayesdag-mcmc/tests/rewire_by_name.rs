use std::sync::Arc;

use bayesdag_core::{DagError, RngHandle, Value};
use bayesdag_dag::library::Normal;
use bayesdag_dag::{state_hash, Model};
use bayesdag_mcmc::rewire::{map_by_name, rewire_monitor, rewire_move};
use bayesdag_mcmc::{Monitor, Move, Sampler, SamplerConfig, SlideProposal, TraceMonitor};


/// Same graph as `fixtures::normal_mean(&[1.0])` plus an unused constant,
/// built in a different order.
fn reordered() -> Result<Model, DagError> {
    let mut model = Model::new();
    model.add_constant("unused", 7.0)?;
    let ten = model.add_constant("ten", 10.0)?;
    let one = model.add_constant("one", 1.0)?;
    let zero = model.add_constant("zero", 0.0)?;
    let mu = model.add_stochastic("mu", Arc::new(Normal), &[zero, ten], 0.0)?;
    let x0 = model.add_stochastic("x0", Arc::new(Normal), &[mu, one], 1.0)?;
    model.clamp(x0, Value::Real(1.0))?;
    model.keep_all()?;
    Ok(model)
}

#[test]
fn rewired_move_acts_on_the_target_only() -> Result<(), DagError> {
    let source = fixtures::normal_mean(&[1.0])?;
    let mut target = reordered()?;
    let source_hash = state_hash(&source.model);

    let mv = Move::new(SlideProposal::new(&source.model, source.mu, 2.0)?, 1.0)?;
    let mut copy = rewire_move(&mv, &source.model, &target)?;
    let target_mu = target.node_by_name("mu").unwrap();
    assert_ne!(source.mu, target_mu);
    assert_eq!(copy.nodes(), vec![target_mu]);
    assert_eq!(mv.nodes(), vec![source.mu]);

    let mut rng = RngHandle::from_seed(9);
    copy.prepare(&mut target, &mut rng)?;
    copy.propose(&mut target, &mut rng)?;
    target.keep_all()?;
    copy.accept();

    assert_ne!(target.value(target_mu)?.as_real()?, 0.0);
    assert_eq!(state_hash(&source.model), source_hash);
    assert_eq!(mv.counters().tried, 0);
    Ok(())
}

#[test]
fn rewiring_is_deterministic() -> Result<(), DagError> {
    let source = fixtures::normal_mean(&[1.0])?;
    let target = reordered()?;
    let nodes = vec![source.data[0], source.mu];
    let first = map_by_name("trace", &nodes, &source.model, &target)?;
    let second = map_by_name("trace", &nodes, &source.model, &target)?;
    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            target.node_by_name("x0").unwrap(),
            target.node_by_name("mu").unwrap()
        ]
    );

    let monitor: Box<dyn Monitor> = Box::new(TraceMonitor::new(&nodes, 1)?);
    let rebound = rewire_monitor(monitor.as_ref(), &source.model, &target)?;
    assert_eq!(rebound.nodes(), first);
    assert_eq!(monitor.nodes(), nodes);
    Ok(())
}

#[test]
fn unnamed_nodes_cannot_be_rewired() -> Result<(), DagError> {
    let mut source = Model::new();
    let zero = source.add_constant("zero", 0.0)?;
    let one = source.add_constant("one", 1.0)?;
    let anonymous = source.add_stochastic("", Arc::new(Normal), &[zero, one], 0.0)?;
    source.keep_all()?;
    let mv = Move::new(SlideProposal::new(&source, anonymous, 1.0)?, 1.0)?;

    let err = Sampler::new(&source, &[mv], &[], SamplerConfig::default()).unwrap_err();
    assert!(matches!(err, DagError::Rewire(_)));
    assert_eq!(err.code(), "unnamed-node");
    assert_eq!(
        err.info().context.get("owner").map(String::as_str),
        Some("slide")
    );
    Ok(())
}

#[test]
fn missing_names_are_fatal() -> Result<(), DagError> {
    let source = fixtures::normal_mean(&[1.0, 2.0])?;
    let target = reordered()?;
    let monitor: Box<dyn Monitor> = Box::new(TraceMonitor::new(&source.data, 1)?);
    let err = rewire_monitor(monitor.as_ref(), &source.model, &target).unwrap_err();
    assert_eq!(err.code(), "missing-node");
    assert_eq!(
        err.info().context.get("node").map(String::as_str),
        Some("x1")
    );
    assert_eq!(
        err.info().context.get("owner").map(String::as_str),
        Some("trace")
    );
    Ok(())
}

#[test]
fn duplicate_names_are_rejected_at_construction() -> Result<(), DagError> {
    let mut model = Model::new();
    model.add_constant("a", 1.0)?;
    let err = model.add_constant("a", 2.0).unwrap_err();
    assert_eq!(err.code(), "duplicate-name");
    model.add_constant("", 3.0)?;
    model.add_constant("", 4.0)?;
    assert_eq!(model.len(), 3);
    Ok(())
}

#[test]
fn replicas_evolve_independently() -> Result<(), DagError> {
    let source = fixtures::normal_mean(&[0.5, 1.5])?;
    let mv = Move::new(SlideProposal::new(&source.model, source.mu, 1.0)?, 1.0)?;
    let mut original = Sampler::new(&source.model, &[mv], &[], SamplerConfig::default())?;
    let mut replica = original.replicate()?;

    original.run(50)?;
    let replica_hash = state_hash(replica.model());
    assert_eq!(replica.generation(), 0);
    assert!(!replica.is_initialized());
    assert_eq!(replica_hash, state_hash(&source.model));

    replica.run(10)?;
    assert_eq!(replica.generation(), 10);
    assert_eq!(original.generation(), 50);
    assert_eq!(state_hash(&source.model), {
        let fresh = fixtures::normal_mean(&[0.5, 1.5])?;
        state_hash(&fresh.model)
    });
    Ok(())
}
