use bayesdag_core::{DagError, RngHandle, Value};
use bayesdag_dag::{state_hash, Model};
use bayesdag_mcmc::{
    Move, PriorRedrawProposal, ScaleProposal, SlideProposal, VectorElementSlideProposal,
};
use proptest::prelude::*;


fn snapshot(model: &Model) -> Vec<(Value, f64, bool, bool)> {
    model
        .all_nodes()
        .into_iter()
        .map(|id| {
            let node = model.node(id).unwrap();
            (
                node.cached_value().clone(),
                node.cached_ln_probability(),
                node.is_touched(),
                node.has_backup(),
            )
        })
        .collect()
}

fn reject_cycle(model: &mut Model, mv: &mut Move, rng: &mut RngHandle) -> Result<(), DagError> {
    mv.prepare(model, rng)?;
    mv.propose(model, rng)?;
    // Force a read of every touched node so caches are recomputed before rollback.
    for id in model.pending_nodes() {
        model.ln_probability(id)?;
    }
    mv.reject(model)?;
    model.restore_all()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rejection_restores_exact_state(seed in any::<u64>(), which in 0usize..4) {
        let mut m = fixtures::mixed_model().unwrap();
        let mut moves = fixtures::mixed_moves(&m).unwrap();
        let mut rng = RngHandle::from_seed(seed);
        let before = snapshot(&m.model);
        let hash = state_hash(&m.model);

        reject_cycle(&mut m.model, &mut moves[which], &mut rng).unwrap();

        prop_assert_eq!(snapshot(&m.model), before);
        prop_assert_eq!(state_hash(&m.model), hash);
        prop_assert!(m.model.pending_nodes().is_empty());
        prop_assert_eq!(moves[which].counters().tried, 1);
        prop_assert_eq!(moves[which].counters().accepted, 0);
    }
}

#[test]
fn acceptance_commits_the_new_value() -> Result<(), DagError> {
    let mut m = fixtures::mixed_model()?;
    let mut mv = Move::new(SlideProposal::new(&m.model, m.mu, 1.0)?, 1.0)?;
    let mut rng = RngHandle::from_seed(7);
    let old = fixtures::real(&m.model, m.mu);
    let old_shift = fixtures::real(&m.model, m.shift);

    mv.prepare(&mut m.model, &mut rng)?;
    mv.propose(&mut m.model, &mut rng)?;
    m.model.keep_all()?;
    mv.accept();

    let new = fixtures::real(&m.model, m.mu);
    assert_ne!(new, old);
    assert!((new - old).abs() <= 0.5);
    assert!((fixtures::real(&m.model, m.shift) - (2.0 * new + 1.0)).abs() < 1e-12);
    assert_ne!(fixtures::real(&m.model, m.shift), old_shift);
    assert!(m.model.pending_nodes().is_empty());
    assert!(m.model.touched_nodes().is_empty());
    assert_eq!(mv.counters().accepted, 1);
    assert_eq!(mv.acceptance_ratio(), 1.0);
    Ok(())
}

#[test]
fn scale_hastings_is_log_of_multiplier() -> Result<(), DagError> {
    let mut m = fixtures::mixed_model()?;
    let mut mv = Move::new(ScaleProposal::new(&m.model, m.sigma, 1.0)?, 1.0)?;
    let mut rng = RngHandle::from_seed(11);
    let old = fixtures::real(&m.model, m.sigma);
    mv.prepare(&mut m.model, &mut rng)?;
    let ln_hastings = mv.propose(&mut m.model, &mut rng)?;
    let new = m.model.value(m.sigma)?.as_real()?;
    assert!((ln_hastings - (new / old).ln()).abs() < 1e-12);
    Ok(())
}

#[test]
fn prior_redraw_hastings_cancels_node_prior() -> Result<(), DagError> {
    let mut m = fixtures::mixed_model()?;
    let mut mv = Move::new(PriorRedrawProposal::new(&m.model, m.mu)?, 1.0)?;
    let mut rng = RngHandle::from_seed(3);
    let ln_old = m.model.ln_probability(m.mu)?;
    mv.prepare(&mut m.model, &mut rng)?;
    let ln_hastings = mv.propose(&mut m.model, &mut rng)?;
    let ln_new = m.model.ln_probability(m.mu)?;
    assert!((ln_hastings - (ln_old - ln_new)).abs() < 1e-12);
    Ok(())
}

#[test]
fn fixed_vector_slide_only_moves_one_element() -> Result<(), DagError> {
    let mut m = fixtures::mixed_model()?;
    let proposal = VectorElementSlideProposal::fixed(&m.model, m.theta, 2, 0.5)?;
    let mut mv = Move::new(proposal, 1.0)?;
    let mut rng = RngHandle::from_seed(5);
    let before = m.model.value(m.theta)?.as_vector()?.to_vec();
    mv.prepare(&mut m.model, &mut rng)?;
    mv.propose(&mut m.model, &mut rng)?;
    let after = m.model.value(m.theta)?.as_vector()?.to_vec();
    assert_eq!(before[..2], after[..2]);
    assert_ne!(before[2], after[2]);
    Ok(())
}

#[test]
fn proposals_reject_invalid_targets() -> Result<(), DagError> {
    let m = fixtures::mixed_model()?;

    let clamped = SlideProposal::new(&m.model, m.y, 1.0).unwrap_err();
    assert_eq!(clamped.code(), "invalid-target");
    assert!(matches!(clamped, DagError::Proposal(_)));

    let derived = ScaleProposal::new(&m.model, m.shift, 1.0).unwrap_err();
    assert_eq!(derived.code(), "invalid-target");
    assert_eq!(
        derived.info().context.get("kind").map(String::as_str),
        Some("deterministic")
    );

    let wrong_type = SlideProposal::new(&m.model, m.theta, 1.0).unwrap_err();
    assert_eq!(wrong_type.code(), "unsupported-value");

    let bad_step = ScaleProposal::new(&m.model, m.sigma, 0.0).unwrap_err();
    assert_eq!(bad_step.code(), "invalid-tuning-parameter");

    let out_of_range = VectorElementSlideProposal::fixed(&m.model, m.theta, 3, 0.5).unwrap_err();
    assert_eq!(out_of_range.code(), "element-out-of-range");
    Ok(())
}

#[test]
fn moves_require_positive_weight() -> Result<(), DagError> {
    let m = fixtures::mixed_model()?;
    let err = Move::new(SlideProposal::new(&m.model, m.mu, 1.0)?, 0.0).unwrap_err();
    assert_eq!(err.code(), "invalid-weight");
    assert!(matches!(err, DagError::Config(_)));
    Ok(())
}

#[test]
fn auto_tune_uses_rate_since_last_tune() -> Result<(), DagError> {
    let mut m = fixtures::mixed_model()?;
    let mut mv = Move::new(SlideProposal::new(&m.model, m.mu, 1.0)?, 1.0)?;
    let mut rng = RngHandle::from_seed(17);
    for _ in 0..4 {
        mv.prepare(&mut m.model, &mut rng)?;
        mv.propose(&mut m.model, &mut rng)?;
        m.model.keep_all()?;
        mv.accept();
    }
    assert_eq!(mv.auto_tune(), Some(1.0));
    assert!(mv.tuning_parameter().unwrap() > 1.0);
    assert_eq!(mv.counters().tried_since_tune, 0);
    assert_eq!(mv.counters().tried, 4);
    assert_eq!(mv.auto_tune(), None);

    let mut frozen = mv.clone().with_auto_tuning(false);
    frozen.prepare(&mut m.model, &mut rng)?;
    frozen.propose(&mut m.model, &mut rng)?;
    frozen.reject(&mut m.model)?;
    m.model.restore_all()?;
    let step = frozen.tuning_parameter();
    assert_eq!(frozen.auto_tune(), None);
    assert_eq!(frozen.tuning_parameter(), step);
    Ok(())
}
