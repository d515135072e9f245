use std::collections::BTreeSet;
use std::sync::Arc;

use bayesdag_core::{DagError, Distribution, NodeId, RngHandle, Value};
use bayesdag_dag::library::Sum;
use bayesdag_dag::Model;
use proptest::prelude::*;

#[derive(Debug)]
struct Flat;

impl Distribution for Flat {
    fn name(&self) -> &str {
        "flat"
    }

    fn ln_density(&self, _value: &Value, _parents: &[&Value]) -> Result<f64, DagError> {
        Ok(0.0)
    }

    fn sample(&self, _parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        Ok(Value::Real(rng.uniform01()))
    }
}

/// Node `i` is described by `(kind, parent mask)`; the mask selects among earlier nodes.
fn build(spec: &[(u8, u64)]) -> (Model, Vec<Vec<usize>>) {
    let mut model = Model::new();
    let mut parents_of = Vec::new();
    for (idx, &(kind, mask)) in spec.iter().enumerate() {
        let parents: Vec<usize> = (0..idx).filter(|p| mask & (1u64 << p) != 0).collect();
        let ids: Vec<NodeId> = parents.iter().map(|p| NodeId::from_raw(*p as u64)).collect();
        let name = format!("v{idx}");
        match kind % 3 {
            0 if ids.is_empty() => {
                model.add_constant(&name, idx as f64).unwrap();
            }
            1 => {
                model.add_deterministic(&name, Arc::new(Sum), &ids).unwrap();
            }
            _ => {
                model
                    .add_stochastic(&name, Arc::new(Flat), &ids, idx as f64)
                    .unwrap();
            }
        }
        parents_of.push(parents);
    }
    model.keep_all().unwrap();
    (model, parents_of)
}

fn closure(start: usize, parents_of: &[Vec<usize>]) -> BTreeSet<usize> {
    let mut reached = BTreeSet::from([start]);
    for idx in start + 1..parents_of.len() {
        if parents_of[idx].iter().any(|p| reached.contains(p)) {
            reached.insert(idx);
        }
    }
    reached
}

fn graph_spec() -> impl Strategy<Value = Vec<(u8, u64)>> {
    prop::collection::vec((any::<u8>(), any::<u64>()), 1..24)
}

proptest! {
    #[test]
    fn touch_reaches_exactly_the_descendants(spec in graph_spec(), pick in any::<prop::sample::Index>()) {
        let (mut model, parents_of) = build(&spec);
        let start = pick.index(model.len());
        let id = NodeId::from_raw(start as u64);
        model.touch(id).unwrap();

        let touched: BTreeSet<usize> = model.touched_nodes().iter().map(|id| id.index()).collect();
        if model.node(id).unwrap().is_constant() {
            prop_assert!(touched.is_empty());
        } else {
            prop_assert_eq!(&touched, &closure(start, &parents_of));
            let mut expected: BTreeSet<usize> = model.descendants(id).unwrap().iter().map(|d| d.index()).collect();
            expected.insert(start);
            prop_assert_eq!(touched, expected);
        }
    }

    #[test]
    fn restore_undoes_any_edit(spec in graph_spec(), pick in any::<prop::sample::Index>(), value in -5.0f64..5.0) {
        let (mut model, _) = build(&spec);
        let before: Vec<Value> = model.all_nodes().iter().map(|id| model.node(*id).unwrap().cached_value().clone()).collect();
        let free: Vec<NodeId> = model
            .all_nodes()
            .into_iter()
            .filter(|id| model.node(*id).unwrap().is_stochastic())
            .collect();
        prop_assume!(!free.is_empty());
        let target = free[pick.index(free.len())];

        model.set_value(target, Value::Real(value)).unwrap();
        for id in model.all_nodes() {
            model.value(id).unwrap();
        }
        model.restore_all().unwrap();

        let after: Vec<Value> = model.all_nodes().iter().map(|id| model.node(*id).unwrap().cached_value().clone()).collect();
        prop_assert_eq!(before, after);
        prop_assert!(model.touched_nodes().is_empty());
        prop_assert!(model.pending_nodes().is_empty());
    }

    #[test]
    fn topological_order_puts_parents_first(spec in graph_spec()) {
        let (model, parents_of) = build(&spec);
        let order = model.topological_order();
        prop_assert_eq!(order.len(), model.len());
        let position: Vec<usize> = {
            let mut pos = vec![0; order.len()];
            for (rank, id) in order.iter().enumerate() {
                pos[id.index()] = rank;
            }
            pos
        };
        for (child, parents) in parents_of.iter().enumerate() {
            for parent in parents {
                prop_assert!(position[*parent] < position[child]);
            }
        }
    }
}
