//! Randomized conservation laws of the worker engine: stealing and progress
//! reporting may never lose, duplicate, or misattribute work.

use canopy_core::tree::{Tree, TreeBuilder};
use canopy_core::{Checkpoint, Progress, SumAll, Workload};
use canopy_runtime::worker::WorkerExploration;
use proptest::prelude::*;
use std::sync::Arc;

/// A cloneable tree description; caches included so stolen paths replay
/// through recorded bytes.
#[derive(Clone, Debug)]
enum TreeSpec {
    Leaf(u64),
    Null,
    Cache(Option<u64>, Box<TreeSpec>),
    Choice(Box<TreeSpec>, Box<TreeSpec>),
    Yield(Box<TreeSpec>),
}

fn build(spec: &TreeSpec) -> Tree<u64> {
    match spec {
        TreeSpec::Leaf(value) => Tree::leaf(*value),
        TreeSpec::Null => Tree::null(),
        TreeSpec::Cache(effect, rest) => {
            let effect = *effect;
            let rest = rest.clone();
            Tree::cached(move || effect, move |_: u64| build(&rest))
        }
        TreeSpec::Choice(left, right) => {
            let left = left.clone();
            let right = right.clone();
            Tree::choice(move || build(&left), move || build(&right))
        }
        TreeSpec::Yield(rest) => {
            let rest = rest.clone();
            Tree::yield_point(move || build(&rest))
        }
    }
}

fn builder_for(spec: &TreeSpec) -> TreeBuilder<u64> {
    let spec = spec.clone();
    Arc::new(move || build(&spec))
}

fn total_sum(spec: &TreeSpec) -> u64 {
    match spec {
        TreeSpec::Leaf(value) => *value,
        TreeSpec::Null | TreeSpec::Cache(None, _) => 0,
        TreeSpec::Cache(Some(_), rest) | TreeSpec::Yield(rest) => total_sum(rest),
        TreeSpec::Choice(left, right) => total_sum(left) + total_sum(right),
    }
}

fn arb_tree() -> impl Strategy<Value = TreeSpec> {
    let leaf = prop_oneof![
        (1u64..50).prop_map(TreeSpec::Leaf),
        Just(TreeSpec::Null),
    ];
    leaf.prop_recursive(6, 48, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| TreeSpec::Choice(Box::new(l), Box::new(r))),
            (proptest::option::of(0u64..8), inner.clone())
                .prop_map(|(v, rest)| TreeSpec::Cache(v, Box::new(rest))),
            inner.prop_map(|rest| TreeSpec::Yield(Box::new(rest))),
        ]
    })
}

fn mode() -> Arc<SumAll<u64>> {
    Arc::new(SumAll::new())
}

/// Fold a full-tree claim into an accumulating (checkpoint, sum) pair.
fn fold(acc: &mut Progress<u64>, delta: Progress<u64>) {
    acc.checkpoint = acc
        .checkpoint
        .merge(&delta.checkpoint)
        .expect("claims from one exploration must be mutually consistent");
    acc.result += delta.result;
}

proptest! {
    /// Stealing at arbitrary moments, then exploring every piece (victim and
    /// thieves alike), discovers each leaf exactly once and accounts for the
    /// whole tree.
    #[test]
    fn steal_preserves_total_work(
        (spec, schedule) in arb_tree().prop_flat_map(|spec| {
            let schedule = proptest::collection::vec(0u64..24, 0..4);
            (Just(spec), schedule)
        })
    ) {
        let builder = builder_for(&spec);
        let mut global = Progress::new(Checkpoint::Unexplored, 0u64);
        let mut pending: Vec<Workload> = vec![Workload::entire()];

        // The first worker runs the steal schedule; thieves (and thieves of
        // thieves, had the schedule produced them) just explore.
        let mut first = true;
        while let Some(workload) = pending.pop() {
            let mut exploration =
                WorkerExploration::start(mode(), &builder, workload).unwrap();
            if first {
                first = false;
                for steps in &schedule {
                    for _ in 0..*steps {
                        if exploration.is_finished() {
                            break;
                        }
                        exploration.step().unwrap();
                    }
                    if let Some(stolen) = exploration.try_steal() {
                        fold(&mut global, stolen.update.delta);
                        pending.push(stolen.workload);
                    }
                }
            }
            while !exploration.is_finished() {
                exploration.step().unwrap();
            }
            fold(&mut global, exploration.final_progress());
        }

        prop_assert_eq!(&global.checkpoint, &Checkpoint::Explored);
        prop_assert_eq!(global.result, total_sum(&spec));
    }

    /// Interrupting a worker for progress updates at arbitrary intervals and
    /// folding every delta reproduces exactly the sub-tree it explored.
    #[test]
    fn progress_updates_fold_losslessly(
        (spec, intervals) in arb_tree().prop_flat_map(|spec| {
            let intervals = proptest::collection::vec(1u64..16, 0..6);
            (Just(spec), intervals)
        })
    ) {
        let builder = builder_for(&spec);
        let mut exploration =
            WorkerExploration::start(mode(), &builder, Workload::entire()).unwrap();
        let mut global = Progress::new(Checkpoint::Unexplored, 0u64);

        for steps in intervals {
            for _ in 0..steps {
                if exploration.is_finished() {
                    break;
                }
                exploration.step().unwrap();
            }
            let update = exploration.progress_update();
            // The delta and the remaining workload keep partitioning the
            // whole tree at every report.
            prop_assert_eq!(
                update
                    .delta
                    .checkpoint
                    .merge(&update.remaining.checkpoint.invert())
                    .unwrap(),
                Checkpoint::Explored
            );
            fold(&mut global, update.delta);
        }
        while !exploration.is_finished() {
            exploration.step().unwrap();
        }
        fold(&mut global, exploration.final_progress());

        prop_assert_eq!(&global.checkpoint, &Checkpoint::Explored);
        prop_assert_eq!(global.result, total_sum(&spec));
    }
}
