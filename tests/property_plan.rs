//! Property tests for the lifecycle planner over random acyclic graphs.

use keel::{LifecyclePlan, ServiceKey};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn key(index: usize) -> ServiceKey {
    // Distinct named keys over one carrier type stand in for distinct
    // services; leaking is fine in tests.
    let name: &'static str = Box::leak(format!("svc-{index:02}").into_boxed_str());
    ServiceKey::named_of::<()>(name)
}

/// Random DAG: nodes 0..n, every edge points from a higher index to a lower
/// one (dependent -> dependency), so the graph is acyclic by construction.
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..10).prop_flat_map(|n| {
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|to| (to + 1..n).map(move |from| (from, to)))
            .collect();
        let count = pairs.len();
        (
            Just(n),
            proptest::sample::subsequence(pairs, 0..=count),
        )
    })
}

proptest! {
    #[test]
    fn layer_concatenation_is_a_topological_order((n, edges) in arb_dag()) {
        let keys: Vec<ServiceKey> = (0..n).map(key).collect();
        let mut graph: BTreeMap<ServiceKey, BTreeSet<ServiceKey>> = BTreeMap::new();
        for (from, to) in &edges {
            graph.entry(keys[*from].clone()).or_default().insert(keys[*to].clone());
        }
        let eligible: BTreeSet<ServiceKey> = keys.iter().cloned().collect();

        let plan = LifecyclePlan::compute(&graph, &eligible).unwrap();

        // Every key appears exactly once.
        let mut position: HashMap<ServiceKey, usize> = HashMap::new();
        for (layer_index, layer) in plan.layers().iter().enumerate() {
            for key in layer {
                prop_assert!(position.insert(key.clone(), layer_index).is_none());
            }
        }
        prop_assert_eq!(position.len(), n);

        // Dependencies settle in strictly earlier layers than dependents.
        for (from, to) in &edges {
            prop_assert!(position[&keys[*to]] < position[&keys[*from]]);
        }
    }

    #[test]
    fn shutdown_is_the_exact_reverse_of_startup((n, edges) in arb_dag()) {
        let keys: Vec<ServiceKey> = (0..n).map(key).collect();
        let mut graph: BTreeMap<ServiceKey, BTreeSet<ServiceKey>> = BTreeMap::new();
        for (from, to) in &edges {
            graph.entry(keys[*from].clone()).or_default().insert(keys[*to].clone());
        }
        let eligible: BTreeSet<ServiceKey> = keys.iter().cloned().collect();

        let plan = LifecyclePlan::compute(&graph, &eligible).unwrap();
        let down = plan.reversed();

        let mut mirrored: Vec<_> = plan.layers().to_vec();
        mirrored.reverse();
        prop_assert_eq!(down.layers(), mirrored.as_slice());

        // Reversing twice restores the startup plan.
        let up_again = down.reversed();
        prop_assert_eq!(up_again.layers(), plan.layers());
    }

    #[test]
    fn planning_is_deterministic((n, edges) in arb_dag()) {
        let keys: Vec<ServiceKey> = (0..n).map(key).collect();
        let mut graph: BTreeMap<ServiceKey, BTreeSet<ServiceKey>> = BTreeMap::new();
        for (from, to) in &edges {
            graph.entry(keys[*from].clone()).or_default().insert(keys[*to].clone());
        }
        let eligible: BTreeSet<ServiceKey> = keys.iter().cloned().collect();

        let first = LifecyclePlan::compute(&graph, &eligible).unwrap();
        let second = LifecyclePlan::compute(&graph, &eligible).unwrap();
        prop_assert_eq!(first, second);
    }
}
