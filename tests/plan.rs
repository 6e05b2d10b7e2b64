//! Lifecycle plan computation over captured graphs.

use keel::{KeelError, LifecyclePlan, Registry, Resolver, ServiceKey};
use std::collections::{BTreeMap, BTreeSet};

struct A;
struct B;
struct C;

#[test]
fn fan_out_plan_and_mirrored_shutdown() {
    // A with no deps, B and C both depending on A.
    let mut registry = Registry::new();
    registry
        .lazy::<A, _>(|_| Ok(A))
        .on_start(|_, _| async move { Ok(()) });
    registry
        .lazy::<B, _>(|cx| {
            let _ = cx.get::<A>()?;
            Ok(B)
        })
        .on_start(|_, _| async move { Ok(()) });
    registry
        .lazy::<C, _>(|cx| {
            let _ = cx.get::<A>()?;
            Ok(C)
        })
        .on_start(|_, _| async move { Ok(()) });

    let provider = registry.build();
    provider.get::<B>().unwrap();
    provider.get::<C>().unwrap();

    let plan = provider.plan().unwrap();
    assert_eq!(plan.layers().len(), 2);
    assert_eq!(plan.layers()[0], vec![ServiceKey::of::<A>()]);
    assert_eq!(
        BTreeSet::from_iter(plan.layers()[1].iter().cloned()),
        BTreeSet::from([ServiceKey::of::<B>(), ServiceKey::of::<C>()])
    );

    let down = plan.reversed();
    assert_eq!(down.layers()[0], plan.layers()[1]);
    assert_eq!(down.layers()[1], vec![ServiceKey::of::<A>()]);
}

#[test]
fn hookless_services_do_not_appear_in_the_plan() {
    let mut registry = Registry::new();
    registry.lazy::<A, _>(|_| Ok(A));
    registry
        .lazy::<B, _>(|cx| {
            let _ = cx.get::<A>()?;
            Ok(B)
        })
        .on_start(|_, _| async move { Ok(()) });

    let provider = registry.build();
    provider.get::<B>().unwrap();

    // A has no hooks: B's dependency on it does not block B, and A itself
    // is absent from the plan.
    let plan = provider.plan().unwrap();
    assert_eq!(plan.layers(), &[vec![ServiceKey::of::<B>()]]);
}

#[test]
fn transients_are_never_planned() {
    struct Temp;

    let mut registry = Registry::new();
    registry
        .lazy::<A, _>(|cx| {
            let _ = cx.get::<Temp>()?;
            Ok(A)
        })
        .on_start(|_, _| async move { Ok(()) });
    // Hooks on a transient are inert; it has no single instance to start.
    registry
        .transient::<Temp, _>(|_| Ok(Temp))
        .on_start(|_, _| async move { Ok(()) });

    let provider = registry.build();
    provider.get::<A>().unwrap();

    let plan = provider.plan().unwrap();
    assert_eq!(plan.layers(), &[vec![ServiceKey::of::<A>()]]);
}

#[test]
fn lifecycle_cycle_names_participants_and_yields_no_partial_order() {
    struct X;
    struct Y;

    let x = ServiceKey::of::<X>();
    let y = ServiceKey::of::<Y>();

    let mut graph = BTreeMap::new();
    graph.insert(x.clone(), BTreeSet::from([y.clone()]));
    graph.insert(y.clone(), BTreeSet::from([x.clone()]));

    match LifecyclePlan::compute(&graph, &BTreeSet::from([x, y])) {
        Err(KeelError::LifecycleCycle { keys }) => {
            assert_eq!(keys.len(), 2);
            assert!(keys.iter().any(|key| key.contains("::X")));
            assert!(keys.iter().any(|key| key.contains("::Y")));
        }
        other => panic!("expected LifecycleCycle, got {other:?}"),
    }
}

#[test]
fn within_layer_order_is_deterministic() {
    let keys: Vec<ServiceKey> = vec![
        ServiceKey::named_of::<A>("zeta"),
        ServiceKey::named_of::<A>("alpha"),
        ServiceKey::named_of::<A>("mid"),
    ];
    let eligible: BTreeSet<ServiceKey> = keys.iter().cloned().collect();

    let plan = LifecyclePlan::compute(&BTreeMap::new(), &eligible).unwrap();
    assert_eq!(plan.layers().len(), 1);
    // Sorted by display name then service name, every time.
    let names: Vec<_> = plan.layers()[0]
        .iter()
        .map(|key| key.service_name().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn empty_plan_for_no_eligible_keys() {
    let plan = LifecyclePlan::compute(&BTreeMap::new(), &BTreeSet::new()).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.len(), 0);
}
