//! Resolution-cycle detection through the explicit resolution context.

use keel::{KeelError, Registry, Resolver};
use std::sync::Arc;

#[test]
fn self_referential_transient_is_a_cycle() {
    struct SelfReferencing;

    let mut registry = Registry::new();
    registry.transient::<SelfReferencing, _>(|cx| {
        let _ = cx.get::<SelfReferencing>()?;
        Ok(SelfReferencing)
    });

    let provider = registry.build();
    match provider.get::<SelfReferencing>() {
        Err(KeelError::ResolutionCycle { path }) => {
            assert_eq!(path.len(), 2);
            assert!(path[0].contains("SelfReferencing"));
            assert!(path[1].contains("SelfReferencing"));
        }
        other => panic!("expected ResolutionCycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn two_level_cycle_reports_full_path() {
    struct A {
        _b: Arc<B>,
    }

    struct B {
        _a: Arc<A>,
    }

    let mut registry = Registry::new();
    registry.lazy::<A, _>(|cx| Ok(A { _b: cx.get::<B>()? }));
    registry.lazy::<B, _>(|cx| Ok(B { _a: cx.get::<A>()? }));

    let provider = registry.build();
    match provider.get::<A>() {
        Err(KeelError::ResolutionCycle { path }) => {
            assert_eq!(path.len(), 3);
            assert!(path[0].contains("::A"));
            assert!(path[1].contains("::B"));
            assert!(path[2].contains("::A"));
        }
        other => panic!("expected ResolutionCycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn three_level_cycle_is_detected() {
    struct X;
    struct Y;
    struct Z;

    let mut registry = Registry::new();
    registry.lazy::<X, _>(|cx| {
        let _ = cx.get::<Y>()?;
        Ok(X)
    });
    registry.lazy::<Y, _>(|cx| {
        let _ = cx.get::<Z>()?;
        Ok(Y)
    });
    registry.lazy::<Z, _>(|cx| {
        let _ = cx.get::<X>()?;
        Ok(Z)
    });

    let provider = registry.build();
    match provider.get::<X>() {
        Err(KeelError::ResolutionCycle { path }) => {
            assert_eq!(path.len(), 4);
            assert!(path[0].contains("::X"));
            assert!(path[3].contains("::X"));
        }
        other => panic!("expected ResolutionCycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn cycle_error_does_not_poison_other_services() {
    struct Broken;
    struct Fine;

    let mut registry = Registry::new();
    registry.lazy::<Broken, _>(|cx| {
        let _ = cx.get::<Broken>()?;
        Ok(Broken)
    });
    registry.instance(Fine);

    let provider = registry.build();
    assert!(provider.get::<Broken>().is_err());
    assert!(provider.get::<Fine>().is_ok());
}

#[test]
fn independent_chains_do_not_interfere() {
    // Two unrelated resolution chains run from separate contexts; the
    // cycle in one must not leak into the other's stack.
    struct Looped;
    struct Deep;
    struct Deeper;

    let mut registry = Registry::new();
    registry.lazy::<Looped, _>(|cx| {
        let _ = cx.get::<Looped>()?;
        Ok(Looped)
    });
    registry.lazy::<Deeper, _>(|_| Ok(Deeper));
    registry.lazy::<Deep, _>(|cx| {
        let _ = cx.get::<Deeper>()?;
        Ok(Deep)
    });

    let provider = registry.build();
    assert!(matches!(
        provider.get::<Looped>(),
        Err(KeelError::ResolutionCycle { .. })
    ));
    assert!(provider.get::<Deep>().is_ok());
}
