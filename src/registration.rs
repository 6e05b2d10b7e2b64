//! Internal service descriptor types.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::error::BoxError;
use crate::lifecycle::{HookContext, Starter, Stopper};
use crate::provider::ResolutionContext;
use crate::scope::Scope;

// Type-erased Arc for storage. Trait objects are stored double-wrapped as
// Arc<Arc<dyn Trait>> so the outer Arc is a sized Any.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub(crate) type CtorFn =
    Arc<dyn for<'a> Fn(&ResolutionContext<'a>) -> Result<AnyArc, BoxError> + Send + Sync>;

pub(crate) type HookFn =
    Arc<dyn Fn(AnyArc, HookContext) -> BoxFuture<Result<(), BoxError>> + Send + Sync>;

pub(crate) type StarterAdapter = Arc<dyn Fn(&AnyArc) -> Option<Arc<dyn Starter>> + Send + Sync>;
pub(crate) type StopperAdapter = Arc<dyn Fn(&AnyArc) -> Option<Arc<dyn Stopper>> + Send + Sync>;

/// One registered provider: scope, constructor, lifecycle hooks, tags, and
/// the singleton build cell.
pub(crate) struct Registration {
    pub(crate) scope: Scope,
    pub(crate) ctor: CtorFn,
    pub(crate) tags: Vec<&'static str>,
    pub(crate) start_hook: Option<HookFn>,
    pub(crate) stop_hook: Option<HookFn>,
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) stop_timeout: Option<Duration>,
    pub(crate) starter: Option<StarterAdapter>,
    pub(crate) stopper: Option<StopperAdapter>,
    // Build-once slot for singleton scopes. Transients never touch it.
    pub(crate) cell: OnceCell<AnyArc>,
}

impl Registration {
    pub(crate) fn new(scope: Scope, ctor: CtorFn) -> Self {
        Self {
            scope,
            ctor,
            tags: Vec::new(),
            start_hook: None,
            stop_hook: None,
            start_timeout: None,
            stop_timeout: None,
            starter: None,
            stopper: None,
            cell: OnceCell::new(),
        }
    }

    /// Registration wrapping a caller-supplied value. The cell is pre-filled,
    /// so the descriptor is born built.
    pub(crate) fn prebuilt(ctor: CtorFn, value: AnyArc) -> Self {
        let reg = Self::new(Scope::Instance, ctor);
        let _ = reg.cell.set(value);
        reg
    }

    /// Whether this descriptor takes part in lifecycle ordering: any
    /// non-transient registration carrying an explicit hook or a capability
    /// adapter.
    pub(crate) fn is_lifecycle(&self) -> bool {
        self.scope.is_singleton() && self.has_hooks()
    }

    pub(crate) fn has_hooks(&self) -> bool {
        self.start_hook.is_some()
            || self.stop_hook.is_some()
            || self.starter.is_some()
            || self.stopper.is_some()
    }

    pub(crate) fn built(&self) -> Option<AnyArc> {
        self.cell.get().cloned()
    }
}
