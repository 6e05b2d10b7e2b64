//! Service provider: the sealed, resolvable view of a registry.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{BoxError, KeelError, KeelResult};
use crate::graph::{DependencyGraph, GraphSnapshot, LifecyclePlan};
use crate::key::{KeyFamily, ServiceKey};
use crate::lifecycle::HookContext;
use crate::registration::{AnyArc, BoxFuture, Registration};
use crate::resolve::ResolverCore;
use crate::scope::Scope;

pub mod context;
pub use context::ResolutionContext;

/// Resolves services from descriptors frozen by [`Registry::build`](crate::Registry::build).
///
/// The provider is cheap to clone (`Arc` internally) and safe to share across
/// threads. The descriptor map is immutable after build; the only runtime
/// synchronization is the per-descriptor build cell (build-once guarantee)
/// and the dependency graph's own lock, so graph bookkeeping never serializes
/// behind unrelated construction work.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use keel::{Registry, Resolver};
///
/// struct Config {
///     workers: usize,
/// }
/// struct Pool {
///     size: usize,
/// }
///
/// let mut registry = Registry::new();
/// registry.instance(Config { workers: 4 });
/// registry.lazy::<Pool, _>(|cx| {
///     Ok(Pool { size: cx.get::<Config>()?.workers })
/// });
///
/// let provider = registry.build();
/// let a = provider.get::<Pool>().unwrap();
/// let b = provider.get::<Pool>().unwrap();
/// assert_eq!(a.size, 4);
/// assert!(Arc::ptr_eq(&a, &b)); // lazy singletons are memoized
/// ```
pub struct Provider {
    inner: Arc<ProviderInner>,
}

pub(crate) struct ProviderInner {
    services: HashMap<ServiceKey, Vec<Registration>>,
    graph: Mutex<DependencyGraph>,
}

pub(crate) type HookAction =
    Arc<dyn Fn(HookContext) -> BoxFuture<Result<(), BoxError>> + Send + Sync>;

/// Runtime pairing of one lifecycle-eligible descriptor with its built value,
/// captured inside ready-to-run hook actions.
#[derive(Clone)]
pub(crate) struct LifecycleUnit {
    pub(crate) key: ServiceKey,
    pub(crate) start: Option<HookAction>,
    pub(crate) stop: Option<HookAction>,
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) stop_timeout: Option<Duration>,
}

impl Provider {
    pub(crate) fn new(services: HashMap<ServiceKey, Vec<Registration>>) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                services,
                graph: Mutex::new(DependencyGraph::default()),
            }),
        }
    }

    /// A read-only copy of the dependency graph captured so far.
    ///
    /// The graph fills in lazily as services are constructed; it may be
    /// partial until the seal pass has built everything eagerly needed.
    pub fn dependency_snapshot(&self) -> GraphSnapshot {
        self.inner.graph.lock().unwrap().snapshot()
    }

    /// Computes the startup plan from the current graph and the set of
    /// lifecycle-eligible keys. Mostly useful for diagnostics and tests; the
    /// orchestrator seals the provider first so every edge is present.
    pub fn plan(&self) -> KeelResult<LifecyclePlan> {
        LifecyclePlan::compute(&self.dependency_snapshot(), &self.eligible_keys())
    }

    pub(crate) fn bucket(&self, key: &ServiceKey) -> Option<&[Registration]> {
        self.inner.services.get(key).map(Vec::as_slice)
    }

    /// Buckets whose key belongs to `family`, in deterministic key order.
    pub(crate) fn family_buckets(
        &self,
        family: KeyFamily,
    ) -> Vec<(&ServiceKey, &[Registration])> {
        let mut buckets: Vec<_> = self
            .inner
            .services
            .iter()
            .filter(|(key, _)| key.family() == family)
            .map(|(key, bucket)| (key, bucket.as_slice()))
            .collect();
        buckets.sort_by_key(|(key, _)| (key.display_name(), key.service_name()));
        buckets
    }

    pub(crate) fn record_edge(&self, from: &ServiceKey, to: &ServiceKey) {
        self.inner.graph.lock().unwrap().record(from, to);
    }

    /// Keys with at least one lifecycle-eligible descriptor.
    pub(crate) fn eligible_keys(&self) -> BTreeSet<ServiceKey> {
        self.inner
            .services
            .iter()
            .filter(|(_, bucket)| bucket.iter().any(Registration::is_lifecycle))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Builds every eager singleton and every lifecycle-eligible singleton.
    ///
    /// Construction recurses through each service's dependencies, so the
    /// build order is consistent with the dependency graph without needing
    /// the graph up front. Idempotent: already-built cells are skipped.
    pub(crate) fn seal(&self) -> KeelResult<()> {
        let mut targets: Vec<(&ServiceKey, &Registration)> = Vec::new();
        for (key, bucket) in &self.inner.services {
            for reg in bucket {
                if reg.scope == Scope::Transient {
                    if reg.has_hooks() {
                        tracing::warn!(
                            service = %key,
                            "transient registration has lifecycle hooks; transients never participate in lifecycle ordering"
                        );
                    }
                    continue;
                }
                if reg.scope == Scope::EagerSingleton || reg.is_lifecycle() {
                    targets.push((key, reg));
                }
            }
        }
        targets.sort_by_key(|(key, _)| (key.display_name(), key.service_name()));

        for (key, reg) in targets {
            if reg.built().is_some() {
                continue;
            }
            tracing::debug!(service = %key, "building during seal");
            let cx = ResolutionContext::root(self);
            cx.resolve_registration(key, reg)?;
        }
        Ok(())
    }

    /// Pairs every lifecycle-eligible descriptor with its built value,
    /// honoring hook-over-capability precedence. Requires a prior seal.
    pub(crate) fn lifecycle_units(&self) -> KeelResult<HashMap<ServiceKey, Vec<LifecycleUnit>>> {
        let mut units: HashMap<ServiceKey, Vec<LifecycleUnit>> = HashMap::new();
        for (key, bucket) in &self.inner.services {
            for reg in bucket {
                if !reg.is_lifecycle() {
                    continue;
                }
                let value = reg.built().ok_or_else(|| KeelError::Build {
                    key: key.to_string(),
                    source: "service was not built before lifecycle planning".into(),
                })?;
                let start = start_action(reg, &value);
                let stop = stop_action(reg, &value);
                if start.is_none() && stop.is_none() {
                    continue;
                }
                units.entry(key.clone()).or_default().push(LifecycleUnit {
                    key: key.clone(),
                    start,
                    stop,
                    start_timeout: reg.start_timeout,
                    stop_timeout: reg.stop_timeout,
                });
            }
        }
        Ok(units)
    }
}

// An explicit hook fully replaces the capability method; the two are never
// combined for the same phase.
fn start_action(reg: &Registration, value: &AnyArc) -> Option<HookAction> {
    if let Some(hook) = &reg.start_hook {
        let hook = hook.clone();
        let value = value.clone();
        return Some(Arc::new(move |cx: HookContext| hook(value.clone(), cx)));
    }
    if let Some(adapter) = &reg.starter {
        if let Some(starter) = adapter(value) {
            return Some(Arc::new(move |cx: HookContext| {
                let starter = starter.clone();
                let fut: BoxFuture<Result<(), BoxError>> =
                    Box::pin(async move { starter.start(&cx).await });
                fut
            }));
        }
    }
    None
}

fn stop_action(reg: &Registration, value: &AnyArc) -> Option<HookAction> {
    if let Some(hook) = &reg.stop_hook {
        let hook = hook.clone();
        let value = value.clone();
        return Some(Arc::new(move |cx: HookContext| hook(value.clone(), cx)));
    }
    if let Some(adapter) = &reg.stopper {
        if let Some(stopper) = adapter(value) {
            return Some(Arc::new(move |cx: HookContext| {
                let stopper = stopper.clone();
                let fut: BoxFuture<Result<(), BoxError>> =
                    Box::pin(async move { stopper.stop(&cx).await });
                fut
            }));
        }
    }
    None
}

impl Clone for Provider {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ResolverCore for Provider {
    fn resolve_key(&self, key: &ServiceKey) -> KeelResult<Arc<dyn Any + Send + Sync>> {
        ResolutionContext::root(self).resolve_key(key)
    }

    fn resolve_family(
        &self,
        family: KeyFamily,
        tag: Option<&str>,
    ) -> KeelResult<Vec<Arc<dyn Any + Send + Sync>>> {
        ResolutionContext::root(self).resolve_family(family, tag)
    }

    fn has_key(&self, key: &ServiceKey) -> bool {
        self.bucket(key).is_some_and(|bucket| !bucket.is_empty())
    }
}
