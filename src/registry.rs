//! Service registration surface.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BoxError, KeelError};
use crate::key::ServiceKey;
use crate::lifecycle::{HookContext, Starter, Stopper};
use crate::provider::{Provider, ResolutionContext};
use crate::registration::{AnyArc, BoxFuture, CtorFn, Registration};
use crate::scope::Scope;

/// Mutable collection of service descriptors.
///
/// Components register construction logic here without knowing about each
/// other; [`build`](Registry::build) freezes the descriptors into a
/// [`Provider`]. Registration never errors: descriptors registered under the
/// same key accumulate as an implicit collection (multi-binding), which
/// resolve-one later reports as ambiguous while `get_all` returns every
/// binding.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use keel::{Registry, Resolver};
///
/// trait Route: Send + Sync {
///     fn path(&self) -> &'static str;
/// }
///
/// struct Health;
/// impl Route for Health {
///     fn path(&self) -> &'static str {
///         "/healthz"
///     }
/// }
///
/// struct Metrics;
/// impl Route for Metrics {
///     fn path(&self) -> &'static str {
///         "/metrics"
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.bind_trait::<dyn Route>(Arc::new(Health)).tag("http");
/// registry.bind_trait::<dyn Route>(Arc::new(Metrics)).tag("http");
///
/// let provider = registry.build();
/// let routes = provider.get_all_trait::<dyn Route>().unwrap();
/// assert_eq!(routes.len(), 2);
/// ```
#[derive(Default)]
pub struct Registry {
    services: HashMap<ServiceKey, Vec<Registration>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // ----- Fixed instances -----

    /// Registers a caller-supplied value as a pre-built singleton.
    ///
    /// This is the boundary for external collaborators: parsed configuration,
    /// argument lists, and logger handles enter the registry this way before
    /// the orchestrator starts.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> Entry<'_, T> {
        self.instance_at(ServiceKey::of::<T>(), value)
    }

    /// Registers a pre-built singleton under a name, for disambiguating
    /// multiple values of one type.
    pub fn instance_named<T: Send + Sync + 'static>(
        &mut self,
        name: &'static str,
        value: T,
    ) -> Entry<'_, T> {
        self.instance_at(ServiceKey::named_of::<T>(name), value)
    }

    fn instance_at<T: Send + Sync + 'static>(
        &mut self,
        key: ServiceKey,
        value: T,
    ) -> Entry<'_, T> {
        let stored: AnyArc = Arc::new(value);
        let held = stored.clone();
        let ctor: CtorFn = Arc::new(move |_: &ResolutionContext<'_>| Ok(held.clone()));
        Entry::new(self.push(key, Registration::prebuilt(ctor, stored)))
    }

    // ----- Singleton factories -----

    /// Registers a lazy singleton: built on first resolution, memoized for
    /// the process lifetime. Concurrent first resolutions produce exactly
    /// one construction.
    ///
    /// The constructor resolves its own dependencies through the
    /// [`ResolutionContext`], which is how the dependency graph learns about
    /// the edge:
    ///
    /// ```rust
    /// use keel::{Registry, Resolver};
    ///
    /// struct Config {
    ///     dsn: String,
    /// }
    /// struct Database {
    ///     dsn: String,
    /// }
    ///
    /// let mut registry = Registry::new();
    /// registry.instance(Config { dsn: "postgres://localhost".into() });
    /// registry.lazy::<Database, _>(|cx| {
    ///     Ok(Database { dsn: cx.get::<Config>()?.dsn.clone() })
    /// });
    ///
    /// let provider = registry.build();
    /// assert!(provider.get::<Database>().is_ok());
    /// ```
    pub fn lazy<T, F>(&mut self, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(ServiceKey::of::<T>(), Scope::LazySingleton, ctor)
    }

    /// Named variant of [`lazy`](Registry::lazy).
    pub fn lazy_named<T, F>(&mut self, name: &'static str, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(ServiceKey::named_of::<T>(name), Scope::LazySingleton, ctor)
    }

    /// Registers an eager singleton: built during the seal pass that runs
    /// before any start hook, in dependency order.
    pub fn eager<T, F>(&mut self, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(ServiceKey::of::<T>(), Scope::EagerSingleton, ctor)
    }

    /// Named variant of [`eager`](Registry::eager).
    pub fn eager_named<T, F>(&mut self, name: &'static str, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(ServiceKey::named_of::<T>(name), Scope::EagerSingleton, ctor)
    }

    /// Registers a transient: rebuilt on every resolution, never cached,
    /// never lifecycle-eligible.
    pub fn transient<T, F>(&mut self, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory(ServiceKey::of::<T>(), Scope::Transient, ctor)
    }

    fn factory<T, F>(&mut self, key: ServiceKey, scope: Scope, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let ctor: CtorFn =
            Arc::new(move |cx: &ResolutionContext<'_>| Ok(Arc::new(ctor(cx)?) as AnyArc));
        Entry::new(self.push(key, Registration::new(scope, ctor)))
    }

    // ----- Trait bindings -----

    /// Appends a trait implementation under the trait's key. Repeated calls
    /// accumulate bindings; resolve them collectively with
    /// [`get_all_trait`](crate::Resolver::get_all_trait).
    pub fn bind_trait<T>(&mut self, value: Arc<T>) -> TraitEntry<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bind_trait_at(ServiceKey::of_trait::<T>(), value)
    }

    /// Named variant of [`bind_trait`](Registry::bind_trait).
    pub fn bind_trait_named<T>(&mut self, name: &'static str, value: Arc<T>) -> TraitEntry<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bind_trait_at(ServiceKey::named_of_trait::<T>(name), value)
    }

    fn bind_trait_at<T>(&mut self, key: ServiceKey, value: Arc<T>) -> TraitEntry<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        // Stored double-wrapped so the outer Arc is a sized Any.
        let stored: AnyArc = Arc::new(value);
        let held = stored.clone();
        let ctor: CtorFn = Arc::new(move |_: &ResolutionContext<'_>| Ok(held.clone()));
        TraitEntry::new(self.push(key, Registration::prebuilt(ctor, stored)))
    }

    /// Registers a lazily-built trait binding.
    pub fn lazy_trait<T, F>(&mut self, ctor: F) -> TraitEntry<'_, T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let ctor: CtorFn =
            Arc::new(move |cx: &ResolutionContext<'_>| Ok(Arc::new(ctor(cx)?) as AnyArc));
        TraitEntry::new(self.push(
            ServiceKey::of_trait::<T>(),
            Registration::new(Scope::LazySingleton, ctor),
        ))
    }

    // ----- Replacement -----

    /// Clears every descriptor registered for `T`'s unnamed key, then
    /// registers `value` as a pre-built singleton. Intended for test
    /// substitution.
    pub fn replace_instance<T: Send + Sync + 'static>(&mut self, value: T) -> Entry<'_, T> {
        self.services.remove(&ServiceKey::of::<T>());
        self.instance(value)
    }

    /// Clears every descriptor registered for `T`'s unnamed key, then
    /// registers a lazy singleton.
    pub fn replace_lazy<T, F>(&mut self, ctor: F) -> Entry<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.services.remove(&ServiceKey::of::<T>());
        self.lazy(ctor)
    }

    // ----- Build -----

    /// Freezes the descriptors into a [`Provider`]. No descriptor can be
    /// added or removed afterwards.
    pub fn build(self) -> Provider {
        Provider::new(self.services)
    }

    fn push(&mut self, key: ServiceKey, reg: Registration) -> &mut Registration {
        let bucket = self.services.entry(key).or_default();
        let idx = bucket.len();
        bucket.push(reg);
        &mut bucket[idx]
    }
}

/// Builder for a concrete-type registration just added to the [`Registry`].
///
/// Chains group tags, explicit lifecycle hooks, per-hook timeouts, and
/// capability opt-ins onto the descriptor:
///
/// ```rust
/// use std::time::Duration;
/// use keel::Registry;
///
/// struct Server;
///
/// let mut registry = Registry::new();
/// registry
///     .eager::<Server, _>(|_| Ok(Server))
///     .tag("network")
///     .start_timeout(Duration::from_secs(30))
///     .on_start(|_server, _cx| async move { Ok(()) })
///     .on_stop(|_server, _cx| async move { Ok(()) });
/// ```
pub struct Entry<'a, T> {
    reg: &'a mut Registration,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> Entry<'a, T> {
    fn new(reg: &'a mut Registration) -> Self {
        Self {
            reg,
            _marker: PhantomData,
        }
    }

    /// Adds a group tag for [`get_group`](crate::Resolver::get_group)-style
    /// resolution.
    pub fn tag(self, tag: &'static str) -> Self {
        self.reg.tags.push(tag);
        self
    }

    /// Attaches an explicit start hook. Fully replaces the [`Starter`]
    /// capability for this registration, if any.
    pub fn on_start<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Arc<T>, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.reg.start_hook = Some(Arc::new(move |any: AnyArc, cx: HookContext| {
            let fut: BoxFuture<Result<(), BoxError>> = match any.downcast::<T>() {
                Ok(value) => Box::pin(hook(value, cx)),
                Err(_) => Box::pin(std::future::ready(Err(
                    KeelError::TypeMismatch(std::any::type_name::<T>()).into(),
                ))),
            };
            fut
        }));
        self
    }

    /// Attaches an explicit stop hook. Fully replaces the [`Stopper`]
    /// capability for this registration, if any.
    pub fn on_stop<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Arc<T>, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.reg.stop_hook = Some(Arc::new(move |any: AnyArc, cx: HookContext| {
            let fut: BoxFuture<Result<(), BoxError>> = match any.downcast::<T>() {
                Ok(value) => Box::pin(hook(value, cx)),
                Err(_) => Box::pin(std::future::ready(Err(
                    KeelError::TypeMismatch(std::any::type_name::<T>()).into(),
                ))),
            };
            fut
        }));
        self
    }

    /// Overrides the orchestrator's default timeout for this start hook.
    pub fn start_timeout(self, timeout: Duration) -> Self {
        self.reg.start_timeout = Some(timeout);
        self
    }

    /// Overrides the orchestrator's default timeout for this stop hook.
    pub fn stop_timeout(self, timeout: Duration) -> Self {
        self.reg.stop_timeout = Some(timeout);
        self
    }

    /// Opts the registration into lifecycle start via `T`'s [`Starter`]
    /// implementation. Ignored when an explicit start hook is present.
    pub fn starter(self) -> Self
    where
        T: Starter,
    {
        self.reg.starter = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|value| value as Arc<dyn Starter>)
        }));
        self
    }

    /// Opts the registration into lifecycle stop via `T`'s [`Stopper`]
    /// implementation. Ignored when an explicit stop hook is present.
    pub fn stopper(self) -> Self
    where
        T: Stopper,
    {
        self.reg.stopper = Some(Arc::new(|any: &AnyArc| {
            any.clone()
                .downcast::<T>()
                .ok()
                .map(|value| value as Arc<dyn Stopper>)
        }));
        self
    }
}

/// Builder for a trait binding just added to the [`Registry`].
///
/// Trait objects cannot opt into capabilities through unsizing, so lifecycle
/// participation for trait bindings goes through explicit hooks.
pub struct TraitEntry<'a, T: ?Sized> {
    reg: &'a mut Registration,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<'a, T: ?Sized + Send + Sync + 'static> TraitEntry<'a, T> {
    fn new(reg: &'a mut Registration) -> Self {
        Self {
            reg,
            _marker: PhantomData,
        }
    }

    /// Adds a group tag.
    pub fn tag(self, tag: &'static str) -> Self {
        self.reg.tags.push(tag);
        self
    }

    /// Attaches an explicit start hook receiving the bound trait object.
    pub fn on_start<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Arc<T>, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.reg.start_hook = Some(Arc::new(move |any: AnyArc, cx: HookContext| {
            let fut: BoxFuture<Result<(), BoxError>> = match any.downcast::<Arc<T>>() {
                Ok(outer) => Box::pin(hook((*outer).clone(), cx)),
                Err(_) => Box::pin(std::future::ready(Err(
                    KeelError::TypeMismatch(std::any::type_name::<T>()).into(),
                ))),
            };
            fut
        }));
        self
    }

    /// Attaches an explicit stop hook receiving the bound trait object.
    pub fn on_stop<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Arc<T>, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.reg.stop_hook = Some(Arc::new(move |any: AnyArc, cx: HookContext| {
            let fut: BoxFuture<Result<(), BoxError>> = match any.downcast::<Arc<T>>() {
                Ok(outer) => Box::pin(hook((*outer).clone(), cx)),
                Err(_) => Box::pin(std::future::ready(Err(
                    KeelError::TypeMismatch(std::any::type_name::<T>()).into(),
                ))),
            };
            fut
        }));
        self
    }

    /// Overrides the orchestrator's default timeout for this start hook.
    pub fn start_timeout(self, timeout: Duration) -> Self {
        self.reg.start_timeout = Some(timeout);
        self
    }

    /// Overrides the orchestrator's default timeout for this stop hook.
    pub fn stop_timeout(self, timeout: Duration) -> Self {
        self.reg.stop_timeout = Some(timeout);
        self
    }
}
