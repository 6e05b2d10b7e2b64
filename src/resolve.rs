//! Resolver traits shared by the provider and the resolution context.

use std::any::Any;
use std::sync::Arc;

use crate::error::{KeelError, KeelResult};
use crate::key::{KeyFamily, ServiceKey};

fn downcast_value<T: Send + Sync + 'static>(
    any: Arc<dyn Any + Send + Sync>,
) -> KeelResult<Arc<T>> {
    any.downcast::<T>()
        .map_err(|_| KeelError::TypeMismatch(std::any::type_name::<T>()))
}

fn downcast_trait<T: ?Sized + Send + Sync + 'static>(
    any: Arc<dyn Any + Send + Sync>,
) -> KeelResult<Arc<T>> {
    // Trait objects are stored double-wrapped as Arc<Arc<dyn Trait>>.
    any.downcast::<Arc<T>>()
        .map(|outer| (*outer).clone())
        .map_err(|_| KeelError::TypeMismatch(std::any::type_name::<T>()))
}

/// Object-safe resolution core implemented by [`Provider`](crate::Provider)
/// and [`ResolutionContext`](crate::ResolutionContext).
///
/// Most callers want the generic methods on [`Resolver`] instead; this trait
/// carries the type-erased mechanics they are built on.
pub trait ResolverCore {
    /// Resolves the single descriptor registered under `key`.
    ///
    /// Fails with [`KeelError::NotFound`] when the key has no descriptors
    /// and [`KeelError::Ambiguous`] when it has more than one.
    fn resolve_key(&self, key: &ServiceKey) -> KeelResult<Arc<dyn Any + Send + Sync>>;

    /// Resolves every descriptor in `family`, across named and unnamed keys,
    /// optionally filtered to descriptors carrying `tag`.
    ///
    /// Zero matches yield an empty vector, not an error.
    fn resolve_family(
        &self,
        family: KeyFamily,
        tag: Option<&str>,
    ) -> KeelResult<Vec<Arc<dyn Any + Send + Sync>>>;

    /// Whether at least one descriptor is registered under `key`.
    fn has_key(&self, key: &ServiceKey) -> bool;
}

/// Generic, type-safe resolution surface.
///
/// Implemented for everything that implements [`ResolverCore`], so the same
/// calls work on a [`Provider`](crate::Provider) at the top level and on the
/// [`ResolutionContext`](crate::ResolutionContext) handed to constructors.
///
/// # Examples
///
/// ```rust
/// use keel::{Registry, Resolver};
///
/// struct Config {
///     port: u16,
/// }
///
/// let mut registry = Registry::new();
/// registry.instance(Config { port: 8080 });
///
/// let provider = registry.build();
/// let config = provider.get::<Config>().unwrap();
/// assert_eq!(config.port, 8080);
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the unnamed registration of the concrete type `T`.
    fn get<T: Send + Sync + 'static>(&self) -> KeelResult<Arc<T>> {
        downcast_value(self.resolve_key(&ServiceKey::of::<T>())?)
    }

    /// Resolves the registration of `T` under `name`.
    fn get_named<T: Send + Sync + 'static>(&self, name: &'static str) -> KeelResult<Arc<T>> {
        downcast_value(self.resolve_key(&ServiceKey::named_of::<T>(name))?)
    }

    /// Resolves the unnamed registration of the trait object `T`.
    fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> KeelResult<Arc<T>> {
        downcast_trait(self.resolve_key(&ServiceKey::of_trait::<T>())?)
    }

    /// Resolves the registration of the trait object `T` under `name`.
    fn get_named_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> KeelResult<Arc<T>> {
        downcast_trait(self.resolve_key(&ServiceKey::named_of_trait::<T>(name))?)
    }

    /// Resolves every registration producing `T`, named or not, in
    /// deterministic key order. Empty when none match.
    fn get_all<T: Send + Sync + 'static>(&self) -> KeelResult<Vec<Arc<T>>> {
        self.resolve_family(KeyFamily::of::<T>(), None)?
            .into_iter()
            .map(downcast_value)
            .collect()
    }

    /// Like [`get_all`](Resolver::get_all), restricted to registrations
    /// tagged with `tag`.
    fn get_group<T: Send + Sync + 'static>(&self, tag: &str) -> KeelResult<Vec<Arc<T>>> {
        self.resolve_family(KeyFamily::of::<T>(), Some(tag))?
            .into_iter()
            .map(downcast_value)
            .collect()
    }

    /// Resolves every registration bound to the trait object `T`.
    fn get_all_trait<T: ?Sized + Send + Sync + 'static>(&self) -> KeelResult<Vec<Arc<T>>> {
        self.resolve_family(KeyFamily::of_trait::<T>(), None)?
            .into_iter()
            .map(downcast_trait)
            .collect()
    }

    /// Like [`get_all_trait`](Resolver::get_all_trait), restricted to
    /// registrations tagged with `tag`.
    fn get_group_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        tag: &str,
    ) -> KeelResult<Vec<Arc<T>>> {
        self.resolve_family(KeyFamily::of_trait::<T>(), Some(tag))?
            .into_iter()
            .map(downcast_trait)
            .collect()
    }

    /// Whether an unnamed registration of `T` exists. Never errors.
    fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.has_key(&ServiceKey::of::<T>())
    }

    /// Whether a registration of `T` under `name` exists.
    fn contains_named<T: Send + Sync + 'static>(&self, name: &'static str) -> bool {
        self.has_key(&ServiceKey::named_of::<T>(name))
    }

    /// Whether at least one binding of the trait object `T` exists.
    fn contains_trait<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.has_key(&ServiceKey::of_trait::<T>())
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
