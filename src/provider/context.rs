//! Resolution context threaded through nested resolve calls.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{KeelError, KeelResult};
use crate::key::{KeyFamily, ServiceKey};
use crate::provider::Provider;
use crate::registration::{AnyArc, Registration};
use crate::resolve::ResolverCore;
use crate::scope::Scope;

/// Explicit, per-call-chain resolution state.
///
/// A fresh context is created at every top-level resolve and passed by
/// reference through nested constructor calls. It carries the stack of keys
/// currently under construction on this logical call path, which serves two
/// purposes:
///
/// - cycle detection: a resolve that revisits a key already on the stack
///   fails with [`KeelError::ResolutionCycle`] instead of deadlocking;
/// - graph capture: every resolve records an edge from the in-progress key
///   to the resolved key, so the dependency graph accumulates as a side
///   effect of construction.
///
/// The context is deliberately not global and not thread-local: concurrent
/// resolution chains each get their own stack and stay isolated.
///
/// Constructors interact with it through the [`Resolver`](crate::Resolver)
/// trait:
///
/// ```rust
/// use keel::{Registry, Resolver};
///
/// struct Config {
///     url: String,
/// }
/// struct Database {
///     url: String,
/// }
///
/// let mut registry = Registry::new();
/// registry.instance(Config { url: "postgres://localhost".into() });
/// registry.lazy::<Database, _>(|cx| {
///     let config = cx.get::<Config>()?;
///     Ok(Database { url: config.url.clone() })
/// });
///
/// let provider = registry.build();
/// assert_eq!(provider.get::<Database>().unwrap().url, "postgres://localhost");
/// ```
pub struct ResolutionContext<'a> {
    provider: &'a Provider,
    stack: RefCell<Vec<ServiceKey>>,
}

impl<'a> ResolutionContext<'a> {
    pub(crate) fn root(provider: &'a Provider) -> Self {
        Self {
            provider,
            stack: RefCell::new(Vec::new()),
        }
    }

    /// Runs `f` with `key` pushed onto the construction stack.
    fn frame(
        &self,
        key: &ServiceKey,
        f: impl FnOnce() -> KeelResult<AnyArc>,
    ) -> KeelResult<AnyArc> {
        self.stack.borrow_mut().push(key.clone());
        let out = f();
        self.stack.borrow_mut().pop();
        out
    }

    fn construct(&self, key: &ServiceKey, reg: &Registration) -> KeelResult<AnyArc> {
        self.frame(key, || {
            (reg.ctor)(self).map_err(|err| match err.downcast::<KeelError>() {
                // Resolution errors from nested lookups pass through
                // unwrapped; foreign constructor errors get the failing key
                // attached.
                Ok(inner) => *inner,
                Err(other) => KeelError::Build {
                    key: key.to_string(),
                    source: other,
                },
            })
        })
    }

    /// Resolves one specific descriptor, bypassing the ambiguity rule. Used
    /// for multi-binding resolution and the seal pass.
    pub(crate) fn resolve_registration(
        &self,
        key: &ServiceKey,
        reg: &Registration,
    ) -> KeelResult<AnyArc> {
        if self.stack.borrow().iter().any(|entry| entry == key) {
            let mut path: Vec<String> =
                self.stack.borrow().iter().map(ToString::to_string).collect();
            path.push(key.to_string());
            return Err(KeelError::ResolutionCycle { path });
        }

        match reg.scope {
            Scope::Transient => self.construct(key, reg),
            _ => {
                // Fast path: already built.
                if let Some(value) = reg.cell.get() {
                    return Ok(value.clone());
                }
                // The cell serializes concurrent first resolutions; exactly
                // one constructor runs, losers block and read the winner's
                // value.
                reg.cell
                    .get_or_try_init(|| self.construct(key, reg))
                    .map(Clone::clone)
            }
        }
    }

    fn note_edge(&self, key: &ServiceKey) {
        if let Some(parent) = self.stack.borrow().last() {
            if parent != key {
                self.provider.record_edge(parent, key);
            }
        }
    }
}

impl ResolverCore for ResolutionContext<'_> {
    fn resolve_key(&self, key: &ServiceKey) -> KeelResult<Arc<dyn Any + Send + Sync>> {
        self.note_edge(key);
        let bucket = self.provider.bucket(key).unwrap_or(&[]);
        match bucket.len() {
            0 => Err(KeelError::NotFound(key.to_string())),
            1 => self.resolve_registration(key, &bucket[0]),
            count => Err(KeelError::Ambiguous {
                key: key.to_string(),
                count,
            }),
        }
    }

    fn resolve_family(
        &self,
        family: KeyFamily,
        tag: Option<&str>,
    ) -> KeelResult<Vec<Arc<dyn Any + Send + Sync>>> {
        let mut out = Vec::new();
        for (key, bucket) in self.provider.family_buckets(family) {
            let selected: Vec<&Registration> = bucket
                .iter()
                .filter(|reg| tag.map_or(true, |t| reg.tags.iter().any(|have| *have == t)))
                .collect();
            if selected.is_empty() {
                continue;
            }
            self.note_edge(key);
            for reg in selected {
                out.push(self.resolve_registration(key, reg)?);
            }
        }
        Ok(out)
    }

    fn has_key(&self, key: &ServiceKey) -> bool {
        self.provider.bucket(key).is_some_and(|bucket| !bucket.is_empty())
    }
}
