//! Scope strategies controlling how service instances are built and cached.

/// How a registered service is constructed and cached.
///
/// The scope decides when the constructor runs, whether the result is
/// memoized, and whether the service can take part in lifecycle ordering.
///
/// # Scope characteristics
///
/// - **LazySingleton**: built on first resolution, memoized for the process
///   lifetime. Concurrent first resolutions observe exactly one
///   construction.
/// - **EagerSingleton**: built during the seal pass that precedes the
///   orchestrator's start phase, in dependency order.
/// - **Transient**: rebuilt on every resolution; never cached and never
///   lifecycle-eligible, since there is no single instance to start or
///   stop.
/// - **Instance**: wraps a caller-supplied value; treated as already built.
///   This is how external collaborators hand parsed configuration, argument
///   lists, or logger handles to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Built on first resolution, memoized thereafter.
    LazySingleton,
    /// Built during the seal pass, before start hooks run.
    EagerSingleton,
    /// Rebuilt on every resolution.
    Transient,
    /// Caller-supplied value, pre-built at registration time.
    Instance,
}

impl Scope {
    /// Whether this scope holds a single shared instance.
    pub fn is_singleton(self) -> bool {
        !matches!(self, Scope::Transient)
    }
}
