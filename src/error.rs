//! Error types for registration, resolution, and lifecycle orchestration.

use std::fmt;
use std::time::Duration;

/// Boxed error type accepted from constructors and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used throughout keel.
pub type KeelResult<T> = Result<T, KeelError>;

/// Errors surfaced by the registry, resolver, and orchestrator.
///
/// Resolution errors (`NotFound`, `Ambiguous`, `ResolutionCycle`) and plan
/// errors (`LifecycleCycle`) are always returned synchronously to the caller
/// that triggered them. `StartFailed` carries any rollback stop failures as
/// supplementary detail; it never silently swallows them.
#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    /// No descriptor is registered under the requested key.
    #[error("no service registered for {0}")]
    NotFound(String),

    /// More than one descriptor matches a resolve-one request. Callers must
    /// use `get_all`/`get_group` or a named registration instead; picking
    /// the first match silently would hide configuration bugs.
    #[error("{count} descriptors registered for {key}; use get_all or a named registration")]
    Ambiguous {
        /// The ambiguous key.
        key: String,
        /// How many descriptors matched.
        count: usize,
    },

    /// A stored value failed to downcast to the requested type.
    #[error("type mismatch resolving {0}")]
    TypeMismatch(&'static str),

    /// A construction path revisited a key already under construction on
    /// the same resolution context.
    #[error("resolution cycle: {}", .path.join(" -> "))]
    ResolutionCycle {
        /// The construction path, ending with the revisited key.
        path: Vec<String>,
    },

    /// The lifecycle-eligible keys admit no topological order.
    #[error("no start order exists; cycle among: {}", .keys.join(", "))]
    LifecycleCycle {
        /// Keys left without a valid position in the plan.
        keys: Vec<String>,
    },

    /// A constructor returned an error while building the named service.
    #[error("constructing {key}")]
    Build {
        /// The key that was being built.
        key: String,
        /// The constructor's error.
        #[source]
        source: BoxError,
    },

    /// A lifecycle hook did not return within its timeout.
    #[error("hook did not complete within {0:?}")]
    HookTimeout(Duration),

    /// A start hook failed or timed out; the attempt was rolled back.
    #[error("start hook for {key} failed")]
    StartFailed {
        /// The key whose start hook failed.
        key: String,
        /// The hook's error, or [`KeelError::HookTimeout`].
        #[source]
        source: BoxError,
        /// Stop failures observed while unwinding already-started services.
        rollback: Vec<StopFailure>,
    },

    /// One or more stop hooks failed during shutdown. Shutdown still ran to
    /// completion; this is a report, not an abort.
    #[error("{} stop hook(s) failed during shutdown", .failures.len())]
    StopFailed {
        /// Every stop hook failure, in the order it was observed.
        failures: Vec<StopFailure>,
    },

    /// A lifecycle operation was invoked in a state that does not permit it,
    /// e.g. `start` twice or `stop` before `start`.
    #[error("cannot {op} while {state}")]
    WrongState {
        /// The rejected operation.
        op: &'static str,
        /// The orchestrator state at the time.
        state: &'static str,
    },

    /// Installing an OS signal handler failed.
    #[error("installing signal handler")]
    Signal(#[source] std::io::Error),
}

/// One failed stop hook, recorded during shutdown or rollback.
#[derive(Debug, Clone)]
pub struct StopFailure {
    /// The key whose stop hook failed.
    pub key: String,
    /// The rendered hook error.
    pub error: String,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}
