//! Lifecycle capability traits and the context handed to hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::BoxError;

/// Capability for services that perform work when the process starts.
///
/// Implementing `Starter` alone does not make a service lifecycle-eligible;
/// the registration must opt in with [`Entry::starter`](crate::Entry::starter),
/// which captures the adapter on the descriptor. An explicit
/// [`on_start`](crate::Entry::on_start) hook on the same registration fully
/// replaces this method.
///
/// ```rust
/// use async_trait::async_trait;
/// use keel::{BoxError, HookContext, Starter};
///
/// struct Listener;
///
/// #[async_trait]
/// impl Starter for Listener {
///     async fn start(&self, _cx: &HookContext) -> Result<(), BoxError> {
///         // bind sockets, spawn accept loops, ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Starter: Send + Sync {
    /// Bring the service online. Runs concurrently with the other start
    /// hooks of the same layer, bounded by the hook's timeout.
    async fn start(&self, cx: &HookContext) -> Result<(), BoxError>;
}

/// Capability for services that perform work when the process stops.
///
/// Detected independently of [`Starter`]; a service may implement only one.
/// An explicit [`on_stop`](crate::Entry::on_stop) hook fully replaces it.
#[async_trait]
pub trait Stopper: Send + Sync {
    /// Take the service offline. Failures are logged and do not block the
    /// rest of the shutdown.
    async fn stop(&self, cx: &HookContext) -> Result<(), BoxError>;
}

/// A cancellation signal shared by every hook of one orchestration attempt.
///
/// Cancelling the token wakes all hooks currently awaiting
/// [`cancelled`](CancelToken::cancelled). Hooks that already completed are
/// unaffected.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        // Register interest before re-checking the flag so a concurrent
        // cancel() between the check and the await cannot be lost.
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Context handed to every lifecycle hook invocation.
///
/// Carries the attempt's cancellation token and the hook's deadline. The
/// orchestrator enforces the deadline regardless; the context lets
/// well-behaved hooks stop early instead of being abandoned mid-flight.
#[derive(Clone)]
pub struct HookContext {
    cancel: CancelToken,
    deadline: Instant,
}

impl HookContext {
    pub(crate) fn new(cancel: CancelToken, deadline: Instant) -> Self {
        Self { cancel, deadline }
    }

    /// Whether this attempt has been cancelled (rollback or forced stop).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the attempt is cancelled. Intended for `tokio::select!`
    /// against the hook's own work.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The instant after which the orchestrator abandons this hook.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
