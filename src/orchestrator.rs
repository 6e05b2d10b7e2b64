//! Startup/shutdown orchestration over the lifecycle plan.
//!
//! The orchestrator drives the plan computed by
//! [`LifecyclePlan`](crate::LifecyclePlan) at runtime: layers execute
//! strictly one after another, hooks within a layer run concurrently, every
//! hook is bounded by a timeout, and the first start failure aborts the
//! attempt and unwinds whatever already started. Shutdown replays the frozen
//! plan in reverse, best-effort.
//!
//! ```rust,no_run
//! use keel::{Orchestrator, Registry};
//!
//! struct Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     registry
//!         .eager::<Server, _>(|_| Ok(Server))
//!         .on_start(|_server, _cx| async move { Ok(()) })
//!         .on_stop(|_server, _cx| async move { Ok(()) });
//!
//!     let app = Orchestrator::new(registry.build());
//!     // Starts every service, waits for SIGINT/SIGTERM, stops gracefully.
//!     // A second signal while stopping forces the process to exit.
//!     app.run_until_signaled().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::error::{BoxError, KeelError, KeelResult, StopFailure};
use crate::graph::LifecyclePlan;
use crate::key::ServiceKey;
use crate::lifecycle::{CancelToken, HookContext};
use crate::provider::{HookAction, LifecycleUnit, Provider};

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of one [`Orchestrator`].
///
/// `StartFailed` is terminal for the attempt: the orchestrator does not
/// retry, and a failed attempt cannot be stopped (rollback already ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// `start` has not been called yet.
    NotStarted,
    /// Start hooks are executing.
    Starting,
    /// Every start hook completed; the process is serving.
    Running,
    /// Stop hooks are executing.
    Stopping,
    /// Shutdown ran to completion.
    Stopped,
    /// A start hook failed and the attempt was rolled back.
    StartFailed,
}

impl AppState {
    /// Short lowercase name used in state-transition errors.
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::NotStarted => "not started",
            AppState::Starting => "starting",
            AppState::Running => "running",
            AppState::Stopping => "stopping",
            AppState::Stopped => "stopped",
            AppState::StartFailed => "start failed",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Plan and units frozen at start time. Shutdown replays this snapshot; it
// never recomputes from the live graph.
struct Frozen {
    plan: LifecyclePlan,
    units: HashMap<ServiceKey, Vec<LifecycleUnit>>,
}

/// Drives startup and shutdown of every lifecycle-eligible service.
///
/// See the [module docs](self) for the overall flow. One orchestrator
/// manages one start attempt; `start` and `stop` are each valid exactly once
/// and misuse returns [`KeelError::WrongState`] rather than silently doing
/// nothing.
pub struct Orchestrator {
    provider: Provider,
    state: Mutex<AppState>,
    frozen: Mutex<Option<Frozen>>,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator over a built provider.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: Mutex::new(AppState::NotStarted),
            frozen: Mutex::new(None),
            start_timeout: DEFAULT_HOOK_TIMEOUT,
            stop_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Sets the default timeout applied to start hooks without a
    /// per-registration override.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Sets the default timeout applied to stop hooks without a
    /// per-registration override.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// The provider this orchestrator drives.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> AppState {
        *self.state.lock().await
    }

    /// Seals the registry, computes the lifecycle plan, and executes start
    /// hooks layer by layer.
    ///
    /// On the first hook failure or timeout the remaining layers are
    /// abandoned, every service that already completed its start hook is
    /// stopped in reverse order, and the original failure is returned with
    /// any rollback stop failures attached.
    pub async fn start(&self) -> KeelResult<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                AppState::NotStarted => *state = AppState::Starting,
                other => {
                    return Err(KeelError::WrongState {
                        op: "start",
                        state: other.as_str(),
                    })
                }
            }
        }

        match self.start_inner().await {
            Ok(()) => {
                *self.state.lock().await = AppState::Running;
                tracing::info!("all services started");
                Ok(())
            }
            Err(err) => {
                *self.state.lock().await = AppState::StartFailed;
                Err(err)
            }
        }
    }

    async fn start_inner(&self) -> KeelResult<()> {
        self.provider.seal()?;
        let plan = self.provider.plan()?;
        let units = self.provider.lifecycle_units()?;

        // Freeze the mirrored plan now so shutdown never depends on graph
        // growth that happens after start.
        *self.frozen.lock().await = Some(Frozen {
            plan: plan.reversed(),
            units: units.clone(),
        });

        tracing::info!(
            layers = plan.layers().len(),
            services = plan.len(),
            "starting services"
        );

        let cancel = CancelToken::new();
        let mut started: Vec<LifecycleUnit> = Vec::new();

        for (depth, layer) in plan.layers().iter().enumerate() {
            let layer_units: Vec<LifecycleUnit> = layer
                .iter()
                .flat_map(|key| units.get(key).cloned().unwrap_or_default())
                .collect();
            let (active, passive): (Vec<_>, Vec<_>) = layer_units
                .into_iter()
                .partition(|unit| unit.start.is_some());

            tracing::debug!(layer = depth, hooks = active.len(), "starting layer");

            let mut join = JoinSet::new();
            for (idx, unit) in active.iter().enumerate() {
                let Some(action) = unit.start.clone() else {
                    continue;
                };
                let timeout = unit.start_timeout.unwrap_or(self.start_timeout);
                let cx = HookContext::new(cancel.clone(), Instant::now() + timeout);
                join.spawn(async move { (idx, run_hook(action, timeout, cx).await) });
            }

            let mut failed: Option<(ServiceKey, BoxError)> = None;
            while let Some(next) = join.join_next().await {
                match next {
                    Ok((idx, Ok(()))) => {
                        tracing::debug!(service = %active[idx].key, "started");
                        started.push(active[idx].clone());
                    }
                    Ok((idx, Err(err))) => {
                        if failed.is_none() {
                            tracing::error!(
                                service = %active[idx].key,
                                error = %err,
                                "start hook failed; aborting startup"
                            );
                            cancel.cancel();
                            failed = Some((active[idx].key.clone(), err));
                        } else {
                            tracing::error!(
                                service = %active[idx].key,
                                error = %err,
                                "start hook failed while aborting"
                            );
                        }
                    }
                    Err(join_err) if join_err.is_panic() => {
                        std::panic::resume_unwind(join_err.into_panic())
                    }
                    Err(_) => {}
                }
            }

            if let Some((key, source)) = failed {
                let rollback = self.rollback(&started).await;
                return Err(KeelError::StartFailed {
                    key: key.to_string(),
                    source,
                    rollback,
                });
            }
            started.extend(passive);
        }

        Ok(())
    }

    // Best-effort reverse-order unwind after a start failure. Failures are
    // collected, not propagated, so the unwind always reaches the earliest
    // started service.
    async fn rollback(&self, started: &[LifecycleUnit]) -> Vec<StopFailure> {
        if started.is_empty() {
            return Vec::new();
        }
        tracing::warn!(services = started.len(), "rolling back started services");

        let cancel = CancelToken::new();
        let mut failures = Vec::new();
        for unit in started.iter().rev() {
            let Some(action) = unit.stop.clone() else {
                continue;
            };
            let timeout = unit.stop_timeout.unwrap_or(self.stop_timeout);
            let cx = HookContext::new(cancel.clone(), Instant::now() + timeout);
            if let Err(err) = run_hook(action, timeout, cx).await {
                tracing::error!(service = %unit.key, error = %err, "rollback stop failed");
                failures.push(StopFailure {
                    key: unit.key.to_string(),
                    error: err.to_string(),
                });
            }
        }
        failures
    }

    /// Stops every started service using the default stop-hook timeout.
    pub async fn stop(&self) -> KeelResult<()> {
        self.stop_with_timeout(self.stop_timeout).await
    }

    /// Stops every started service, replaying the frozen shutdown plan:
    /// layers in reverse start order, hooks concurrent within a layer, each
    /// bounded by `hook_timeout` unless the registration overrides it.
    ///
    /// Shutdown is best-effort: a failing or timed-out stop hook is logged
    /// and does not block the rest of its layer or later layers. When any
    /// hook failed, the collected failures are returned as
    /// [`KeelError::StopFailed`] after shutdown has run to completion.
    ///
    /// Calling `stop` when the orchestrator is not running, including a
    /// second call after a successful stop, returns
    /// [`KeelError::WrongState`].
    pub async fn stop_with_timeout(&self, hook_timeout: Duration) -> KeelResult<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                AppState::Running => *state = AppState::Stopping,
                other => {
                    return Err(KeelError::WrongState {
                        op: "stop",
                        state: other.as_str(),
                    })
                }
            }
        }

        let frozen = self.frozen.lock().await.take();
        let mut failures = Vec::new();

        if let Some(frozen) = frozen {
            tracing::info!(layers = frozen.plan.layers().len(), "stopping services");
            let cancel = CancelToken::new();

            for (depth, layer) in frozen.plan.layers().iter().enumerate() {
                let mut join = JoinSet::new();
                for unit in layer
                    .iter()
                    .flat_map(|key| frozen.units.get(key).cloned().unwrap_or_default())
                {
                    let Some(action) = unit.stop.clone() else {
                        continue;
                    };
                    let timeout = unit.stop_timeout.unwrap_or(hook_timeout);
                    let cx = HookContext::new(cancel.clone(), Instant::now() + timeout);
                    let key = unit.key.clone();
                    join.spawn(async move { (key, run_hook(action, timeout, cx).await) });
                }

                tracing::debug!(layer = depth, hooks = join.len(), "stopping layer");
                while let Some(next) = join.join_next().await {
                    match next {
                        Ok((_, Ok(()))) => {}
                        Ok((key, Err(err))) => {
                            tracing::error!(service = %key, error = %err, "stop hook failed");
                            failures.push(StopFailure {
                                key: key.to_string(),
                                error: err.to_string(),
                            });
                        }
                        Err(join_err) if join_err.is_panic() => {
                            std::panic::resume_unwind(join_err.into_panic())
                        }
                        Err(_) => {}
                    }
                }
            }
        }

        *self.state.lock().await = AppState::Stopped;
        tracing::info!("shutdown complete");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(KeelError::StopFailed { failures })
        }
    }

    /// Starts the services, then blocks until the process receives a
    /// termination signal and stops them gracefully.
    ///
    /// The first SIGINT/SIGTERM triggers [`stop`](Orchestrator::stop). A
    /// second signal while shutdown is in progress exits the process
    /// immediately, bypassing any remaining hooks. This is the operator's
    /// escape hatch when graceful shutdown hangs.
    pub async fn run_until_signaled(&self) -> KeelResult<()> {
        self.start().await?;
        wait_for_termination().await?;
        tracing::info!("termination signal received; stopping");

        let force = tokio::spawn(async {
            if wait_for_termination().await.is_ok() {
                tracing::warn!("second termination signal; forcing exit");
                std::process::exit(130);
            }
        });

        let result = self.stop().await;
        force.abort();
        result
    }
}

async fn run_hook(
    action: HookAction,
    timeout: Duration,
    cx: HookContext,
) -> Result<(), BoxError> {
    match tokio::time::timeout(timeout, action(cx)).await {
        Ok(result) => result,
        Err(_) => Err(BoxError::from(KeelError::HookTimeout(timeout))),
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> KeelResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(KeelError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(KeelError::Signal)?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> KeelResult<()> {
    tokio::signal::ctrl_c().await.map_err(KeelError::Signal)
}
