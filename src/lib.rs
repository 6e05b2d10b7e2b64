//! # keel
//!
//! Type-safe service registry with a deterministic startup/shutdown
//! orchestrator for long-running processes.
//!
//! Components declare construction logic and optional start/stop behavior
//! without knowing about each other; keel guarantees they are constructed,
//! started, and torn down in an order consistent with their runtime
//! dependencies.
//!
//! ## Features
//!
//! - **Scoped construction**: lazy singletons, eager singletons, transients,
//!   and pre-built instances
//! - **Multi-binding**: several descriptors per key, group tags, and
//!   collective resolution for plugin-style auto-discovery
//! - **Captured dependency graph**: edges are recorded as a side effect of
//!   resolution, never declared up front
//! - **Layered lifecycle**: topological startup layers, concurrent hooks
//!   within a layer, the exact reverse for shutdown
//! - **Rollback on failure**: a failed start hook unwinds everything that
//!   already started, in reverse order
//! - **Signal-driven shutdown**: first SIGINT/SIGTERM stops gracefully, a
//!   second one forces the process to exit
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use keel::{Registry, Resolver};
//!
//! struct Config {
//!     dsn: String,
//! }
//!
//! struct Database {
//!     dsn: String,
//! }
//!
//! let mut registry = Registry::new();
//! registry.instance(Config { dsn: "postgres://localhost".into() });
//! registry.lazy::<Database, _>(|cx| {
//!     let config = cx.get::<Config>()?;
//!     Ok(Database { dsn: config.dsn.clone() })
//! });
//!
//! let provider = registry.build();
//! let db = provider.get::<Database>().unwrap();
//! assert_eq!(db.dsn, "postgres://localhost");
//!
//! // Lazy singletons are memoized: same instance every time.
//! let again = provider.get::<Database>().unwrap();
//! assert!(Arc::ptr_eq(&db, &again));
//! ```
//!
//! ## Lifecycle orchestration
//!
//! Services opt into lifecycle participation with explicit hooks or by
//! implementing [`Starter`]/[`Stopper`]. The orchestrator seals the registry
//! (building eager singletons in dependency order), layers the captured
//! graph, and runs each layer's hooks concurrently with per-hook timeouts:
//!
//! ```rust,no_run
//! use keel::{Orchestrator, Registry, Resolver};
//!
//! struct Database;
//! struct HttpServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     registry
//!         .lazy::<Database, _>(|_| Ok(Database))
//!         .on_stop(|_db, _cx| async move { Ok(()) });
//!     registry
//!         .eager::<HttpServer, _>(|cx| {
//!             let _db = cx.get::<Database>()?;
//!             Ok(HttpServer)
//!         })
//!         .on_start(|_server, _cx| async move { Ok(()) })
//!         .on_stop(|_server, _cx| async move { Ok(()) });
//!
//!     let app = Orchestrator::new(registry.build());
//!     app.run_until_signaled().await?;
//!     Ok(())
//! }
//! ```
//!
//! The database stops after the server here, because the server's
//! constructor resolved the database and that edge put them in different
//! layers.

// Module declarations
pub mod error;
pub mod graph;
pub mod key;
pub mod lifecycle;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod resolve;
pub mod scope;

// Internal modules
mod registration;

// Re-export core types
pub use error::{BoxError, KeelError, KeelResult, StopFailure};
pub use graph::{GraphSnapshot, LifecyclePlan};
pub use key::{KeyFamily, ServiceKey};
pub use lifecycle::{CancelToken, HookContext, Starter, Stopper};
pub use orchestrator::{AppState, Orchestrator};
pub use provider::{Provider, ResolutionContext};
pub use registry::{Entry, Registry, TraitEntry};
pub use resolve::{Resolver, ResolverCore};
pub use scope::Scope;
