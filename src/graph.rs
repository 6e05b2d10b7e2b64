//! Dependency graph capture and topological lifecycle planning.
//!
//! Edges are recorded as a side effect of resolution: while a constructor for
//! key `A` resolves key `B`, the edge `A -> B` is stored. The graph is never
//! fabricated ahead of time, because construction logic is opaque until it
//! runs. [`LifecyclePlan::compute`] is a pure function over a graph snapshot
//! and the set of lifecycle-eligible keys.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{KeelError, KeelResult};
use crate::key::ServiceKey;

/// Read-only copy of the dependency graph: dependent key to the keys it
/// required during construction.
pub type GraphSnapshot = BTreeMap<ServiceKey, BTreeSet<ServiceKey>>;

/// Directed adjacency accumulated during resolution. Monotonic within a
/// process run; edges are added, never removed.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    edges: BTreeMap<ServiceKey, BTreeSet<ServiceKey>>,
}

impl DependencyGraph {
    pub(crate) fn record(&mut self, from: &ServiceKey, to: &ServiceKey) {
        self.edges
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        self.edges.clone()
    }
}

/// Ordered sequence of startup layers.
///
/// Each layer is a set of keys with no unresolved lifecycle dependency on a
/// later layer. Keys within a layer are sorted by display name purely for
/// reproducible logs and tests; execution within a layer is concurrent and
/// logically unordered.
///
/// ```rust
/// use std::collections::{BTreeMap, BTreeSet};
/// use keel::{LifecyclePlan, ServiceKey};
///
/// struct Db;
/// struct Api;
///
/// let db = ServiceKey::of::<Db>();
/// let api = ServiceKey::of::<Api>();
///
/// let mut graph = BTreeMap::new();
/// graph.insert(api.clone(), BTreeSet::from([db.clone()]));
/// let eligible = BTreeSet::from([db.clone(), api.clone()]);
///
/// let plan = LifecyclePlan::compute(&graph, &eligible).unwrap();
/// assert_eq!(plan.layers(), &[vec![db.clone()], vec![api.clone()]]);
///
/// // Shutdown is the exact reverse of the same layers.
/// assert_eq!(plan.reversed().layers(), &[vec![api], vec![db]]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePlan {
    layers: Vec<Vec<ServiceKey>>,
}

impl LifecyclePlan {
    /// Computes startup layers from a graph snapshot and the set of
    /// lifecycle-eligible keys.
    ///
    /// Standard in-degree layering: a key is ready once all of its eligible
    /// dependencies have been placed in earlier layers. Dependencies on
    /// non-eligible keys never block. If keys remain but none is ready, the
    /// eligible keys contain a cycle and [`KeelError::LifecycleCycle`] names
    /// the stuck keys; no partial order is ever returned.
    pub fn compute(graph: &GraphSnapshot, eligible: &BTreeSet<ServiceKey>) -> KeelResult<Self> {
        let mut waiting: BTreeMap<ServiceKey, BTreeSet<ServiceKey>> = eligible
            .iter()
            .map(|key| {
                let deps = graph
                    .get(key)
                    .map(|deps| {
                        deps.iter()
                            .filter(|dep| eligible.contains(*dep) && *dep != key)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                (key.clone(), deps)
            })
            .collect();

        let mut layers = Vec::new();
        while !waiting.is_empty() {
            let mut ready: Vec<ServiceKey> = waiting
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(key, _)| key.clone())
                .collect();

            if ready.is_empty() {
                let keys = waiting.keys().map(ToString::to_string).collect();
                return Err(KeelError::LifecycleCycle { keys });
            }

            ready.sort_by_key(|key| (key.display_name(), key.service_name()));
            for key in &ready {
                waiting.remove(key);
            }
            for deps in waiting.values_mut() {
                for key in &ready {
                    deps.remove(key);
                }
            }
            layers.push(ready);
        }

        Ok(Self { layers })
    }

    /// The startup layers, earliest first.
    pub fn layers(&self) -> &[Vec<ServiceKey>] {
        &self.layers
    }

    /// The mirrored shutdown plan: layer order reversed, keys within each
    /// layer unchanged. Whatever started together stops together.
    pub fn reversed(&self) -> Self {
        Self {
            layers: self.layers.iter().rev().cloned().collect(),
        }
    }

    /// Total number of keys across all layers.
    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Whether the plan contains no keys at all.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
