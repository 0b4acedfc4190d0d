//! The causal hypergraph: vertices, k-ary hyperedges and a reflexive
//! causal-successor relation.
//!
//! The [`Hypergraph`] owns all of its entities. Vertex and hyperedge handles
//! are issued by two monotonically increasing arena counters and are never
//! reused, so rewrites and rollbacks cannot alias an old handle onto a new
//! entity. All maps are ordered, which makes iteration (and therefore every
//! seeded random choice made over it) deterministic.
//!
//! Invariants maintained by the public API:
//!
//! - every vertex is its own causal successor;
//! - every hyperedge references only live vertices;
//! - `depth(v) >= depth(u) + 1` whenever `add_causal_relation(u, v)` recorded
//!   a new relation. Depth never decreases.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use hcsn_types::{EdgeId, VertexId};

use crate::error::GraphError;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Discrete charge-like label carried by some vertices.
///
/// Only the frustration observables read it; the engine ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charge {
    /// Label `-1`.
    Negative,
    /// Label `+1`.
    Positive,
}

/// A fundamental event of the hypergraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    /// Stable handle.
    pub id: VertexId,
    /// Worldline depth: longest causal chain ending at this vertex (>= 1).
    pub depth: u32,
    /// Optional charge label.
    pub charge: Option<Charge>,
}

/// A k-ary relation over an ordered tuple of vertices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperedge {
    /// Stable handle.
    pub id: EdgeId,
    /// Ordered member vertices.
    vertices: Vec<VertexId>,
}

impl Hyperedge {
    /// The ordered member vertices.
    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Number of member vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the hyperedge has no members (never true for live edges).
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether `vertex` is a member.
    pub fn contains(&self, vertex: VertexId) -> bool {
        self.vertices.contains(&vertex)
    }
}

/// Summary statistics of a hypergraph at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Live vertex count.
    pub num_vertices: usize,
    /// Live hyperedge count.
    pub num_hyperedges: usize,
    /// Mean number of hyperedges per vertex.
    pub avg_coordination: f64,
    /// Longest causal chain.
    pub max_chain_length: u32,
}

/// Structural snapshot used to compare two graphs for identity.
///
/// Two graphs with equal shapes have the same vertex set (with depths), the
/// same hyperedges and the same causal-successor sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphShape {
    /// Vertex handles with their depths.
    pub depths: BTreeMap<VertexId, u32>,
    /// Hyperedge handles with their member tuples.
    pub hyperedges: BTreeMap<EdgeId, Vec<VertexId>>,
    /// Causal-successor sets.
    pub successors: BTreeMap<VertexId, BTreeSet<VertexId>>,
}

// ---------------------------------------------------------------------------
// Hypergraph
// ---------------------------------------------------------------------------

/// The causal hypergraph holding all vertices, hyperedges and causal order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hypergraph {
    /// All live vertices indexed by handle.
    vertices: BTreeMap<VertexId, Vertex>,
    /// All live hyperedges indexed by handle.
    hyperedges: BTreeMap<EdgeId, Hyperedge>,
    /// Causal order: vertex -> set of causal successors (reflexive).
    causal_order: BTreeMap<VertexId, BTreeSet<VertexId>>,
    /// Next vertex handle to issue.
    next_vertex: u64,
    /// Next hyperedge handle to issue.
    next_edge: u64,
}

impl Hypergraph {
    /// Create an empty hypergraph.
    pub const fn new() -> Self {
        Self {
            vertices: BTreeMap::new(),
            hyperedges: BTreeMap::new(),
            causal_order: BTreeMap::new(),
            next_vertex: 0,
            next_edge: 0,
        }
    }

    /// The two-vertex seed universe: `a -> b` joined by the hyperedge `[a, b]`.
    ///
    /// Built directly from its arena contents: handles `0` and `1`, `b` at
    /// depth 2, one hyperedge with handle `0`.
    pub fn seed_universe() -> Self {
        let a = VertexId::new(0);
        let b = VertexId::new(1);
        let edge = EdgeId::new(0);
        Self {
            vertices: BTreeMap::from([
                (
                    a,
                    Vertex {
                        id: a,
                        depth: 1,
                        charge: None,
                    },
                ),
                (
                    b,
                    Vertex {
                        id: b,
                        depth: 2,
                        charge: None,
                    },
                ),
            ]),
            hyperedges: BTreeMap::from([(
                edge,
                Hyperedge {
                    id: edge,
                    vertices: vec![a, b],
                },
            )]),
            causal_order: BTreeMap::from([(a, BTreeSet::from([a, b])), (b, BTreeSet::from([b]))]),
            next_vertex: 2,
            next_edge: 1,
        }
    }

    // -------------------------------------------------------------------
    // Vertex operations
    // -------------------------------------------------------------------

    /// Add a fresh uncharged vertex with depth 1 and return its handle.
    pub fn add_vertex(&mut self) -> VertexId {
        self.push_vertex(None)
    }

    /// Add a fresh vertex carrying a charge label.
    pub fn add_charged_vertex(&mut self, charge: Charge) -> VertexId {
        self.push_vertex(Some(charge))
    }

    fn push_vertex(&mut self, charge: Option<Charge>) -> VertexId {
        let id = VertexId::new(self.next_vertex);
        self.next_vertex = self.next_vertex.saturating_add(1);
        self.vertices.insert(
            id,
            Vertex {
                id,
                depth: 1,
                charge,
            },
        );
        self.causal_order.insert(id, BTreeSet::from([id]));
        id
    }

    /// Get a vertex by handle.
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    /// Whether `id` is a live vertex.
    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    /// Number of live vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// All live vertex handles in ascending order.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices.keys().copied().collect()
    }

    /// Iterate over all live vertices in ascending handle order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    /// Depth of a vertex, if live.
    pub fn depth(&self, id: VertexId) -> Option<u32> {
        self.vertices.get(&id).map(|v| v.depth)
    }

    // -------------------------------------------------------------------
    // Hyperedge operations
    // -------------------------------------------------------------------

    /// Add a hyperedge over the given ordered vertices.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EdgeTooSmall`] for fewer than two vertices and
    /// [`GraphError::VertexNotFound`] if any vertex is not live.
    pub fn add_hyperedge(&mut self, vertices: Vec<VertexId>) -> Result<EdgeId, GraphError> {
        if vertices.len() < 2 {
            return Err(GraphError::EdgeTooSmall {
                len: vertices.len(),
            });
        }
        if let Some(&missing) = vertices.iter().find(|v| !self.vertices.contains_key(v)) {
            return Err(GraphError::VertexNotFound(missing));
        }
        let id = EdgeId::new(self.next_edge);
        self.next_edge = self.next_edge.saturating_add(1);
        self.hyperedges.insert(id, Hyperedge { id, vertices });
        Ok(id)
    }

    /// Get a hyperedge by handle.
    pub fn hyperedge(&self, id: EdgeId) -> Option<&Hyperedge> {
        self.hyperedges.get(&id)
    }

    /// Number of live hyperedges.
    pub fn edge_count(&self) -> usize {
        self.hyperedges.len()
    }

    /// All live hyperedge handles in ascending order.
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.hyperedges.keys().copied().collect()
    }

    /// Iterate over all live hyperedges in ascending handle order.
    pub fn hyperedges(&self) -> impl Iterator<Item = &Hyperedge> {
        self.hyperedges.values()
    }

    // -------------------------------------------------------------------
    // Causal structure
    // -------------------------------------------------------------------

    /// Record the causal relation `u -> v` and propagate worldline depth.
    ///
    /// Returns `Ok(true)` if the relation is new, `Ok(false)` if it was
    /// already present (including `u == v`).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] if either end is not live.
    pub fn add_causal_relation(&mut self, u: VertexId, v: VertexId) -> Result<bool, GraphError> {
        let u_depth = self
            .vertices
            .get(&u)
            .map(|vertex| vertex.depth)
            .ok_or(GraphError::VertexNotFound(u))?;
        let target = self
            .vertices
            .get_mut(&v)
            .ok_or(GraphError::VertexNotFound(v))?;

        let inserted = self.causal_order.entry(u).or_default().insert(v);
        if inserted {
            target.depth = target.depth.max(u_depth.saturating_add(1));
        }
        Ok(inserted)
    }

    /// Whether `v` is a causal successor of `u`.
    pub fn is_causally_related(&self, u: VertexId, v: VertexId) -> bool {
        self.causal_order.get(&u).is_some_and(|set| set.contains(&v))
    }

    /// Borrow the causal-successor set of a vertex.
    pub fn successors(&self, v: VertexId) -> Option<&BTreeSet<VertexId>> {
        self.causal_order.get(&v)
    }

    /// The causal future `J+(v)` (successor set lookup).
    pub fn causal_future(&self, v: VertexId) -> BTreeSet<VertexId> {
        self.causal_order.get(&v).cloned().unwrap_or_default()
    }

    /// The causal past `J-(v)`, computed by a full scan of the order.
    pub fn causal_past(&self, v: VertexId) -> BTreeSet<VertexId> {
        self.causal_order
            .iter()
            .filter(|(_, successors)| successors.contains(&v))
            .map(|(&u, _)| u)
            .collect()
    }

    // -------------------------------------------------------------------
    // Observables
    // -------------------------------------------------------------------

    /// Degree of a vertex: number of hyperedges containing it.
    pub fn coordination_number(&self, v: VertexId) -> usize {
        self.hyperedges.values().filter(|e| e.contains(v)).count()
    }

    /// Coordination number of every live vertex, in a single pass over the
    /// hyperedges. Vertices in no hyperedge map to zero.
    pub fn coordination_counts(&self) -> BTreeMap<VertexId, usize> {
        let mut counts: BTreeMap<VertexId, usize> =
            self.vertices.keys().map(|&v| (v, 0)).collect();
        for edge in self.hyperedges.values() {
            let members: BTreeSet<VertexId> = edge.vertices.iter().copied().collect();
            for v in members {
                if let Some(count) = counts.get_mut(&v) {
                    *count = count.saturating_add(1);
                }
            }
        }
        counts
    }

    /// Mean coordination number `<k>`; 0.0 for an empty graph.
    pub fn average_coordination(&self) -> f64 {
        if self.vertices.is_empty() {
            return 0.0;
        }
        let total = self
            .coordination_counts()
            .values()
            .fold(0_usize, |acc, &k| acc.saturating_add(k));

        // Both values are bounded by graph size; safe to represent as f64.
        #[allow(clippy::cast_precision_loss)]
        let mean = total as f64 / self.vertices.len() as f64;
        mean
    }

    /// Maximum causal chain length over all vertices; 0 if empty.
    pub fn max_chain_length(&self) -> u32 {
        self.vertices.values().map(|v| v.depth).max().unwrap_or(0)
    }

    /// Summary statistics for logging.
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            num_vertices: self.vertex_count(),
            num_hyperedges: self.edge_count(),
            avg_coordination: self.average_coordination(),
            max_chain_length: self.max_chain_length(),
        }
    }

    /// Structural snapshot for identity comparisons.
    pub fn shape(&self) -> GraphShape {
        GraphShape {
            depths: self.vertices.iter().map(|(&id, v)| (id, v.depth)).collect(),
            hyperedges: self
                .hyperedges
                .iter()
                .map(|(&id, e)| (id, e.vertices.clone()))
                .collect(),
            successors: self.causal_order.clone(),
        }
    }

    // -------------------------------------------------------------------
    // Raw mutation used by rewrite rules and their undo records
    // -------------------------------------------------------------------

    /// Remove a vertex together with its own successor entry.
    pub(crate) fn take_vertex(&mut self, id: VertexId) -> Option<(Vertex, BTreeSet<VertexId>)> {
        let vertex = self.vertices.remove(&id)?;
        let successors = self.causal_order.remove(&id).unwrap_or_default();
        Some((vertex, successors))
    }

    /// Re-insert a vertex object with its successor set.
    pub(crate) fn restore_vertex(&mut self, vertex: Vertex, successors: BTreeSet<VertexId>) {
        self.causal_order.insert(vertex.id, successors);
        self.vertices.insert(vertex.id, vertex);
    }

    /// Remove a hyperedge.
    pub(crate) fn take_hyperedge(&mut self, id: EdgeId) -> Option<Hyperedge> {
        self.hyperedges.remove(&id)
    }

    /// Re-insert a hyperedge object.
    pub(crate) fn restore_hyperedge(&mut self, edge: Hyperedge) {
        self.hyperedges.insert(edge.id, edge);
    }

    /// Remove a single successor entry `u -> v`.
    pub(crate) fn drop_causal_relation(&mut self, u: VertexId, v: VertexId) {
        if let Some(set) = self.causal_order.get_mut(&u) {
            set.remove(&v);
        }
    }

    /// Overwrite the successor set of `u`.
    pub(crate) fn replace_successors(&mut self, u: VertexId, successors: BTreeSet<VertexId>) {
        self.causal_order.insert(u, successors);
    }
}
