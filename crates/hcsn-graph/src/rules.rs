//! Local rewrite rules and their undo records.
//!
//! Both rules mutate the [`Hypergraph`] in place and hand back an
//! [`UndoRecord`] holding exactly what is needed to invert the mutation.
//! Expected degenerate situations are reported as a [`RuleRejection`] and
//! leave the graph untouched.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::warn;

use hcsn_types::{EdgeId, RuleKind, VertexId};

use crate::error::{GraphError, RuleRejection};
use crate::hypergraph::{Charge, Hyperedge, Hypergraph, Vertex};

/// Probability that a vertex in the causal past of a parent also becomes a
/// direct causal predecessor of the created vertex.
pub const THICKENING_PROBABILITY: f64 = 0.3;

/// Result of applying a rewrite rule.
pub type RuleOutcome = Result<UndoRecord, RuleRejection>;

// ---------------------------------------------------------------------------
// Undo records
// ---------------------------------------------------------------------------

/// Inverse of one edge-creation rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationUndo {
    /// Anchor the rewrite was constrained to, if any.
    pub anchor: Option<VertexId>,
    /// The hyperedge that was extended.
    pub source_edge: EdgeId,
    /// Members of the source hyperedge.
    pub parents: Vec<VertexId>,
    /// Vertices created by the rewrite.
    pub added_vertices: Vec<VertexId>,
    /// Hyperedges created by the rewrite.
    pub added_edges: Vec<EdgeId>,
    /// Causal pairs `(u, v)` recorded by the rewrite.
    pub added_relations: Vec<(VertexId, VertexId)>,
}

/// Inverse of one vertex-fusion rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionUndo {
    /// The surviving vertex.
    pub kept: VertexId,
    /// The merged-away vertex object.
    pub removed_vertex: Vertex,
    /// Successor set of the merged-away vertex.
    pub removed_successors: BTreeSet<VertexId>,
    /// Hyperedges deleted because they contained the merged-away vertex.
    pub removed_edges: Vec<Hyperedge>,
    /// Successor sets, before redirection, of every vertex that referenced
    /// the merged-away vertex.
    pub prior_successors: Vec<(VertexId, BTreeSet<VertexId>)>,
}

/// Everything needed to invert a committed-or-tentative rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoRecord {
    /// Undo for [`edge_creation_rule`].
    Creation(CreationUndo),
    /// Undo for [`vertex_fusion_rule`].
    Fusion(FusionUndo),
}

impl UndoRecord {
    /// Which rule produced this record.
    pub const fn rule(&self) -> RuleKind {
        match self {
            Self::Creation(_) => RuleKind::EdgeCreation,
            Self::Fusion(_) => RuleKind::VertexFusion,
        }
    }

    /// Vertices the rewrite created.
    pub fn added_vertices(&self) -> &[VertexId] {
        match self {
            Self::Creation(c) => &c.added_vertices,
            Self::Fusion(_) => &[],
        }
    }

    /// Vertices the rewrite removed.
    pub fn removed_vertices(&self) -> &[VertexId] {
        match self {
            Self::Creation(_) => &[],
            Self::Fusion(f) => std::slice::from_ref(&f.removed_vertex.id),
        }
    }

    /// Hyperedges the rewrite created.
    pub fn added_edges(&self) -> &[EdgeId] {
        match self {
            Self::Creation(c) => &c.added_edges,
            Self::Fusion(_) => &[],
        }
    }

    /// Hyperedges the rewrite deleted.
    pub fn removed_edges(&self) -> Vec<EdgeId> {
        match self {
            Self::Creation(_) => Vec::new(),
            Self::Fusion(f) => f.removed_edges.iter().map(|e| e.id).collect(),
        }
    }

    /// Vertices that existed before the rewrite and shaped its result:
    /// the source-edge members for creation, the kept vertex for fusion.
    pub fn parent_vertices(&self) -> Vec<VertexId> {
        match self {
            Self::Creation(c) => c.parents.clone(),
            Self::Fusion(f) => vec![f.kept],
        }
    }

    /// Every vertex the rewrite touched (parents plus created or removed).
    pub fn touched_vertices(&self) -> BTreeSet<VertexId> {
        let mut touched: BTreeSet<VertexId> = self.parent_vertices().into_iter().collect();
        touched.extend(self.added_vertices().iter().copied());
        touched.extend(self.removed_vertices().iter().copied());
        touched
    }

    /// Apply the exact inverse of the rewrite to `h`.
    ///
    /// `h` must be the graph the rewrite was applied to, with no other
    /// structural change in between.
    pub fn revert(self, h: &mut Hypergraph) {
        match self {
            Self::Creation(c) => {
                for &(u, v) in &c.added_relations {
                    h.drop_causal_relation(u, v);
                }
                for edge in &c.added_edges {
                    h.take_hyperedge(*edge);
                }
                for vertex in &c.added_vertices {
                    h.take_vertex(*vertex);
                }
            }
            Self::Fusion(f) => {
                h.restore_vertex(f.removed_vertex, f.removed_successors);
                for edge in f.removed_edges {
                    h.restore_hyperedge(edge);
                }
                for (u, successors) in f.prior_successors {
                    h.replace_successors(u, successors);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Pick a uniformly random element of a slice.
fn choose<T: Copy, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len())).copied()
}

/// Edge creation `•—• → •—•—•` with causal thickening.
///
/// Chooses a hyperedge uniformly (restricted to those containing `anchor`
/// when given), creates one vertex with a random charge, links every edge
/// member causally to it, links each vertex in the members' causal past
/// with probability [`THICKENING_PROBABILITY`], and adds the extended
/// hyperedge.
///
/// # Errors
///
/// [`RuleRejection::NoHyperedges`] on an edgeless graph and
/// [`RuleRejection::AnchorNotFound`] when no hyperedge contains `anchor`.
pub fn edge_creation_rule<R: Rng + ?Sized>(
    h: &mut Hypergraph,
    anchor: Option<VertexId>,
    rng: &mut R,
) -> RuleOutcome {
    if h.edge_count() == 0 {
        return Err(RuleRejection::NoHyperedges);
    }

    let candidates: Vec<EdgeId> = match anchor {
        Some(a) => h
            .hyperedges()
            .filter(|e| e.contains(a))
            .map(|e| e.id)
            .collect(),
        None => h.edge_ids(),
    };
    let Some(source_edge) = choose(&candidates, rng) else {
        return Err(anchor.map_or(RuleRejection::NoHyperedges, RuleRejection::AnchorNotFound));
    };
    let parents: Vec<VertexId> = h
        .hyperedge(source_edge)
        .map(|e| e.vertices().to_vec())
        .ok_or(GraphError::EdgeNotFound(source_edge))?;

    let charge = if rng.random::<bool>() {
        Charge::Positive
    } else {
        Charge::Negative
    };
    let new_vertex = h.add_charged_vertex(charge);

    let mut undo = CreationUndo {
        anchor,
        source_edge,
        parents: parents.clone(),
        added_vertices: vec![new_vertex],
        added_edges: Vec::new(),
        added_relations: Vec::new(),
    };

    if let Err(err) = extend_edge(h, &parents, new_vertex, &mut undo, rng) {
        warn!(error = %err, edge = %source_edge, "edge creation failed, reverting");
        UndoRecord::Creation(undo).revert(h);
        return Err(err.into());
    }

    Ok(UndoRecord::Creation(undo))
}

/// Causal links, thickening and the extended hyperedge for edge creation.
fn extend_edge<R: Rng + ?Sized>(
    h: &mut Hypergraph,
    parents: &[VertexId],
    new_vertex: VertexId,
    undo: &mut CreationUndo,
    rng: &mut R,
) -> Result<(), GraphError> {
    for &v in parents {
        if h.add_causal_relation(v, new_vertex)? {
            undo.added_relations.push((v, new_vertex));
        }
    }

    for &v in parents {
        for u in h.causal_past(v) {
            if rng.random::<f64>() < THICKENING_PROBABILITY && h.add_causal_relation(u, new_vertex)? {
                undo.added_relations.push((u, new_vertex));
            }
        }
    }

    let mut extended = parents.to_vec();
    extended.push(new_vertex);
    let edge = h.add_hyperedge(extended)?;
    undo.added_edges.push(edge);
    Ok(())
}

/// Vertex fusion `•—•—• → •═•`.
///
/// Chooses a hyperedge uniformly, keeps its first vertex and merges its
/// second vertex into it: every causal reference to the removed vertex is
/// redirected to the kept one, every hyperedge containing the removed
/// vertex is deleted, then the vertex itself.
///
/// # Errors
///
/// [`RuleRejection::TooFewVertices`] below three vertices,
/// [`RuleRejection::TooFewHyperedges`] on an edgeless graph,
/// [`RuleRejection::EdgeTooSmall`] when the chosen edge has fewer than three
/// vertices, and [`RuleRejection::WouldEliminateAllHyperedges`] when every
/// hyperedge contains the vertex to remove.
pub fn vertex_fusion_rule<R: Rng + ?Sized>(h: &mut Hypergraph, rng: &mut R) -> RuleOutcome {
    let count = h.vertex_count();
    if count < 3 {
        return Err(RuleRejection::TooFewVertices { count });
    }
    let edges = h.edge_ids();
    let Some(edge_id) = choose(&edges, rng) else {
        return Err(RuleRejection::TooFewHyperedges);
    };
    let members = h
        .hyperedge(edge_id)
        .map(|e| e.vertices().to_vec())
        .ok_or(GraphError::EdgeNotFound(edge_id))?;

    let (Some(&kept), Some(&remove)) = (members.first(), members.get(1)) else {
        return Err(RuleRejection::EdgeTooSmall {
            edge: edge_id,
            len: members.len(),
        });
    };
    if members.len() < 3 || kept == remove {
        return Err(RuleRejection::EdgeTooSmall {
            edge: edge_id,
            len: members.len(),
        });
    }

    if h.hyperedges().all(|e| e.contains(remove)) {
        return Err(RuleRejection::WouldEliminateAllHyperedges);
    }

    // Redirect successor references before the vertex disappears.
    let referencing: Vec<VertexId> = h
        .vertex_ids()
        .into_iter()
        .filter(|&u| u != remove && h.is_causally_related(u, remove))
        .collect();
    let mut prior_successors = Vec::with_capacity(referencing.len());
    for u in referencing {
        let Some(prior) = h.successors(u).cloned() else {
            continue;
        };
        let mut redirected = prior.clone();
        redirected.remove(&remove);
        redirected.insert(kept);
        h.replace_successors(u, redirected);
        prior_successors.push((u, prior));
    }

    let doomed: Vec<EdgeId> = h
        .hyperedges()
        .filter(|e| e.contains(remove))
        .map(|e| e.id)
        .collect();
    let removed_edges: Vec<Hyperedge> = doomed
        .into_iter()
        .filter_map(|id| h.take_hyperedge(id))
        .collect();

    let Some((removed_vertex, removed_successors)) = h.take_vertex(remove) else {
        // Unreachable for a live edge member; restore what was touched.
        for edge in removed_edges {
            h.restore_hyperedge(edge);
        }
        for (u, prior) in prior_successors {
            h.replace_successors(u, prior);
        }
        return Err(GraphError::VertexNotFound(remove).into());
    };

    Ok(UndoRecord::Fusion(FusionUndo {
        kept,
        removed_vertex,
        removed_successors,
        removed_edges,
        prior_successors,
    }))
}
