//! Error types for the `hcsn-graph` crate.
//!
//! Structural operations on a [`Hypergraph`] return [`GraphError`]. Rewrite
//! rules never raise for expected degenerate situations; they report a
//! [`RuleRejection`] instead, which the engine treats as an unconditional
//! rejection of the proposed step.
//!
//! [`Hypergraph`]: crate::hypergraph::Hypergraph

use hcsn_types::{EdgeId, VertexId};

/// Errors that can occur during hypergraph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A vertex was not found among the live vertices.
    #[error("vertex not found: {0}")]
    VertexNotFound(VertexId),

    /// A hyperedge was not found among the live hyperedges.
    #[error("hyperedge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// A hyperedge must relate at least two vertices.
    #[error("hyperedge needs at least 2 vertices, got {len}")]
    EdgeTooSmall {
        /// Number of vertices supplied.
        len: usize,
    },
}

/// Why a rewrite rule declined to mutate the graph.
///
/// Every variant leaves the hypergraph untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleRejection {
    /// The graph has no hyperedges to rewrite.
    #[error("no hyperedges to rewrite")]
    NoHyperedges,

    /// No hyperedge contains the requested anchor vertex.
    #[error("no hyperedge contains anchor vertex {0}")]
    AnchorNotFound(VertexId),

    /// Fusion needs at least three vertices.
    #[error("too few vertices for fusion: {count}")]
    TooFewVertices {
        /// Live vertex count.
        count: usize,
    },

    /// Fusion needs at least one hyperedge.
    #[error("too few hyperedges for fusion")]
    TooFewHyperedges,

    /// The selected hyperedge is too small for fusion.
    #[error("hyperedge {edge} has {len} vertices, fusion needs 3")]
    EdgeTooSmall {
        /// The selected hyperedge.
        edge: EdgeId,
        /// Its vertex count.
        len: usize,
    },

    /// Fusion would leave the graph without any hyperedge.
    #[error("fusion would eliminate every hyperedge")]
    WouldEliminateAllHyperedges,

    /// A structural operation failed mid-rule; the partial mutation was reverted.
    #[error("graph error during rewrite: {source}")]
    Graph {
        /// The underlying graph error.
        #[from]
        source: GraphError,
    },
}
