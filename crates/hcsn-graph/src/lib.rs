//! Causal hypergraph, rewrite rules and observables for the HCSN simulator.
//!
//! This crate models the discrete substrate: vertices and k-ary hyperedges
//! held in an arena with a reflexive causal-successor relation, the two
//! local rewrite rules that grow and shrink it, and the stateless
//! measurements the rewrite engine uses to accept or reject a step.
//!
//! # Modules
//!
//! - [`adjacency`] -- Undirected simple graphs over ordered keys, used for
//!   the interaction graph and its coarse-grained block graphs.
//! - [`error`] -- Structural errors and rule rejections.
//! - [`hypergraph`] -- The [`Hypergraph`] arena with causal queries and
//!   coordination statistics.
//! - [`observables`] -- Closure density, hierarchical closure Ω, causal
//!   interval estimators and coarse graining.
//! - [`rules`] -- Edge creation and vertex fusion with exact undo records.

pub mod adjacency;
pub mod error;
pub mod hypergraph;
pub mod observables;
pub mod rules;

// Re-export primary types at crate root.
pub use adjacency::{Adjacency, InteractionGraph};
pub use error::{GraphError, RuleRejection};
pub use hypergraph::{Charge, GraphShape, GraphSummary, Hyperedge, Hypergraph, Vertex};
pub use observables::{
    CoarseGraph, DEFAULT_CLOSURE_SCALES, DEFAULT_INTERACTION_FRACTION, closure_density,
    hierarchical_closure, interaction_concentration, omega_potential,
    worldline_interaction_graph,
};
pub use rules::{
    CreationUndo, FusionUndo, RuleOutcome, THICKENING_PROBABILITY, UndoRecord,
    edge_creation_rule, vertex_fusion_rule,
};
