//! Shared type definitions for the HCSN causal hypergraph simulator.
//!
//! This crate is the single source of truth for the identifiers and log
//! records that flow between the graph, the rewrite engine and external
//! analysis tooling.
//!
//! # Modules
//!
//! - [`ids`] -- Integer handles for vertices, hyperedges and clusters, plus
//!   unordered pair keys that serialise as `"a,b"` strings.
//! - [`records`] -- Append-only defect and rewrite records and the exported
//!   cluster geometry.

pub mod ids;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use ids::{ClusterId, ClusterPair, EdgeId, PairKeyError, VertexId, VertexPair};
pub use records::{ClusterGeometry, DefectEvent, ProtoObject, RewriteRecord, RuleKind};
