//! Append-only log records emitted by the rewrite engine.
//!
//! These are the stable, record-oriented shapes consumed by external analysis
//! tooling: one [`DefectEvent`] per detected or forced defect, one
//! [`RewriteRecord`] per committed rewrite, and a [`ClusterGeometry`] snapshot
//! of the inter-cluster distance memories. Field names are part of the
//! interchange format and serialise in `snake_case`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ClusterId, ClusterPair, EdgeId, VertexId};

// ---------------------------------------------------------------------------
// Rule kind
// ---------------------------------------------------------------------------

/// Which rewrite rule produced a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// A new vertex attached to an existing hyperedge (`•—• → •—•—•`).
    EdgeCreation,
    /// Two vertices of a hyperedge merged into one (`•—•—• → •═•`).
    VertexFusion,
}

// ---------------------------------------------------------------------------
// Defect events
// ---------------------------------------------------------------------------

/// Marks which injected proto-object a forced defect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoObject {
    /// The first injected object (`force_defect`).
    First,
    /// The second injected object, placed far from existing ξ-support.
    Second,
}

/// A single defect event: a step where Ω jumped by more than the configured
/// threshold, or an externally forced injection.
///
/// Entries are immutable once appended to the defect log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectEvent {
    /// Step counter at which the event happened.
    pub time: u64,
    /// Measured signed change of hierarchical closure Ω. A second
    /// proto-object leaves the graph untouched, so it records 0.0.
    pub delta_omega: f64,
    /// Number of live vertices after the event.
    pub vertex_count: usize,
    /// Maximum causal chain length after the event.
    pub depth: u32,
    /// Hierarchical closure Ω after the event.
    pub omega: f64,
    /// Average coordination number after the event.
    pub coordination: f64,
    /// Whether the event was injected rather than detected.
    #[serde(default)]
    pub forced: bool,
    /// Vertex at which a forced event was anchored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_vertex: Option<VertexId>,
    /// ξ magnitude seeded by a forced event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    /// Ω kick requested for a second proto-object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_kick: Option<f64>,
    /// Which proto-object a forced event seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto_object: Option<ProtoObject>,
    /// Interaction-graph distance from prior ξ-support, for second objects.
    /// `None` when the anchor was unreachable within the search bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_distance: Option<u32>,
}

impl DefectEvent {
    /// Whether this event seeded the second proto-object.
    pub fn is_second_object(&self) -> bool {
        self.proto_object == Some(ProtoObject::Second)
    }
}

// ---------------------------------------------------------------------------
// Rewrite history
// ---------------------------------------------------------------------------

/// Record of one committed rewrite, with the ξ state around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRecord {
    /// Step counter at which the rewrite was committed.
    pub time: u64,
    /// Which rule produced the rewrite.
    pub rule: RuleKind,
    /// Vertices created by the rewrite.
    pub added_vertices: Vec<VertexId>,
    /// Vertices merged away by the rewrite.
    pub removed_vertices: Vec<VertexId>,
    /// Hyperedges created by the rewrite.
    pub added_edges: Vec<EdgeId>,
    /// Hyperedges deleted by the rewrite.
    pub removed_edges: Vec<EdgeId>,
    /// ξ carried by the touched vertices after the commit (support only).
    pub xi_support: BTreeMap<VertexId, f64>,
    /// Clusters present after the commit.
    pub cluster_ids: Vec<ClusterId>,
    /// Member count of each cluster present after the commit.
    pub cluster_sizes: BTreeMap<ClusterId, usize>,
}

impl RewriteRecord {
    /// Net change in vertex count caused by this rewrite.
    pub fn vertex_delta(&self) -> i64 {
        let added = i64::try_from(self.added_vertices.len()).unwrap_or(i64::MAX);
        let removed = i64::try_from(self.removed_vertices.len()).unwrap_or(i64::MAX);
        added.saturating_sub(removed)
    }
}

// ---------------------------------------------------------------------------
// Cluster geometry
// ---------------------------------------------------------------------------

/// Exported inter-cluster distance memories (finite entries only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterGeometry {
    /// Smoothed hop distance through the full interaction graph.
    pub topo: BTreeMap<ClusterPair, f64>,
    /// Smoothed hop distance through ξ-carrying vertices only.
    pub xi: BTreeMap<ClusterPair, f64>,
}

impl ClusterGeometry {
    /// Whether neither memory holds a finite entry.
    pub fn is_empty(&self) -> bool {
        self.topo.is_empty() && self.xi.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_defect() -> DefectEvent {
        DefectEvent {
            time: 17,
            delta_omega: -0.12,
            vertex_count: 40,
            depth: 9,
            omega: 0.31,
            coordination: 4.5,
            forced: false,
            anchor_vertex: None,
            magnitude: None,
            omega_kick: None,
            proto_object: None,
            support_distance: None,
        }
    }

    #[test]
    fn spontaneous_defect_omits_forced_metadata() {
        let json = serde_json::to_string(&make_defect()).unwrap_or_default();
        assert!(json.contains("\"delta_omega\":-0.12"));
        assert!(json.contains("\"forced\":false"));
        assert!(!json.contains("anchor_vertex"));
        assert!(!json.contains("proto_object"));
        assert!(!json.contains("omega_kick"));
    }

    #[test]
    fn forced_defect_keeps_anchor() {
        let mut event = make_defect();
        event.forced = true;
        event.anchor_vertex = Some(VertexId::new(4));
        event.proto_object = Some(ProtoObject::Second);
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"anchor_vertex\":4"));
        assert!(json.contains("\"proto_object\":\"second\""));
        assert!(event.is_second_object());
    }

    #[test]
    fn rewrite_record_vertex_delta() {
        let record = RewriteRecord {
            time: 3,
            rule: RuleKind::VertexFusion,
            added_vertices: Vec::new(),
            removed_vertices: vec![VertexId::new(2)],
            added_edges: Vec::new(),
            removed_edges: vec![EdgeId::new(0), EdgeId::new(5)],
            xi_support: BTreeMap::new(),
            cluster_ids: Vec::new(),
            cluster_sizes: BTreeMap::new(),
        };
        assert_eq!(record.vertex_delta(), -1);
        let json = serde_json::to_string(&record).unwrap_or_default();
        assert!(json.contains("\"rule\":\"vertex_fusion\""));
    }

    #[test]
    fn geometry_keys_serialize_as_strings() {
        let mut geometry = ClusterGeometry::default();
        assert!(geometry.is_empty());
        geometry
            .topo
            .insert(ClusterPair::new(ClusterId::new(8), ClusterId::new(3)), 4.0);
        let json = serde_json::to_string(&geometry).unwrap_or_default();
        assert_eq!(json, r#"{"topo":{"3,8":4.0},"xi":{}}"#);
    }
}
