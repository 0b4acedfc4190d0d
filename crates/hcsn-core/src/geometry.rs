//! Inter-cluster distance memories.
//!
//! [`ClusterGeometryMemory`] keeps two smoothed hop distances per cluster
//! pair: through the whole interaction graph (`topo`) and through vertices
//! carrying any ξ (`xi`). Updates run every `geometry_stride` commits with a
//! depth-bounded search, so the memories lag the graph between updates.
//! Pairs not reached within the bound are stored as infinite and left out
//! of the export.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use hcsn_graph::InteractionGraph;
use hcsn_types::{ClusterGeometry, ClusterPair, VertexId};

use crate::cluster::Clusters;
use crate::config::MemoryConfig;
use crate::field::XiField;

/// Tracks geometry between ξ-clusters across committed steps.
pub trait GeometryTracker: fmt::Debug {
    /// Called once per committed step with the post-commit state.
    fn observe(
        &mut self,
        graph: &InteractionGraph,
        clusters: &Clusters,
        xi: &XiField,
        config: &MemoryConfig,
    );

    /// Smoothed hop distance through the full interaction graph.
    fn topo(&self) -> &BTreeMap<ClusterPair, f64>;

    /// Smoothed hop distance through ξ-carrying vertices.
    fn xi(&self) -> &BTreeMap<ClusterPair, f64>;

    /// Both memories restricted to finite entries.
    fn export(&self) -> ClusterGeometry {
        let finite = |map: &BTreeMap<ClusterPair, f64>| -> BTreeMap<ClusterPair, f64> {
            map.iter()
                .filter(|(_, d)| d.is_finite())
                .map(|(&k, &d)| (k, d))
                .collect()
        };
        ClusterGeometry {
            topo: finite(self.topo()),
            xi: finite(self.xi()),
        }
    }
}

/// Canonical strided EMA distance memory.
#[derive(Debug, Clone, Default)]
pub struct ClusterGeometryMemory {
    commits: u64,
    topo: BTreeMap<ClusterPair, f64>,
    xi: BTreeMap<ClusterPair, f64>,
}

impl ClusterGeometryMemory {
    /// Create empty memories.
    pub const fn new() -> Self {
        Self {
            commits: 0,
            topo: BTreeMap::new(),
            xi: BTreeMap::new(),
        }
    }
}

impl GeometryTracker for ClusterGeometryMemory {
    fn observe(
        &mut self,
        graph: &InteractionGraph,
        clusters: &Clusters,
        xi: &XiField,
        config: &MemoryConfig,
    ) {
        self.commits = self.commits.saturating_add(1);
        if self.commits.checked_rem(config.geometry_stride).unwrap_or(0) != 0 {
            return;
        }

        let halo = xi.halo();
        let topo = pairwise_distances(graph, clusters, config.max_bfs_depth, |_| true);
        let through_xi =
            pairwise_distances(graph, clusters, config.max_bfs_depth, |v| halo.contains(&v));

        merge_distances(&mut self.topo, topo, config.distance_alpha);
        merge_distances(&mut self.xi, through_xi, config.distance_alpha);
    }

    fn topo(&self) -> &BTreeMap<ClusterPair, f64> {
        &self.topo
    }

    fn xi(&self) -> &BTreeMap<ClusterPair, f64> {
        &self.xi
    }
}

/// Tracks nothing; every memory stays empty.
#[derive(Debug, Clone, Default)]
pub struct NoGeometry {
    empty: BTreeMap<ClusterPair, f64>,
}

impl GeometryTracker for NoGeometry {
    fn observe(&mut self, _: &InteractionGraph, _: &Clusters, _: &XiField, _: &MemoryConfig) {}

    fn topo(&self) -> &BTreeMap<ClusterPair, f64> {
        &self.empty
    }

    fn xi(&self) -> &BTreeMap<ClusterPair, f64> {
        &self.empty
    }
}

/// Minimum hop distance between every pair of clusters, `None` when not
/// reached within `max_depth` through nodes accepted by `allow`.
fn pairwise_distances<F>(
    graph: &InteractionGraph,
    clusters: &Clusters,
    max_depth: u32,
    allow: F,
) -> BTreeMap<ClusterPair, Option<u32>>
where
    F: Fn(VertexId) -> bool + Copy,
{
    let ids = clusters.ids();
    let mut result = BTreeMap::new();
    for (idx, &from) in ids.iter().enumerate() {
        let Some(sources) = clusters.members(from) else {
            continue;
        };
        let reached = graph.bounded_distances(sources, max_depth, allow);
        for &to in ids.iter().skip(idx.saturating_add(1)) {
            let nearest = clusters
                .members(to)
                .into_iter()
                .flatten()
                .filter_map(|v| reached.get(v).copied())
                .min();
            result.insert(ClusterPair::new(from, to), nearest);
        }
    }
    result
}

/// Fold fresh distances into a memory and drop pairs of vanished clusters.
fn merge_distances(
    memory: &mut BTreeMap<ClusterPair, f64>,
    fresh: BTreeMap<ClusterPair, Option<u32>>,
    alpha: f64,
) {
    let live: BTreeSet<ClusterPair> = fresh.keys().copied().collect();
    memory.retain(|pair, _| live.contains(pair));
    for (pair, distance) in fresh {
        let entry = memory.entry(pair).or_insert(f64::INFINITY);
        if let Some(d) = distance {
            let d = f64::from(d);
            *entry = if entry.is_finite() {
                alpha.mul_add(*entry, (1.0 - alpha) * d)
            } else {
                d
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use hcsn_types::ClusterId;

    use super::*;
    use crate::cluster::xi_clusters;

    fn vid(raw: u64) -> VertexId {
        VertexId::new(raw)
    }

    /// Path 0-1-2-3-4-5 with ξ on both ends and on 2.
    fn setup() -> (InteractionGraph, XiField, Clusters) {
        let mut g = InteractionGraph::new();
        for i in 0..5 {
            g.add_edge(vid(i), vid(i + 1));
        }
        let mut xi = XiField::new();
        xi.set(vid(0), 1.0);
        xi.set(vid(5), 1.0);
        xi.set(vid(2), 0.01);
        let clusters = xi_clusters(&g, &xi.support(0.05));
        (g, xi, clusters)
    }

    #[test]
    fn updates_only_every_stride() {
        let (g, xi, clusters) = setup();
        let config = MemoryConfig {
            geometry_stride: 3,
            ..MemoryConfig::default()
        };
        let mut memory = ClusterGeometryMemory::new();
        memory.observe(&g, &clusters, &xi, &config);
        memory.observe(&g, &clusters, &xi, &config);
        assert!(memory.topo().is_empty());
        memory.observe(&g, &clusters, &xi, &config);
        let pair = ClusterPair::new(ClusterId::new(0), ClusterId::new(5));
        assert_eq!(memory.topo().get(&pair).copied(), Some(5.0));
    }

    #[test]
    fn xi_distance_needs_a_xi_path() {
        let (g, xi, clusters) = setup();
        let config = MemoryConfig {
            geometry_stride: 1,
            ..MemoryConfig::default()
        };
        let mut memory = ClusterGeometryMemory::new();
        memory.observe(&g, &clusters, &xi, &config);
        let pair = ClusterPair::new(ClusterId::new(0), ClusterId::new(5));
        assert!(memory.xi().get(&pair).is_some_and(|d| d.is_infinite()));

        let exported = memory.export();
        assert!(exported.xi.is_empty());
        assert_eq!(exported.topo.get(&pair).copied(), Some(5.0));
    }

    #[test]
    fn distances_are_smoothed() {
        let mut memory = BTreeMap::new();
        let pair = ClusterPair::new(ClusterId::new(0), ClusterId::new(1));
        merge_distances(&mut memory, BTreeMap::from([(pair, Some(10))]), 0.8);
        merge_distances(&mut memory, BTreeMap::from([(pair, Some(5))]), 0.8);
        assert!((memory[&pair] - 9.0).abs() < 1e-12);
        merge_distances(&mut memory, BTreeMap::new(), 0.8);
        assert!(memory.is_empty());
    }

    #[test]
    fn no_geometry_stays_empty() {
        let (g, xi, clusters) = setup();
        let mut tracker = NoGeometry::default();
        tracker.observe(&g, &clusters, &xi, &MemoryConfig::default());
        assert!(tracker.export().is_empty());
    }
}
