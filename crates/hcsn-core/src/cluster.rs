//! ξ-clusters and the per-cluster memories.
//!
//! A cluster is a connected component of the interaction graph restricted
//! to the ξ-support. Support vertices outside the interaction graph form
//! singleton clusters. Clusters are named after their smallest member, so
//! an identity survives as long as its founding vertex does.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use hcsn_graph::InteractionGraph;
use hcsn_types::{ClusterId, VertexId, VertexPair};

/// A partition of the ξ-support into clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clusters {
    members: BTreeMap<ClusterId, BTreeSet<VertexId>>,
    assignment: BTreeMap<VertexId, ClusterId>,
}

impl Clusters {
    /// Cluster containing `v`, if it is in the support.
    pub fn cluster_of(&self, v: VertexId) -> Option<ClusterId> {
        self.assignment.get(&v).copied()
    }

    /// Members of a cluster.
    pub fn members(&self, id: ClusterId) -> Option<&BTreeSet<VertexId>> {
        self.members.get(&id)
    }

    /// Iterate clusters in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &BTreeSet<VertexId>)> {
        self.members.iter().map(|(&id, set)| (id, set))
    }

    /// Cluster ids in ascending order.
    pub fn ids(&self) -> Vec<ClusterId> {
        self.members.keys().copied().collect()
    }

    /// Member count per cluster.
    pub fn sizes(&self) -> BTreeMap<ClusterId, usize> {
        self.members.iter().map(|(&id, set)| (id, set.len())).collect()
    }

    /// The vertex → cluster map.
    pub const fn assignment(&self) -> &BTreeMap<VertexId, ClusterId> {
        &self.assignment
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there are no clusters.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Flood-fill the support over the interaction graph.
pub fn xi_clusters(graph: &InteractionGraph, support: &BTreeSet<VertexId>) -> Clusters {
    let mut clusters = Clusters::default();
    for &founder in support {
        if clusters.assignment.contains_key(&founder) {
            continue;
        }
        let id = ClusterId::from(founder);
        let mut component: BTreeSet<VertexId> = graph
            .bounded_distances(&BTreeSet::from([founder]), u32::MAX, |n| {
                support.contains(&n)
            })
            .into_keys()
            .collect();
        component.insert(founder);
        for &v in &component {
            clusters.assignment.insert(v, id);
        }
        clusters.members.insert(id, component);
    }
    clusters
}

/// Smoothed per-cluster Ω and decaying ξ–ξ link strengths.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterMemory {
    omega: BTreeMap<ClusterId, f64>,
    links: BTreeMap<VertexPair, f64>,
}

impl ClusterMemory {
    /// Create empty memories.
    pub const fn new() -> Self {
        Self {
            omega: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Smoothed Ω per live cluster.
    pub const fn omega(&self) -> &BTreeMap<ClusterId, f64> {
        &self.omega
    }

    /// ξ–ξ link strengths.
    pub const fn links(&self) -> &BTreeMap<VertexPair, f64> {
        &self.links
    }

    /// Fold a fresh local Ω measurement into every live cluster's average and
    /// forget clusters that no longer exist.
    pub fn update_omega<F>(&mut self, clusters: &Clusters, local_omega: F, alpha: f64)
    where
        F: Fn(&BTreeSet<VertexId>) -> f64,
    {
        let mut next = BTreeMap::new();
        for (id, members) in clusters.iter() {
            let fresh = local_omega(members);
            let value = self
                .omega
                .get(&id)
                .map_or(fresh, |&old| alpha.mul_add(old, (1.0 - alpha) * fresh));
            next.insert(id, value);
        }
        self.omega = next;
    }

    /// Decay every link, reinforce links between adjacent support vertices
    /// towards 1, and forget links below `floor`.
    pub fn update_links(
        &mut self,
        graph: &InteractionGraph,
        support: &BTreeSet<VertexId>,
        decay: f64,
        floor: f64,
    ) {
        for strength in self.links.values_mut() {
            *strength *= decay;
        }
        for &v in support {
            let Some(nbrs) = graph.neighbors(v) else {
                continue;
            };
            for &n in nbrs.iter().filter(|&&n| n > v && support.contains(&n)) {
                *self.links.entry(VertexPair::new(v, n)).or_insert(0.0) += 1.0 - decay;
            }
        }
        self.links.retain(|_, strength| *strength >= floor);
    }
}
