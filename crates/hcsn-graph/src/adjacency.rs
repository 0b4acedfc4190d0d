//! Undirected simple graphs over ordered node keys.
//!
//! [`Adjacency`] backs both the worldline interaction graph (nodes are
//! [`VertexId`]s) and every coarse-grained block graph (nodes are block
//! indices). Neighbour sets are ordered so traversal order, and anything
//! sampled from it, is deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;

use hcsn_types::VertexId;

/// Interaction graph among deep worldline vertices.
pub type InteractionGraph = Adjacency<VertexId>;

/// Undirected simple graph stored as `node -> neighbour set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency<N: Ord> {
    neighbors: BTreeMap<N, BTreeSet<N>>,
}

impl<N: Ord + Copy> Default for Adjacency<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Ord + Copy> Adjacency<N> {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            neighbors: BTreeMap::new(),
        }
    }

    /// Insert a node without edges (no-op if present).
    pub fn ensure_node(&mut self, node: N) {
        self.neighbors.entry(node).or_default();
    }

    /// Insert the undirected edge `a -- b`.
    ///
    /// Self-loops are ignored. Returns whether the edge is new.
    pub fn add_edge(&mut self, a: N, b: N) -> bool {
        if a == b {
            return false;
        }
        let inserted = self.neighbors.entry(a).or_default().insert(b);
        self.neighbors.entry(b).or_default().insert(a);
        inserted
    }

    /// Neighbour set of `node`, if it is present.
    pub fn neighbors(&self, node: N) -> Option<&BTreeSet<N>> {
        self.neighbors.get(&node)
    }

    /// Whether `node` is present.
    pub fn contains(&self, node: N) -> bool {
        self.neighbors.contains_key(&node)
    }

    /// Whether `a -- b` is an edge.
    pub fn has_edge(&self, a: N, b: N) -> bool {
        self.neighbors.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Degree of `node` (0 when absent).
    pub fn degree(&self, node: N) -> usize {
        self.neighbors.get(&node).map_or(0, BTreeSet::len)
    }

    /// Nodes in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.neighbors.keys().copied()
    }

    /// Iterate `(node, neighbours)` in ascending node order.
    pub fn iter(&self) -> impl Iterator<Item = (N, &BTreeSet<N>)> {
        self.neighbors.iter().map(|(&n, set)| (n, set))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Sum of all degrees (twice the edge count).
    pub fn degree_sum(&self) -> usize {
        self.neighbors
            .values()
            .fold(0_usize, |acc, set| acc.saturating_add(set.len()))
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.degree_sum() / 2
    }

    /// Largest degree (0 for an empty graph).
    pub fn max_degree(&self) -> usize {
        self.neighbors.values().map(BTreeSet::len).max().unwrap_or(0)
    }

    /// Number of triangles, each counted once (`u < v < w`).
    pub fn triangle_count(&self) -> usize {
        let mut triangles = 0_usize;
        for (u, nbrs_u) in &self.neighbors {
            for v in nbrs_u.range((Bound::Excluded(u), Bound::Unbounded)) {
                let Some(nbrs_v) = self.neighbors.get(v) else {
                    continue;
                };
                let closing = nbrs_u
                    .intersection(nbrs_v)
                    .filter(|w| *w > v)
                    .count();
                triangles = triangles.saturating_add(closing);
            }
        }
        triangles
    }

    /// Subgraph induced by `keep`. Kept nodes stay present even if isolated.
    pub fn induced(&self, keep: &BTreeSet<N>) -> Self {
        let neighbors = self
            .neighbors
            .iter()
            .filter(|(n, _)| keep.contains(n))
            .map(|(&n, set)| (n, set.intersection(keep).copied().collect()))
            .collect();
        Self { neighbors }
    }

    /// All nodes within `radius` hops of any present seed (seeds included).
    pub fn ball(&self, seeds: &BTreeSet<N>, radius: u32) -> BTreeSet<N> {
        self.bounded_distances(seeds, radius, |_| true)
            .into_keys()
            .collect()
    }

    /// Multi-source breadth-first search.
    ///
    /// Returns the hop distance of every node reached within `max_depth`
    /// hops from `sources`. Only nodes accepted by `allow` are entered;
    /// sources themselves must be present and allowed to start the search.
    pub fn bounded_distances<F>(
        &self,
        sources: &BTreeSet<N>,
        max_depth: u32,
        allow: F,
    ) -> BTreeMap<N, u32>
    where
        F: Fn(N) -> bool,
    {
        let mut dist = BTreeMap::new();
        let mut queue = VecDeque::new();
        for &s in sources {
            if self.contains(s) && allow(s) && dist.insert(s, 0_u32).is_none() {
                queue.push_back(s);
            }
        }

        while let Some(current) = queue.pop_front() {
            let d = dist.get(&current).copied().unwrap_or(0);
            if d >= max_depth {
                continue;
            }
            let Some(nbrs) = self.neighbors.get(&current) else {
                continue;
            };
            for &next in nbrs {
                if !dist.contains_key(&next) && allow(next) {
                    dist.insert(next, d.saturating_add(1));
                    queue.push_back(next);
                }
            }
        }
        dist
    }
}
