//! Stateless measurements over a hypergraph and its interaction graph.
//!
//! The central order parameter is the hierarchical closure Ω: the minimum
//! closure density seen while repeatedly coarse-graining the interaction
//! graph. Everything here is pure except the interval samplers, which draw
//! from a caller-supplied RNG.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use hcsn_types::VertexId;

use crate::adjacency::{Adjacency, InteractionGraph};
use crate::hypergraph::{Charge, Hypergraph};

/// Depth fraction above which vertices count as deep worldlines.
pub const DEFAULT_INTERACTION_FRACTION: f64 = 0.6;

/// Coarse-graining scales used for Ω.
pub const DEFAULT_CLOSURE_SCALES: [usize; 3] = [2, 4, 8];

/// Coarse-graining scales used for the renormalized distance scale.
pub const RENORMALIZATION_SCALES: [usize; 4] = [2, 4, 8, 16];

/// Depth-variance weight of the loop mismatch.
pub const LOOP_MISMATCH_BETA: f64 = 0.05;

/// `num / den` as a float; 0.0 when `den` is zero.
#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        return 0.0;
    }
    num as f64 / den as f64
}

// ---------------------------------------------------------------------------
// Causal intervals
// ---------------------------------------------------------------------------

/// `|J+(u) ∩ J-(v)|`.
pub fn causal_interval_size(h: &Hypergraph, u: VertexId, v: VertexId) -> usize {
    let Some(future) = h.successors(u) else {
        return 0;
    };
    h.causal_past(v).intersection(future).count()
}

/// Draw up to `samples` ordered distinct vertex pairs and keep the interval
/// sizes of causally related pairs that reach `min_interval`.
fn sample_large_intervals<R: Rng + ?Sized>(
    h: &Hypergraph,
    samples: usize,
    min_interval: usize,
    rng: &mut R,
) -> Vec<usize> {
    let ids = h.vertex_ids();
    let n = ids.len();
    if n < 2 {
        return Vec::new();
    }
    let mut sizes = Vec::new();
    for _ in 0..samples {
        let i = rng.random_range(0..n);
        let mut j = rng.random_range(0..n.saturating_sub(1));
        if j >= i {
            j = j.saturating_add(1);
        }
        let (Some(&u), Some(&v)) = (ids.get(i), ids.get(j)) else {
            continue;
        };
        if h.is_causally_related(u, v) {
            let size = causal_interval_size(h, u, v);
            if size >= min_interval {
                sizes.push(size);
            }
        }
    }
    sizes
}

/// Myrheim–Meyer dimension estimate `2 ln N / ln <|I|>` over sampled
/// causal intervals of size at least `min_interval`.
///
/// Returns `None` when unmeasurable: fewer than two vertices, no qualifying
/// sample, a mean interval size of at most one, or a non-finite result.
pub fn myrheim_meyer_dimension<R: Rng + ?Sized>(
    h: &Hypergraph,
    samples: usize,
    min_interval: usize,
    rng: &mut R,
) -> Option<f64> {
    let sizes = sample_large_intervals(h, samples, min_interval, rng);
    if sizes.is_empty() {
        return None;
    }
    let total = sizes.iter().fold(0_usize, |acc, &s| acc.saturating_add(s));
    let mean = ratio(total, sizes.len());
    if mean <= 1.0 {
        return None;
    }
    let n = ratio(h.vertex_count(), 1);
    let dimension = 2.0 * n.ln() / mean.ln();
    dimension.is_finite().then_some(dimension)
}

/// Mean size of sampled causal intervals of at least `min_interval`
/// vertices; 0.0 when none qualify.
pub fn average_large_interval<R: Rng + ?Sized>(
    h: &Hypergraph,
    samples: usize,
    min_interval: usize,
    rng: &mut R,
) -> f64 {
    let sizes = sample_large_intervals(h, samples, min_interval, rng);
    let total = sizes.iter().fold(0_usize, |acc, &s| acc.saturating_add(s));
    ratio(total, sizes.len())
}

// ---------------------------------------------------------------------------
// Interaction graph
// ---------------------------------------------------------------------------

/// Interaction graph among deep worldlines.
///
/// A vertex is deep when `depth >= floor(fraction * max_chain_length)`. Two
/// deep vertices are linked when they share a hyperedge. Only vertices with
/// at least one link appear.
pub fn worldline_interaction_graph(h: &Hypergraph, fraction: f64) -> InteractionGraph {
    let cutoff = (fraction * f64::from(h.max_chain_length())).floor();
    let deep: BTreeSet<VertexId> = h
        .vertices()
        .filter(|v| f64::from(v.depth) >= cutoff)
        .map(|v| v.id)
        .collect();

    let mut graph = InteractionGraph::new();
    for edge in h.hyperedges() {
        let members: Vec<VertexId> = edge
            .vertices()
            .iter()
            .copied()
            .filter(|v| deep.contains(v))
            .collect();
        for (idx, &a) in members.iter().enumerate() {
            for &b in members.iter().skip(idx.saturating_add(1)) {
                graph.add_edge(a, b);
            }
        }
    }
    graph
}

/// `max degree / sum of degrees`; 0.0 for a graph without edges.
pub fn interaction_concentration<N: Ord + Copy>(g: &Adjacency<N>) -> f64 {
    ratio(g.max_degree(), g.degree_sum())
}

/// Closure density `Ψ = triangles / (edges + 1)`.
pub fn closure_density<N: Ord + Copy>(g: &Adjacency<N>) -> f64 {
    ratio(g.triangle_count(), g.edge_count().saturating_add(1))
}

// ---------------------------------------------------------------------------
// Coarse graining and hierarchical closure
// ---------------------------------------------------------------------------

/// A block graph produced by coarse graining, with the effective depth of
/// each block.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseGraph {
    /// Block adjacency; nodes are block indices.
    pub adjacency: Adjacency<usize>,
    /// Mean member depth of every block.
    pub depths: BTreeMap<usize, f64>,
}

/// Group the nodes of `g`, in ascending order, into contiguous blocks of
/// `scale` and link two blocks whenever any of their members were linked.
///
/// Every block is present in the result, isolated or not. A block's depth is
/// the mean of the member depths `depth_of` knows, or 0.0. A scale of zero
/// is treated as one.
pub fn coarse_grain_adjacency<N, F>(g: &Adjacency<N>, depth_of: F, scale: usize) -> CoarseGraph
where
    N: Ord + Copy,
    F: Fn(N) -> Option<f64>,
{
    let scale = scale.max(1);
    let mut block_of = BTreeMap::new();
    let mut depth_sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    let mut adjacency = Adjacency::new();

    for (idx, node) in g.nodes().enumerate() {
        let block = idx.checked_div(scale).unwrap_or(idx);
        block_of.insert(node, block);
        adjacency.ensure_node(block);
        let entry = depth_sums.entry(block).or_insert((0.0, 0));
        if let Some(depth) = depth_of(node) {
            entry.0 += depth;
            entry.1 = entry.1.saturating_add(1);
        }
    }

    for (node, nbrs) in g.iter() {
        let Some(&bu) = block_of.get(&node) else {
            continue;
        };
        for nbr in nbrs {
            if let Some(&bv) = block_of.get(nbr) {
                adjacency.add_edge(bu, bv);
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let depths = depth_sums
        .into_iter()
        .map(|(block, (sum, count))| {
            let mean = if count == 0 { 0.0 } else { sum / count as f64 };
            (block, mean)
        })
        .collect();

    CoarseGraph { adjacency, depths }
}

/// Coarse-grain the interaction graph once, using vertex depths from `h`.
pub fn coarse_grain(h: &Hypergraph, g: &InteractionGraph, scale: usize) -> CoarseGraph {
    coarse_grain_adjacency(g, |v| h.depth(v).map(f64::from), scale)
}

/// Run the chained coarse-graining pipeline: the first stage reads vertex
/// depths from `h`, later stages use the previous stage's block depths.
fn coarse_grain_chain(h: &Hypergraph, g: &InteractionGraph, scales: &[usize]) -> Vec<CoarseGraph> {
    let mut stages: Vec<CoarseGraph> = Vec::with_capacity(scales.len());
    for &scale in scales {
        let next = match stages.last() {
            None => coarse_grain(h, g, scale),
            Some(prev) => coarse_grain_adjacency(
                &prev.adjacency,
                |b| prev.depths.get(&b).copied(),
                scale,
            ),
        };
        stages.push(next);
    }
    stages
}

/// Hierarchical closure Ω: the minimum closure density over the chained
/// coarse-graining stages at `scales`. 0.0 when `scales` is empty.
pub fn hierarchical_closure(h: &Hypergraph, g: &InteractionGraph, scales: &[usize]) -> f64 {
    coarse_grain_chain(h, g, scales)
        .iter()
        .map(|stage| closure_density(&stage.adjacency))
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Ω of the subgraph induced by every node within `radius` hops of `seeds`.
///
/// 0.0 when the neighbourhood has fewer than three nodes.
pub fn local_hierarchical_closure(
    h: &Hypergraph,
    g: &InteractionGraph,
    seeds: &BTreeSet<VertexId>,
    radius: u32,
    scales: &[usize],
) -> f64 {
    let ball = g.ball(seeds, radius);
    if ball.len() < 3 {
        return 0.0;
    }
    hierarchical_closure(h, &g.induced(&ball), scales)
}

// ---------------------------------------------------------------------------
// Auxiliary observables
// ---------------------------------------------------------------------------

/// Number of hyperedges whose members do not all carry the same charge
/// label (uncharged counts as its own label).
pub fn label_frustration(h: &Hypergraph) -> usize {
    h.hyperedges()
        .filter(|edge| {
            let labels: BTreeSet<Option<Charge>> = edge
                .vertices()
                .iter()
                .map(|&v| h.vertex(v).and_then(|vertex| vertex.charge))
                .collect();
            labels.len() > 1
        })
        .count()
}

/// Fraction of frustrated hyperedges; 0.0 without hyperedges.
pub fn defect_density(h: &Hypergraph) -> f64 {
    ratio(label_frustration(h), h.edge_count())
}

/// Per-triangle metric mismatch: `|deg sum - 3 <deg>| * (1 + beta * var(depth))`.
pub fn loop_mismatch_weights<N, F>(g: &Adjacency<N>, depth_of: F, beta: f64) -> Vec<f64>
where
    N: Ord + Copy,
    F: Fn(N) -> f64,
{
    if g.is_empty() {
        return Vec::new();
    }
    let avg_degree = ratio(g.degree_sum(), g.node_count());
    let degree = |n: N| ratio(g.degree(n), 1);

    let mut weights = Vec::new();
    for (u, nbrs_u) in g.iter() {
        for &v in nbrs_u.iter().filter(|&&v| v > u) {
            let Some(nbrs_v) = g.neighbors(v) else {
                continue;
            };
            for &w in nbrs_u.intersection(nbrs_v).filter(|&&w| w > v) {
                let base = (degree(u) + degree(v) + degree(w) - 3.0 * avg_degree).abs();
                let (tu, tv, tw) = (depth_of(u), depth_of(v), depth_of(w));
                let mean = (tu + tv + tw) / 3.0;
                let variance =
                    ((tu - mean).powi(2) + (tv - mean).powi(2) + (tw - mean).powi(2)) / 3.0;
                weights.push(base * beta.mul_add(variance, 1.0));
            }
        }
    }
    weights
}

/// Mean loop mismatch; 0.0 for a triangle-free graph.
pub fn emergent_distance_scale<N, F>(g: &Adjacency<N>, depth_of: F, beta: f64) -> f64
where
    N: Ord + Copy,
    F: Fn(N) -> f64,
{
    let weights = loop_mismatch_weights(g, depth_of, beta);
    if weights.is_empty() {
        return 0.0;
    }
    weights.iter().sum::<f64>() / ratio(weights.len(), 1)
}

/// Emergent distance scale of every chained coarse-graining stage.
pub fn renormalized_distance_scales(
    h: &Hypergraph,
    g: &InteractionGraph,
    beta: f64,
    scales: &[usize],
) -> BTreeMap<usize, f64> {
    scales
        .iter()
        .zip(coarse_grain_chain(h, g, scales))
        .map(|(&scale, stage)| {
            let depths = &stage.depths;
            let value = emergent_distance_scale(
                &stage.adjacency,
                |b| depths.get(&b).copied().unwrap_or(0.0),
                beta,
            );
            (scale, value)
        })
        .collect()
}

/// Ω potential of a vertex set: its mean coordination relative to the
/// global mean coordination.
///
/// `None` when no member has a known coordination or the global mean is
/// zero.
pub fn omega_potential(
    coordination: &BTreeMap<VertexId, usize>,
    vertices: &BTreeSet<VertexId>,
) -> Option<f64> {
    let global_total = coordination
        .values()
        .fold(0_usize, |acc, &k| acc.saturating_add(k));
    let global_mean = ratio(global_total, coordination.len());
    if global_mean <= 0.0 {
        return None;
    }

    let (sum, count) = vertices
        .iter()
        .filter_map(|v| coordination.get(v))
        .fold((0_usize, 0_usize), |(s, c), &k| {
            (s.saturating_add(k), c.saturating_add(1))
        });
    if count == 0 {
        return None;
    }
    Some(ratio(sum, count) / global_mean)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::rules::edge_creation_rule;

    fn make_seed_universe() -> Hypergraph {
        let mut h = Hypergraph::new();
        let a = h.add_vertex();
        let b = h.add_vertex();
        h.add_causal_relation(a, b).unwrap();
        h.add_hyperedge(vec![a, b]).unwrap();
        h
    }

    fn grown(n: usize) -> Hypergraph {
        let mut h = make_seed_universe();
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..n {
            edge_creation_rule(&mut h, None, &mut rng).unwrap();
        }
        h
    }

    fn complete(n: u64) -> InteractionGraph {
        let mut g = InteractionGraph::new();
        for a in 0..n {
            for b in 0..n {
                g.add_edge(VertexId::new(a), VertexId::new(b));
            }
        }
        g
    }

    #[test]
    fn interval_of_chain() {
        let mut h = Hypergraph::new();
        let a = h.add_vertex();
        let b = h.add_vertex();
        let c = h.add_vertex();
        h.add_causal_relation(a, b).unwrap();
        h.add_causal_relation(b, c).unwrap();
        // Successor sets are not transitively closed: J+(a) = {a, b}.
        assert_eq!(causal_interval_size(&h, a, c), 1);
        assert_eq!(causal_interval_size(&h, a, b), 2);
    }

    #[test]
    fn dimension_unmeasurable_on_tiny_graph() {
        let mut h = Hypergraph::new();
        h.add_vertex();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(myrheim_meyer_dimension(&h, 50, 1, &mut rng), None);
        assert!(average_large_interval(&h, 50, 1, &mut rng).abs() < f64::EPSILON);
    }

    #[test]
    fn dimension_unmeasurable_without_large_intervals() {
        let h = make_seed_universe();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(myrheim_meyer_dimension(&h, 100, 10, &mut rng), None);
    }

    #[test]
    fn dimension_is_finite_when_measured() {
        let h = grown(60);
        let mut rng = StdRng::seed_from_u64(4);
        if let Some(d) = myrheim_meyer_dimension(&h, 400, 2, &mut rng) {
            assert!(d.is_finite());
            assert!(d > 0.0);
        }
    }

    #[test]
    fn interaction_graph_links_deep_co_members() {
        let h = make_seed_universe();
        // max depth 2, cutoff floor(1.2) = 1: both vertices are deep.
        let g = worldline_interaction_graph(&h, DEFAULT_INTERACTION_FRACTION);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);

        // With a cutoff of 2 only one vertex is deep and it has no partner.
        let g = worldline_interaction_graph(&h, 1.0);
        assert!(g.is_empty());
    }

    #[test]
    fn concentration_and_closure() {
        let empty = InteractionGraph::new();
        assert!(interaction_concentration(&empty).abs() < f64::EPSILON);
        assert!(closure_density(&empty).abs() < f64::EPSILON);

        let k4 = complete(4);
        // 3 / 12
        assert!((interaction_concentration(&k4) - 0.25).abs() < 1e-12);
        // 4 triangles / (6 + 1)
        assert!((closure_density(&k4) - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn coarse_grain_blocks_and_depths() {
        let mut h = Hypergraph::new();
        let a = h.add_vertex();
        let b = h.add_vertex();
        let c = h.add_vertex();
        let d = h.add_vertex();
        h.add_causal_relation(a, c).unwrap();
        h.add_causal_relation(c, d).unwrap();
        let mut g = InteractionGraph::new();
        g.add_edge(a, b);
        g.add_edge(b, c);
        g.add_edge(c, d);

        let coarse = coarse_grain(&h, &g, 2);
        assert_eq!(coarse.adjacency.node_count(), 2);
        assert!(coarse.adjacency.has_edge(0, 1));
        // Block 0 = {a, b} depths {1, 1}; block 1 = {c, d} depths {2, 3}.
        assert!((coarse.depths[&0] - 1.0).abs() < 1e-12);
        assert!((coarse.depths[&1] - 2.5).abs() < 1e-12);

        let unit = coarse_grain(&h, &g, 0);
        assert_eq!(unit.adjacency.node_count(), 4);
    }

    #[test]
    fn hierarchical_closure_is_minimum_over_stages() {
        let h = Hypergraph::new();
        let g = complete(8);
        // Stage 1: K4 of blocks (4/7); stages 2 and 3: a single block (0).
        let omega = hierarchical_closure(&h, &g, &DEFAULT_CLOSURE_SCALES);
        assert!(omega.abs() < f64::EPSILON);

        let single = hierarchical_closure(&h, &g, &[2]);
        assert!((single - 4.0 / 7.0).abs() < 1e-12);

        assert!(hierarchical_closure(&h, &g, &[]).abs() < f64::EPSILON);
    }

    #[test]
    fn local_closure_needs_three_nodes() {
        let h = Hypergraph::new();
        let mut g = InteractionGraph::new();
        g.add_edge(VertexId::new(0), VertexId::new(1));
        let seeds = BTreeSet::from([VertexId::new(0)]);
        assert!(local_hierarchical_closure(&h, &g, &seeds, 2, &[1]).abs() < f64::EPSILON);

        let k4 = complete(4);
        let local = local_hierarchical_closure(&h, &k4, &seeds, 1, &[1]);
        assert!((local - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn frustration_counts_mixed_edges() {
        let mut h = Hypergraph::new();
        let p = h.add_charged_vertex(Charge::Positive);
        let q = h.add_charged_vertex(Charge::Positive);
        let n = h.add_charged_vertex(Charge::Negative);
        h.add_hyperedge(vec![p, q]).unwrap();
        h.add_hyperedge(vec![p, n]).unwrap();
        assert_eq!(label_frustration(&h), 1);
        assert!((defect_density(&h) - 0.5).abs() < 1e-12);
        assert!(defect_density(&Hypergraph::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn loop_mismatch_on_regular_graph_is_zero() {
        let k4 = complete(4);
        let weights = loop_mismatch_weights(&k4, |_| 1.0, LOOP_MISMATCH_BETA);
        assert_eq!(weights.len(), 4);
        assert!(weights.iter().all(|w| w.abs() < 1e-12));
        assert!(emergent_distance_scale(&k4, |_| 1.0, LOOP_MISMATCH_BETA).abs() < 1e-12);

        let h = grown(30);
        let g = worldline_interaction_graph(&h, DEFAULT_INTERACTION_FRACTION);
        let scales = renormalized_distance_scales(&h, &g, LOOP_MISMATCH_BETA, &RENORMALIZATION_SCALES);
        assert_eq!(scales.len(), 4);
        assert!(scales.values().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn omega_potential_is_relative_to_global_mean() {
        let coordination = BTreeMap::from([
            (VertexId::new(0), 4),
            (VertexId::new(1), 2),
            (VertexId::new(2), 0),
        ]);
        let inner = BTreeSet::from([VertexId::new(0)]);
        // 4 / 2
        assert!((omega_potential(&coordination, &inner).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(omega_potential(&coordination, &BTreeSet::new()), None);
        let idle = BTreeMap::from([(VertexId::new(0), 0)]);
        assert_eq!(omega_potential(&idle, &inner), None);
    }
}
