//! The ξ influence field and its evolution strategies.
//!
//! [`XiField`] stores a finite, strictly positive value per vertex; anything
//! else is simply absent. How the field moves on a committed step is a
//! [`FieldEvolution`] strategy: [`DiffusiveField`] is the canonical
//! decay-and-share dynamics, [`FrozenField`] leaves ξ untouched and turns
//! the engine into the ξ-less baseline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use hcsn_graph::{Hypergraph, InteractionGraph};
use hcsn_types::VertexId;

use crate::cluster::xi_clusters;
use crate::config::FieldConfig;

/// Non-negative scalar field over vertices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct XiField {
    values: BTreeMap<VertexId, f64>,
}

impl XiField {
    /// Create an empty field.
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Value at `v` (0.0 when absent).
    pub fn get(&self, v: VertexId) -> f64 {
        self.values.get(&v).copied().unwrap_or(0.0)
    }

    /// Store `value` at `v`. Non-finite or non-positive values remove `v`.
    pub fn set(&mut self, v: VertexId, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.values.insert(v, value);
        } else {
            self.values.remove(&v);
        }
    }

    /// Add `delta` to the value at `v`, flooring the result at zero.
    pub fn add(&mut self, v: VertexId, delta: f64) {
        self.set(v, self.get(v) + delta);
    }

    /// Remove `v`, returning its value.
    pub fn remove(&mut self, v: VertexId) -> Option<f64> {
        self.values.remove(&v)
    }

    /// Vertices with ξ strictly above `threshold`.
    pub fn support(&self, threshold: f64) -> BTreeSet<VertexId> {
        self.values
            .iter()
            .filter(|&(_, &value)| value > threshold)
            .map(|(&v, _)| v)
            .collect()
    }

    /// Every vertex carrying any ξ.
    pub fn halo(&self) -> BTreeSet<VertexId> {
        self.values.keys().copied().collect()
    }

    /// Iterate `(vertex, value)` in ascending vertex order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, f64)> + '_ {
        self.values.iter().map(|(&v, &value)| (v, value))
    }

    /// Number of vertices carrying ξ.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no vertex carries ξ.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the underlying map.
    pub const fn as_map(&self) -> &BTreeMap<VertexId, f64> {
        &self.values
    }

    /// Total ξ.
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Drop values below `floor`.
    pub fn prune(&mut self, floor: f64) {
        self.values.retain(|_, value| *value >= floor);
    }

    /// Drop values on vertices that are no longer live.
    pub fn retain_live(&mut self, h: &Hypergraph) {
        self.values.retain(|v, _| h.contains_vertex(*v));
    }

    /// ξ-weighted mean depth of the live support, `None` without support.
    pub fn centroid_depth(&self, h: &Hypergraph, threshold: f64) -> Option<f64> {
        let (weighted, total) = self
            .values
            .iter()
            .filter(|&(_, &value)| value > threshold)
            .filter_map(|(&v, &value)| h.depth(v).map(|d| (f64::from(d), value)))
            .fold((0.0, 0.0), |(w, t), (depth, value)| {
                (depth.mul_add(value, w), t + value)
            });
        (total > 0.0).then(|| weighted / total)
    }
}

/// How ξ reacts to a committed rewrite.
pub trait FieldEvolution: fmt::Debug {
    /// Seed ξ on vertices created by a rewrite from the parents that shaped
    /// them.
    fn inherit(
        &self,
        xi: &mut XiField,
        parents: &[VertexId],
        children: &[VertexId],
        config: &FieldConfig,
    );

    /// Advance the field by one committed step over the current interaction
    /// graph.
    fn evolve(&self, xi: &mut XiField, graph: &InteractionGraph, config: &FieldConfig);
}

/// Decay, share with same-cluster neighbours, optionally erode boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffusiveField;

impl FieldEvolution for DiffusiveField {
    fn inherit(
        &self,
        xi: &mut XiField,
        parents: &[VertexId],
        children: &[VertexId],
        config: &FieldConfig,
    ) {
        let carried: Vec<f64> = parents
            .iter()
            .map(|&p| xi.get(p))
            .filter(|&value| value > config.xi_threshold)
            .collect();
        if carried.is_empty() {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = carried.iter().sum::<f64>() / carried.len() as f64;
        for &child in children {
            xi.add(child, config.inherit_fraction * mean);
        }
    }

    fn evolve(&self, xi: &mut XiField, graph: &InteractionGraph, config: &FieldConfig) {
        propagate(xi, graph, config);
        if config.boundary_erosion > 0.0 {
            erode_boundary(xi, graph, config);
        }
    }
}

/// Leaves ξ untouched: no inheritance, no decay, no sharing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenField;

impl FieldEvolution for FrozenField {
    fn inherit(&self, _: &mut XiField, _: &[VertexId], _: &[VertexId], _: &FieldConfig) {}

    fn evolve(&self, _: &mut XiField, _: &InteractionGraph, _: &FieldConfig) {}
}

/// One decay-and-share pass.
///
/// Every value decays by `xi_decay`. A support vertex keeps `1 - xi_coupling`
/// of its decayed value and splits the rest evenly among interaction-graph
/// neighbours in its own cluster; with no such neighbour it keeps it all.
/// Sub-threshold values only decay.
pub fn propagate(xi: &mut XiField, graph: &InteractionGraph, config: &FieldConfig) {
    let clusters = xi_clusters(graph, &xi.support(config.xi_threshold));
    let mut next: BTreeMap<VertexId, f64> = BTreeMap::new();

    for (v, value) in xi.iter() {
        let decayed = value * config.xi_decay;
        let partners: Vec<VertexId> = match clusters.cluster_of(v) {
            Some(own) => graph
                .neighbors(v)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&n| clusters.cluster_of(n) == Some(own))
                .collect(),
            None => Vec::new(),
        };

        if partners.is_empty() {
            *next.entry(v).or_insert(0.0) += decayed;
            continue;
        }
        *next.entry(v).or_insert(0.0) += decayed * (1.0 - config.xi_coupling);
        #[allow(clippy::cast_precision_loss)]
        let share = decayed * config.xi_coupling / partners.len() as f64;
        for n in partners {
            *next.entry(n).or_insert(0.0) += share;
        }
    }

    let mut evolved = XiField::new();
    for (v, value) in next {
        evolved.set(v, value);
    }
    evolved.prune(config.xi_floor);
    *xi = evolved;
}

/// Subtract `boundary_erosion` from support vertices with a neighbour
/// outside the support, flooring at zero.
pub fn erode_boundary(xi: &mut XiField, graph: &InteractionGraph, config: &FieldConfig) {
    let support = xi.support(config.xi_threshold);
    let boundary: Vec<VertexId> = support
        .iter()
        .copied()
        .filter(|&v| {
            graph
                .neighbors(v)
                .is_some_and(|nbrs| nbrs.iter().any(|n| !support.contains(n)))
        })
        .collect();
    for v in boundary {
        xi.add(v, -config.boundary_erosion);
    }
    xi.prune(config.xi_floor);
}
