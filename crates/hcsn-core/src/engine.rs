//! The rewrite engine: one discrete-event state machine over a causal
//! hypergraph and its ξ field.
//!
//! Each [`RewriteEngine::step`] runs the same sequence:
//!
//! 1. **Measure** -- reuse the cached interaction graph and Ω of the current
//!    graph, or compute them.
//! 2. **Propose** -- anchored edge creation at a ξ-carrying vertex, free edge
//!    creation, or vertex fusion. A rule that declines leaves everything
//!    untouched and the step counts as rejected.
//! 3. **Re-measure** -- observables of the tentative graph, defect detection.
//! 4. **Accept** -- draw against the clamped acceptance product.
//! 5. **Rollback or commit** -- revert through the undo record, or let ξ
//!    react: inheritance, propagation, reclustering, memories, geometry.
//!
//! Every random draw comes from one seeded `StdRng`, and all state lives in
//! ordered maps, so a run is reproducible from its configuration.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use hcsn_graph::observables::local_hierarchical_closure;
use hcsn_graph::{
    Hypergraph, InteractionGraph, RuleOutcome, UndoRecord, closure_density, edge_creation_rule,
    hierarchical_closure, interaction_concentration, omega_potential, vertex_fusion_rule,
    worldline_interaction_graph,
};
use hcsn_types::{
    ClusterGeometry, ClusterId, ClusterPair, DefectEvent, ProtoObject, RewriteRecord, RuleKind,
    VertexId, VertexPair,
};

use crate::acceptance::{self, Acceptance, FieldTerms, StructuralDeltas};
use crate::cluster::{ClusterMemory, Clusters, xi_clusters};
use crate::config::{ConfigError, EngineConfig, ProposalConfig};
use crate::field::{DiffusiveField, FieldEvolution, XiField};
use crate::geometry::{ClusterGeometryMemory, GeometryTracker};

/// Hop radius of the neighbourhood whose Ω feeds a cluster's Ω memory.
const LOCAL_OMEGA_RADIUS: u32 = 2;

/// Errors that can occur when building an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error("invalid engine config: {source}")]
    Config {
        /// The underlying validation error.
        #[from]
        source: ConfigError,
    },
}

// ---------------------------------------------------------------------------
// Measurements and step summaries
// ---------------------------------------------------------------------------

/// Observables of one graph state.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Interaction graph among deep worldlines.
    pub graph: InteractionGraph,
    /// Hierarchical closure Ω.
    pub omega: f64,
    /// Interaction concentration.
    pub concentration: f64,
    /// Closure density Ψ of the interaction graph.
    pub closure: f64,
    /// Longest causal chain.
    pub max_chain: u32,
    /// Coordination number per live vertex.
    pub coordination: BTreeMap<VertexId, usize>,
    /// Mean coordination number.
    pub avg_coordination: f64,
    /// Live vertex count.
    pub vertex_count: usize,
}

impl Measurement {
    /// Measure `h`.
    pub fn take(h: &Hypergraph, config: &ProposalConfig) -> Self {
        let graph = worldline_interaction_graph(h, config.interaction_fraction);
        Self {
            omega: hierarchical_closure(h, &graph, &config.closure_scales),
            concentration: interaction_concentration(&graph),
            closure: closure_density(&graph),
            max_chain: h.max_chain_length(),
            coordination: h.coordination_counts(),
            avg_coordination: h.average_coordination(),
            vertex_count: h.vertex_count(),
            graph,
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The rewrite was accepted and committed.
    Committed,
    /// The rewrite was applied, then rejected and reverted.
    RolledBack,
    /// The proposed rule declined to mutate the graph.
    RuleRejected,
}

/// Summary of a single step's execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    /// The step counter value the step ran at.
    pub time: u64,
    /// Which rule was proposed.
    pub rule: RuleKind,
    /// How the step ended.
    pub outcome: StepOutcome,
    /// Acceptance breakdown, when a rewrite was evaluated.
    pub acceptance: Option<Acceptance>,
    /// Ω change of the tentative rewrite (0.0 when none was applied).
    pub delta_omega: f64,
    /// Whether the tentative rewrite was logged as a defect.
    pub defect: bool,
    /// Ω of the graph after the step.
    pub omega: f64,
    /// Live vertex count after the step.
    pub vertex_count: usize,
}

impl StepSummary {
    /// Whether the step committed a rewrite.
    pub const fn accepted(&self) -> bool {
        matches!(self.outcome, StepOutcome::Committed)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The rewrite engine.
#[derive(Debug)]
pub struct RewriteEngine {
    config: EngineConfig,
    graph: Hypergraph,
    xi: XiField,
    /// Observables of `graph` as it currently stands.
    cache: Option<Measurement>,
    memory: ClusterMemory,
    field: Box<dyn FieldEvolution>,
    geometry: Box<dyn GeometryTracker>,
    defects: Vec<DefectEvent>,
    history: Vec<RewriteRecord>,
    time: u64,
    forced_time: Option<u64>,
    /// ξ-weighted depth centroid after the last committed change or
    /// injection.
    centroid: Option<f64>,
    rng: StdRng,
}

impl RewriteEngine {
    /// Engine with diffusive ξ and strided cluster geometry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` fails validation.
    pub fn new(graph: Hypergraph, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_strategies(
            graph,
            config,
            Box::new(DiffusiveField),
            Box::new(ClusterGeometryMemory::new()),
        )
    }

    /// Engine with explicit field-evolution and geometry strategies.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` fails validation.
    pub fn with_strategies(
        graph: Hypergraph,
        config: EngineConfig,
        field: Box<dyn FieldEvolution>,
        geometry: Box<dyn GeometryTracker>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            seed = config.engine.seed,
            vertices = graph.vertex_count(),
            hyperedges = graph.edge_count(),
            ?field,
            "Rewrite engine created"
        );
        let rng = StdRng::seed_from_u64(config.engine.seed);
        Ok(Self {
            config,
            graph,
            xi: XiField::new(),
            cache: None,
            memory: ClusterMemory::new(),
            field,
            geometry,
            defects: Vec::new(),
            history: Vec::new(),
            time: 0,
            forced_time: None,
            centroid: None,
            rng,
        })
    }

    // -------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------

    /// Run one step. Returns whether a rewrite was committed.
    pub fn step(&mut self) -> bool {
        self.advance().accepted()
    }

    /// Run `steps` steps and return how many committed.
    pub fn run(&mut self, steps: u64) -> u64 {
        let mut accepted: u64 = 0;
        for _ in 0..steps {
            if self.step() {
                accepted = accepted.saturating_add(1);
            }
        }
        accepted
    }

    /// Run one step and report what happened.
    pub fn advance(&mut self) -> StepSummary {
        let time = self.time;
        let before = self
            .cache
            .take()
            .unwrap_or_else(|| Measurement::take(&self.graph, &self.config.engine));

        let (rule, proposal) = self.propose();
        let undo = match proposal {
            Ok(undo) => undo,
            Err(rejection) => {
                trace!(time, ?rule, %rejection, "Rule rejected");
                let summary = StepSummary {
                    time,
                    rule,
                    outcome: StepOutcome::RuleRejected,
                    acceptance: None,
                    delta_omega: 0.0,
                    defect: false,
                    omega: before.omega,
                    vertex_count: before.vertex_count,
                };
                self.cache = Some(before);
                self.finish_step();
                return summary;
            }
        };

        let after = Measurement::take(&self.graph, &self.config.engine);
        let delta_omega = after.omega - before.omega;
        let defect_age = self.defect_age(delta_omega);
        let defect = delta_omega.abs() > self.config.acceptance.epsilon_label_violation;
        if defect {
            debug!(
                time,
                delta_omega,
                omega = after.omega,
                vertices = after.vertex_count,
                "Defect detected"
            );
            self.defects.push(defect_event(time, delta_omega, &after));
        }

        let structural = StructuralDeltas {
            vertex_count: after.vertex_count,
            avg_coordination: after.avg_coordination,
            delta_depth: f64::from(after.max_chain) - f64::from(before.max_chain),
            delta_concentration: after.concentration - before.concentration,
            delta_closure: after.closure - before.closure,
            delta_omega,
        };
        let terms = self.field_terms(&before, &after, &undo);
        let acceptance =
            acceptance::assemble(&self.config.acceptance, &structural, &terms, defect_age);
        let draw = self.rng.random::<f64>();

        let outcome = if draw <= acceptance.probability {
            self.commit(time, &undo, after);
            StepOutcome::Committed
        } else {
            trace!(time, ?rule, p = acceptance.probability, "Rewrite rolled back");
            undo.revert(&mut self.graph);
            self.cache = Some(before);
            StepOutcome::RolledBack
        };

        let summary = StepSummary {
            time,
            rule,
            outcome,
            acceptance: Some(acceptance),
            delta_omega,
            defect,
            omega: self.cache.as_ref().map_or(0.0, |m| m.omega),
            vertex_count: self.graph.vertex_count(),
        };
        self.finish_step();
        summary
    }

    fn propose(&mut self) -> (RuleKind, RuleOutcome) {
        let protected: Vec<VertexId> = self.live_support().into_iter().collect();
        if !protected.is_empty()
            && self.rng.random::<f64>() < self.config.engine.anchor_probability
        {
            let anchor = pick(&protected, &mut self.rng);
            return (
                RuleKind::EdgeCreation,
                edge_creation_rule(&mut self.graph, anchor, &mut self.rng),
            );
        }
        if self.rng.random::<f64>() < self.config.engine.p_create {
            (
                RuleKind::EdgeCreation,
                edge_creation_rule(&mut self.graph, None, &mut self.rng),
            )
        } else {
            (
                RuleKind::VertexFusion,
                vertex_fusion_rule(&mut self.graph, &mut self.rng),
            )
        }
    }

    /// Steps since the latest defect, when the Ω-gradient inertia applies.
    fn defect_age(&self, delta_omega: f64) -> Option<u64> {
        if delta_omega.abs() <= self.config.acceptance.epsilon_label_violation {
            return None;
        }
        let last = self.defects.last()?;
        if self.forced_time.is_some_and(|forced| {
            self.time.saturating_sub(forced) < self.config.acceptance.forced_relax_window
        }) {
            return None;
        }
        Some(self.time.saturating_sub(last.time))
    }

    /// ξ-dependent acceptance inputs for a tentative rewrite. `self.graph`
    /// is in its tentative state, `self.xi` still describes `before`.
    fn field_terms(&self, before: &Measurement, after: &Measurement, undo: &UndoRecord) -> FieldTerms {
        let threshold = self.config.field.xi_threshold;
        let support_before = self.xi.support(threshold);
        let support_after: BTreeSet<VertexId> = support_before
            .iter()
            .copied()
            .filter(|&v| self.graph.contains_vertex(v))
            .collect();
        let clusters_before = xi_clusters(&before.graph, &support_before);
        let clusters_after = xi_clusters(&after.graph, &support_after);
        let touched = undo.touched_vertices();

        let confinement_shift = confinement(before, &support_before)
            .zip(confinement(after, &support_after))
            .map(|(old, new)| new - old);
        let mut tentative = self.xi.clone();
        self.field.inherit(
            &mut tentative,
            &undo.parent_vertices(),
            undo.added_vertices(),
            &self.config.field,
        );
        tentative.retain_live(&self.graph);
        let centroid_drift = self
            .centroid
            .zip(self.localization_centroid(&tentative))
            .map(|(old, new)| (new - old).abs());
        #[allow(clippy::cast_precision_loss)]
        let exposure_shift = exposed(&after.graph, &support_after) as f64
            - exposed(&before.graph, &support_before) as f64;

        FieldTerms {
            cohesion_loss: cohesion_loss(&clusters_before, &clusters_after),
            binding_fraction: binding_fraction(&after.graph, &support_after, &touched),
            confinement_shift,
            mass_load: mass_load(&clusters_after, &touched, self.config.acceptance.mass_cap),
            centroid_drift,
            link_balance: link_balance(self.memory.links(), &after.graph, &touched),
            exposure_shift,
        }
    }

    /// ξ-weighted depth centroid over every vertex carrying ξ above the
    /// floor, so freshly inherited ξ counts before it reaches the support.
    fn localization_centroid(&self, xi: &XiField) -> Option<f64> {
        xi.centroid_depth(&self.graph, self.config.field.xi_floor)
    }

    fn commit(&mut self, time: u64, undo: &UndoRecord, after: Measurement) {
        let parents = undo.parent_vertices();
        self.field
            .inherit(&mut self.xi, &parents, undo.added_vertices(), &self.config.field);
        self.xi.retain_live(&self.graph);
        self.field
            .evolve(&mut self.xi, &after.graph, &self.config.field);

        let support = self.live_support();
        let clusters = xi_clusters(&after.graph, &support);
        let graph = &self.graph;
        let scales = &self.config.engine.closure_scales;
        self.memory.update_omega(
            &clusters,
            |members| {
                local_hierarchical_closure(graph, &after.graph, members, LOCAL_OMEGA_RADIUS, scales)
            },
            self.config.memory.omega_alpha,
        );
        self.memory.update_links(
            &after.graph,
            &support,
            self.config.memory.link_decay,
            self.config.memory.link_floor,
        );
        self.geometry
            .observe(&after.graph, &clusters, &self.xi, &self.config.memory);

        let record = self.rewrite_record(time, undo, &clusters);
        self.history.push(record);
        self.centroid = self.localization_centroid(&self.xi);
        self.cache = Some(after);
    }

    fn finish_step(&mut self) {
        self.time = self.time.saturating_add(1);
        let logging = &self.config.logging;
        if logging.verbose && self.time.checked_rem(logging.print_interval) == Some(0) {
            info!(
                time = self.time,
                vertices = self.graph.vertex_count(),
                hyperedges = self.graph.edge_count(),
                omega = ?self.cached_omega(),
                xi_support = self.live_support().len(),
                defects = self.defects.len(),
                "Progress"
            );
        }
    }

    fn rewrite_record(&self, time: u64, undo: &UndoRecord, clusters: &Clusters) -> RewriteRecord {
        let threshold = self.config.field.xi_threshold;
        let xi_support = undo
            .touched_vertices()
            .into_iter()
            .filter_map(|v| {
                let value = self.xi.get(v);
                (value > threshold).then_some((v, value))
            })
            .collect();
        RewriteRecord {
            time,
            rule: undo.rule(),
            added_vertices: undo.added_vertices().to_vec(),
            removed_vertices: undo.removed_vertices().to_vec(),
            added_edges: undo.added_edges().to_vec(),
            removed_edges: undo.removed_edges(),
            xi_support,
            cluster_ids: clusters.ids(),
            cluster_sizes: clusters.sizes(),
        }
    }

    // -------------------------------------------------------------------
    // Forced injections
    // -------------------------------------------------------------------

    /// Inject the first proto-object.
    ///
    /// Anchors an edge creation at a random vertex that belongs to some
    /// hyperedge and commits it without an acceptance test, then seeds
    /// `magnitude` of ξ on the anchor and half of it on each created
    /// vertex. Returns `false` when there is nothing to anchor at.
    pub fn force_defect(&mut self, magnitude: f64) -> bool {
        let time = self.time;
        let anchors: Vec<VertexId> = self
            .graph
            .hyperedges()
            .flat_map(|edge| edge.vertices().iter().copied())
            .collect::<BTreeSet<VertexId>>()
            .into_iter()
            .collect();
        let Some(anchor) = pick(&anchors, &mut self.rng) else {
            debug!(time, "Forced defect skipped: no hyperedges");
            return false;
        };
        let omega_before = self.measure().omega;
        let undo = match edge_creation_rule(&mut self.graph, Some(anchor), &mut self.rng) {
            Ok(undo) => undo,
            Err(rejection) => {
                warn!(time, %anchor, %rejection, "Forced defect failed");
                return false;
            }
        };

        self.xi.add(anchor, magnitude);
        for &child in undo.added_vertices() {
            self.xi.add(child, magnitude / 2.0);
        }

        let measured = Measurement::take(&self.graph, &self.config.engine);
        let mut event = defect_event(time, measured.omega - omega_before, &measured);
        event.forced = true;
        event.anchor_vertex = Some(anchor);
        event.magnitude = Some(magnitude);
        event.proto_object = Some(ProtoObject::First);
        self.defects.push(event);
        self.forced_time = Some(time);

        let clusters = xi_clusters(&measured.graph, &self.live_support());
        let record = self.rewrite_record(time, &undo, &clusters);
        self.history.push(record);
        self.centroid = self.localization_centroid(&self.xi);
        debug!(time, %anchor, magnitude, omega = measured.omega, "Forced defect injected");
        self.cache = Some(measured);
        true
    }

    /// Inject a second proto-object as far as possible from existing ξ.
    ///
    /// Candidates are interaction-graph vertices outside the live ξ-support.
    /// A breadth-first search bounded by `max_bfs_depth` runs outward from
    /// the support; the farthest candidate at `min_distance` or more wins.
    /// Failing that, a candidate the search never reached (another
    /// component, or beyond the bound) is used, and failing that the
    /// farthest reached one. The anchor is seeded with `xi_seed`. Returns
    /// `false` only when there is no candidate.
    pub fn force_second_proto_object(
        &mut self,
        omega_kick: f64,
        xi_seed: f64,
        min_distance: u32,
    ) -> bool {
        let time = self.time;
        let measured = self.measure().clone();
        let support = self.live_support();
        let candidates: Vec<VertexId> = measured
            .graph
            .nodes()
            .filter(|v| !support.contains(v) && self.graph.contains_vertex(*v))
            .collect();
        let reached =
            measured
                .graph
                .bounded_distances(&support, self.config.memory.max_bfs_depth, |_| true);

        let Some(anchor) = self.second_anchor(&candidates, &reached, min_distance) else {
            debug!(time, "Second proto-object skipped: no candidate vertex");
            return false;
        };
        let distance = reached.get(&anchor).copied();
        if distance.is_some_and(|d| d < min_distance) {
            warn!(
                time,
                %anchor,
                distance = ?distance,
                min_distance,
                "Second proto-object placed closer than requested"
            );
        }

        self.xi.set(anchor, xi_seed);
        let mut event = defect_event(time, 0.0, &measured);
        event.forced = true;
        event.anchor_vertex = Some(anchor);
        event.magnitude = Some(xi_seed);
        event.omega_kick = Some(omega_kick);
        event.proto_object = Some(ProtoObject::Second);
        event.support_distance = distance;
        self.defects.push(event);
        self.forced_time = Some(time);
        self.centroid = self.localization_centroid(&self.xi);
        debug!(time, %anchor, xi_seed, distance = ?distance, "Second proto-object injected");
        true
    }

    /// Farthest candidate at `min_distance` or more, else an unreached
    /// candidate, else the farthest reached one.
    fn second_anchor(
        &mut self,
        candidates: &[VertexId],
        reached: &BTreeMap<VertexId, u32>,
        min_distance: u32,
    ) -> Option<VertexId> {
        let farthest = candidates
            .iter()
            .filter_map(|v| reached.get(v).copied())
            .max();
        let tier: Vec<VertexId> = match farthest {
            Some(d) if d >= min_distance => candidates
                .iter()
                .copied()
                .filter(|v| reached.get(v) == Some(&d))
                .collect(),
            _ => {
                let unreached: Vec<VertexId> = candidates
                    .iter()
                    .copied()
                    .filter(|v| !reached.contains_key(v))
                    .collect();
                if unreached.is_empty() {
                    candidates
                        .iter()
                        .copied()
                        .filter(|v| reached.get(v).copied() == farthest)
                        .collect()
                } else {
                    unreached
                }
            }
        };
        pick(&tier, &mut self.rng)
    }

    // -------------------------------------------------------------------
    // Read-only state
    // -------------------------------------------------------------------

    /// Observables of the current graph, measuring it if not cached.
    pub fn measure(&mut self) -> &Measurement {
        self.cache
            .get_or_insert_with(|| Measurement::take(&self.graph, &self.config.engine))
    }

    /// Both geometry memories restricted to finite entries.
    pub fn export_cluster_geometry(&self) -> ClusterGeometry {
        self.geometry.export()
    }

    /// Partition of the live ξ-support over `graph`.
    pub fn xi_clusters(&self, graph: &InteractionGraph) -> Clusters {
        xi_clusters(graph, &self.live_support())
    }

    /// Live vertices with ξ above the threshold.
    pub fn live_support(&self) -> BTreeSet<VertexId> {
        self.xi
            .support(self.config.field.xi_threshold)
            .into_iter()
            .filter(|&v| self.graph.contains_vertex(v))
            .collect()
    }

    /// The hypergraph.
    pub const fn hypergraph(&self) -> &Hypergraph {
        &self.graph
    }

    /// The ξ field.
    pub const fn xi(&self) -> &XiField {
        &self.xi
    }

    /// Every detected or forced defect, oldest first.
    pub fn defect_log(&self) -> &[DefectEvent] {
        &self.defects
    }

    /// Every committed rewrite, oldest first.
    pub fn rewrite_history(&self) -> &[RewriteRecord] {
        &self.history
    }

    /// Smoothed topological distance per cluster pair.
    pub fn topo_distance_memory(&self) -> &BTreeMap<ClusterPair, f64> {
        self.geometry.topo()
    }

    /// Smoothed ξ distance per cluster pair.
    pub fn xi_distance_memory(&self) -> &BTreeMap<ClusterPair, f64> {
        self.geometry.xi()
    }

    /// Smoothed Ω per live cluster.
    pub const fn cluster_omega_memory(&self) -> &BTreeMap<ClusterId, f64> {
        self.memory.omega()
    }

    /// ξ–ξ link strengths.
    pub const fn link_memory(&self) -> &BTreeMap<VertexPair, f64> {
        self.memory.links()
    }

    /// Step counter.
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Step of the latest forced injection.
    pub const fn forced_time(&self) -> Option<u64> {
        self.forced_time
    }

    /// Ω of the current graph, if measured.
    pub fn cached_omega(&self) -> Option<f64> {
        self.cache.as_ref().map(|m| m.omega)
    }

    /// Interaction graph of the current graph, if measured.
    pub fn cached_interaction_graph(&self) -> Option<&InteractionGraph> {
        self.cache.as_ref().map(|m| &m.graph)
    }

    /// The validated configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pick<R: Rng + ?Sized>(items: &[VertexId], rng: &mut R) -> Option<VertexId> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len())).copied()
}

fn defect_event(time: u64, delta_omega: f64, m: &Measurement) -> DefectEvent {
    DefectEvent {
        time,
        delta_omega,
        vertex_count: m.vertex_count,
        depth: m.max_chain,
        omega: m.omega,
        coordination: m.avg_coordination,
        forced: false,
        anchor_vertex: None,
        magnitude: None,
        omega_kick: None,
        proto_object: None,
        support_distance: None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Members each old cluster lost relative to its best-matching successor.
#[allow(clippy::cast_precision_loss)]
fn cohesion_loss(before: &Clusters, after: &Clusters) -> f64 {
    let lost = before
        .iter()
        .map(|(_, members)| {
            let mut overlap: BTreeMap<ClusterId, usize> = BTreeMap::new();
            for &v in members {
                if let Some(id) = after.cluster_of(v) {
                    let count = overlap.entry(id).or_insert(0);
                    *count = count.saturating_add(1);
                }
            }
            let kept = overlap.values().copied().max().unwrap_or(0);
            members.len().saturating_sub(kept)
        })
        .fold(0_usize, usize::saturating_add);
    lost as f64
}

/// Share of touched support vertices with at least one support neighbour.
fn binding_fraction(
    graph: &InteractionGraph,
    support: &BTreeSet<VertexId>,
    touched: &BTreeSet<VertexId>,
) -> Option<f64> {
    let candidates: Vec<VertexId> = touched.intersection(support).copied().collect();
    if candidates.is_empty() {
        return None;
    }
    let bound = candidates
        .iter()
        .filter(|&&v| {
            graph
                .neighbors(v)
                .is_some_and(|nbrs| nbrs.iter().any(|n| support.contains(n)))
        })
        .count();
    Some(fraction(bound, candidates.len()))
}

/// Ω potential of the support minus that of its neighbour shell.
fn confinement(m: &Measurement, support: &BTreeSet<VertexId>) -> Option<f64> {
    if support.is_empty() {
        return None;
    }
    let inside = omega_potential(&m.coordination, support)?;
    let shell: BTreeSet<VertexId> = support
        .iter()
        .filter_map(|&v| m.graph.neighbors(v))
        .flatten()
        .copied()
        .filter(|v| !support.contains(v))
        .collect();
    let outside = omega_potential(&m.coordination, &shell).unwrap_or(1.0);
    Some(inside - outside)
}

/// Capped `(size - 1)^2` summed over clusters containing a touched vertex.
#[allow(clippy::cast_precision_loss)]
fn mass_load(clusters: &Clusters, touched: &BTreeSet<VertexId>, cap: f64) -> f64 {
    clusters
        .iter()
        .filter(|(_, members)| !members.is_disjoint(touched))
        .map(|(_, members)| {
            let excess = members.len().saturating_sub(1) as f64;
            excess.powi(2).min(cap)
        })
        .sum()
}

/// Remembered strength of touched links that survive, minus those that break.
fn link_balance(
    links: &BTreeMap<VertexPair, f64>,
    graph: &InteractionGraph,
    touched: &BTreeSet<VertexId>,
) -> f64 {
    links
        .iter()
        .filter(|(pair, _)| touched.contains(&pair.low()) || touched.contains(&pair.high()))
        .map(|(pair, &strength)| {
            if graph.has_edge(pair.low(), pair.high()) {
                strength
            } else {
                -strength
            }
        })
        .sum()
}

/// Support vertices with fewer than two support neighbours.
fn exposed(graph: &InteractionGraph, support: &BTreeSet<VertexId>) -> usize {
    support
        .iter()
        .filter(|&&v| {
            graph
                .neighbors(v)
                .map_or(0, |nbrs| nbrs.iter().filter(|n| support.contains(n)).count())
                < 2
        })
        .count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::field::FrozenField;
    use crate::geometry::NoGeometry;

    fn vid(raw: u64) -> VertexId {
        VertexId::new(raw)
    }

    fn engine() -> RewriteEngine {
        RewriteEngine::new(Hypergraph::seed_universe(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.acceptance.k_target = -1.0;
        let result = RewriteEngine::new(Hypergraph::seed_universe(), config);
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn rule_rejection_only_advances_time() {
        let mut h = Hypergraph::new();
        h.add_vertex();
        let shape = h.shape();
        let mut engine = RewriteEngine::new(h, EngineConfig::default()).unwrap();

        let summary = engine.advance();
        assert_eq!(summary.outcome, StepOutcome::RuleRejected);
        assert!(summary.acceptance.is_none());
        assert_eq!(engine.time(), 1);
        assert_eq!(engine.hypergraph().shape(), shape);
        assert!(engine.rewrite_history().is_empty());
        assert!(engine.defect_log().is_empty());
    }

    #[test]
    fn force_defect_needs_a_hyperedge() {
        let mut h = Hypergraph::new();
        h.add_vertex();
        h.add_vertex();
        let mut engine = RewriteEngine::new(h, EngineConfig::default()).unwrap();
        assert!(!engine.force_defect(0.3));
        assert!(engine.defect_log().is_empty());
        assert!(engine.xi().is_empty());
    }

    #[test]
    fn force_defect_seeds_xi_and_logs() {
        let mut engine = engine();
        assert!(engine.force_defect(0.3));

        let event = engine.defect_log().last().unwrap();
        assert!(event.forced);
        assert_eq!(event.time, 0);
        assert_eq!(event.proto_object, Some(ProtoObject::First));
        assert_eq!(event.magnitude, Some(0.3));
        let anchor = event.anchor_vertex.unwrap();
        assert!((engine.xi().get(anchor) - 0.3).abs() < 1e-12);

        let record = engine.rewrite_history().last().unwrap();
        assert_eq!(record.rule, RuleKind::EdgeCreation);
        let &[child] = record.added_vertices.as_slice() else {
            panic!("one created vertex expected");
        };
        assert!((engine.xi().get(child) - 0.15).abs() < 1e-12);
        assert_eq!(engine.hypergraph().vertex_count(), 3);
        assert_eq!(engine.forced_time(), Some(0));
        assert!(engine.cached_omega().is_some());
        // Injection does not consume a step.
        assert_eq!(engine.time(), 0);
    }

    #[test]
    fn second_object_avoids_existing_support() {
        let mut engine = engine();
        assert!(engine.force_defect(1.0));
        let first: BTreeSet<VertexId> = engine.live_support();

        assert!(engine.force_second_proto_object(0.3, 1.0, 10));
        let event = engine.defect_log().last().unwrap();
        assert!(event.is_second_object());
        assert_eq!(event.omega_kick, Some(0.3));
        assert!(event.delta_omega.abs() < f64::EPSILON);
        let anchor = event.anchor_vertex.unwrap();
        assert!(!first.contains(&anchor));
        assert!(engine.cached_interaction_graph().unwrap().contains(anchor));
        assert!((engine.xi().get(anchor) - 1.0).abs() < f64::EPSILON);
    }

    /// Worldline `v0 -> .. -> v5` with one hyperedge per link, plus an
    /// isolated vertex. Only `v2..=v5` are deep enough for the interaction
    /// graph, which is then the path `v2 - v3 - v4 - v5`.
    fn worldline_engine() -> (RewriteEngine, Vec<VertexId>, VertexId) {
        let mut h = Hypergraph::new();
        let chain: Vec<VertexId> = (0..6).map(|_| h.add_vertex()).collect();
        for pair in chain.windows(2) {
            h.add_causal_relation(pair[0], pair[1]).unwrap();
            h.add_hyperedge(vec![pair[0], pair[1]]).unwrap();
        }
        let isolated = h.add_vertex();
        let engine = RewriteEngine::new(h, EngineConfig::default()).unwrap();
        (engine, chain, isolated)
    }

    #[test]
    fn second_object_goes_to_the_far_end_of_the_graph() {
        let (mut engine, chain, isolated) = worldline_engine();
        engine.xi.set(chain[2], 1.0);

        assert!(engine.force_second_proto_object(0.3, 1.0, 3));
        let event = engine.defect_log().last().unwrap();
        assert_eq!(event.anchor_vertex, Some(chain[5]));
        assert_eq!(event.support_distance, Some(3));
        assert!(engine.xi().get(isolated).abs() < f64::EPSILON);
    }

    #[test]
    fn second_object_falls_back_to_farthest_reached() {
        let (mut engine, chain, _) = worldline_engine();
        engine.xi.set(chain[2], 1.0);

        assert!(engine.force_second_proto_object(0.3, 1.0, 5));
        let event = engine.defect_log().last().unwrap();
        assert_eq!(event.anchor_vertex, Some(chain[5]));
        assert_eq!(event.support_distance, Some(3));
    }

    #[test]
    fn second_object_ignores_vertices_outside_the_graph() {
        let (mut engine, chain, isolated) = worldline_engine();
        for &v in &chain[2..] {
            engine.xi.set(v, 1.0);
        }
        // Every interaction-graph vertex already carries support; the
        // shallow and isolated vertices are not candidates.
        assert!(!engine.force_second_proto_object(0.3, 1.0, 3));
        assert!(engine.xi().get(isolated).abs() < f64::EPSILON);
        assert!(engine.defect_log().is_empty());
    }

    #[test]
    fn second_object_without_support_uses_any_graph_vertex() {
        let (mut engine, chain, _) = worldline_engine();
        assert!(engine.force_second_proto_object(0.3, 1.0, 3));
        let event = engine.defect_log().last().unwrap();
        let anchor = event.anchor_vertex.unwrap();
        assert!(chain[2..].contains(&anchor));
        assert_eq!(event.support_distance, None);
    }

    #[test]
    fn inherited_xi_moves_the_localization_centroid() {
        let mut engine = engine();
        assert!(engine.force_defect(0.3));
        let anchor = engine.defect_log().last().unwrap().anchor_vertex.unwrap();
        let before = engine.measure().clone();

        let undo = edge_creation_rule(&mut engine.graph, Some(anchor), &mut engine.rng).unwrap();
        let after = Measurement::take(&engine.graph, &engine.config.engine);
        let terms = engine.field_terms(&before, &after, &undo);
        let drift = terms.centroid_drift.unwrap();
        assert!(drift > 0.0, "inherited ξ on a deeper vertex shifts the centroid");
        undo.revert(&mut engine.graph);
    }

    #[test]
    fn second_object_without_candidates_fails() {
        let mut engine = RewriteEngine::new(Hypergraph::new(), EngineConfig::default()).unwrap();
        assert!(!engine.force_second_proto_object(0.3, 1.0, 10));
        assert!(engine.defect_log().is_empty());
    }

    #[test]
    fn rolled_back_steps_restore_the_graph() {
        let mut engine = engine();
        for _ in 0..300 {
            let shape = engine.hypergraph().shape();
            let summary = engine.advance();
            if summary.outcome != StepOutcome::Committed {
                assert_eq!(engine.hypergraph().shape(), shape);
            }
        }
        assert_eq!(engine.time(), 300);
    }

    #[test]
    fn same_seed_same_run() {
        let mut a = engine();
        let mut b = engine();
        let ra: Vec<bool> = (0..200).map(|_| a.step()).collect();
        let rb: Vec<bool> = (0..200).map(|_| b.step()).collect();
        assert_eq!(ra, rb);
        assert_eq!(a.hypergraph().shape(), b.hypergraph().shape());
        assert_eq!(a.rewrite_history(), b.rewrite_history());
    }

    #[test]
    fn frozen_strategies_keep_injected_xi() {
        let mut engine = RewriteEngine::with_strategies(
            Hypergraph::seed_universe(),
            EngineConfig::default(),
            Box::new(FrozenField),
            Box::new(NoGeometry::default()),
        )
        .unwrap();
        assert!(engine.force_defect(0.5));
        let anchor = engine.defect_log().last().unwrap().anchor_vertex.unwrap();
        engine.run(50);
        // Fusion may merge the anchor away; otherwise its ξ is untouched.
        if engine.hypergraph().contains_vertex(anchor) {
            assert!((engine.xi().get(anchor) - 0.5).abs() < 1e-12);
        }
        assert!(engine.export_cluster_geometry().is_empty());
    }

    #[test]
    fn cohesion_counts_members_leaving_their_cluster() {
        let mut g = InteractionGraph::new();
        g.add_edge(vid(1), vid(2));
        g.add_edge(vid(2), vid(3));
        let support = BTreeSet::from([vid(1), vid(2), vid(3)]);
        let before = xi_clusters(&g, &support);

        let mut split = InteractionGraph::new();
        split.add_edge(vid(1), vid(2));
        split.ensure_node(vid(3));
        let after = xi_clusters(&split, &support);
        assert!((cohesion_loss(&before, &after) - 1.0).abs() < f64::EPSILON);
        assert!(cohesion_loss(&before, &before).abs() < f64::EPSILON);
    }

    #[test]
    fn exposure_and_binding() {
        let mut g = InteractionGraph::new();
        g.add_edge(vid(1), vid(2));
        g.add_edge(vid(2), vid(3));
        g.add_edge(vid(3), vid(1));
        g.add_edge(vid(3), vid(4));
        let support = BTreeSet::from([vid(1), vid(2), vid(3), vid(9)]);
        // 9 is isolated; the triangle is fully bound.
        assert_eq!(exposed(&g, &support), 1);
        let touched = BTreeSet::from([vid(1), vid(9), vid(4)]);
        assert_eq!(binding_fraction(&g, &support, &touched), Some(0.5));
        assert_eq!(binding_fraction(&g, &support, &BTreeSet::from([vid(4)])), None);
    }

    #[test]
    fn link_balance_rewards_surviving_links() {
        let mut g = InteractionGraph::new();
        g.add_edge(vid(1), vid(2));
        let links = BTreeMap::from([
            (VertexPair::new(vid(1), vid(2)), 0.5),
            (VertexPair::new(vid(1), vid(3)), 0.2),
            (VertexPair::new(vid(7), vid(8)), 0.9),
        ]);
        let touched = BTreeSet::from([vid(1)]);
        assert!((link_balance(&links, &g, &touched) - 0.3).abs() < 1e-12);
    }
}
