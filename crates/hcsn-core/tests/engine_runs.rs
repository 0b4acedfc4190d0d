//! Whole-run tests for the rewrite engine.
//!
//! Every run starts from the two-vertex seed universe with a fixed seed, so
//! each test replays the same trajectory on every invocation.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc,
    clippy::float_cmp
)]

use std::collections::BTreeSet;

use hcsn_core::acceptance::{Acceptance, Factor};
use hcsn_core::config::EngineConfig;
use hcsn_core::engine::{RewriteEngine, StepOutcome};
use hcsn_core::export::write_json_lines;
use hcsn_core::runner::{NoOpCallback, run_simulation};
use hcsn_graph::Hypergraph;
use hcsn_types::{DefectEvent, ProtoObject, RewriteRecord, VertexId};

fn seeded(seed: u64) -> RewriteEngine {
    let mut config = EngineConfig::default();
    config.engine.seed = seed;
    RewriteEngine::new(Hypergraph::seed_universe(), config).unwrap()
}

/// Structural and field invariants that must hold between steps.
fn assert_invariants(engine: &RewriteEngine) {
    let h = engine.hypergraph();
    for v in h.vertex_ids() {
        assert!(h.is_causally_related(v, v), "vertex {v} lost reflexivity");
        assert!(h.depth(v).unwrap() >= 1);
    }
    for edge in h.hyperedges() {
        assert!(edge.len() >= 2);
        for &v in edge.vertices() {
            assert!(h.contains_vertex(v), "edge {} references dead {v}", edge.id);
        }
    }
    for (v, value) in engine.xi().iter() {
        assert!(value.is_finite() && value >= 0.0);
        assert!(h.contains_vertex(v), "ξ on dead vertex {v}");
    }

    let support = engine.live_support();
    if let Some(graph) = engine.cached_interaction_graph() {
        let clusters = engine.xi_clusters(graph);
        let covered: BTreeSet<VertexId> = clusters
            .iter()
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        assert_eq!(covered, support);
        let total: usize = clusters.sizes().values().sum();
        assert_eq!(total, support.len());
    }
}

#[test]
fn universe_evolves() {
    let mut engine = seeded(0);
    engine.run(500);
    assert!(engine.hypergraph().vertex_count() > 2);
    assert_eq!(engine.time(), 500);
}

#[test]
fn coordination_remains_bounded() {
    let mut engine = seeded(1);
    engine.run(1000);
    assert!(engine.hypergraph().average_coordination() < 15.0);
}

#[test]
fn invariants_hold_through_injected_run() {
    let mut engine = seeded(1);
    for t in 0..400_u64 {
        if t == 100 {
            assert!(engine.force_defect(0.3));
        }
        if t == 200 {
            assert!(engine.force_second_proto_object(0.3, 1.0, 10));
        }
        engine.step();
        if t % 25 == 0 {
            assert_invariants(&engine);
        }
    }
    assert_invariants(&engine);

    let forced: Vec<&DefectEvent> = engine.defect_log().iter().filter(|d| d.forced).collect();
    assert_eq!(forced.len(), 2);
    assert_eq!(forced[0].time, 100);
    assert_eq!(forced[0].proto_object, Some(ProtoObject::First));
    assert_eq!(forced[1].time, 200);
    assert!(forced[1].is_second_object());

    for pair in engine.defect_log().windows(2) {
        assert!(pair[0].time <= pair[1].time, "defect log out of order");
    }
    for (_, &d) in engine.export_cluster_geometry().topo.iter() {
        assert!(d.is_finite() && d >= 0.0);
    }
}

#[test]
fn same_seed_replays_identically() {
    let trace = |seed: u64| {
        let mut engine = seeded(seed);
        let mut omegas = Vec::new();
        for t in 0..300_u64 {
            if t == 50 {
                engine.force_defect(0.3);
            }
            omegas.push(engine.advance().omega);
        }
        (
            omegas,
            engine.defect_log().len(),
            engine.rewrite_history().to_vec(),
            engine.hypergraph().shape(),
        )
    };
    let (omega_a, defects_a, history_a, shape_a) = trace(7);
    let (omega_b, defects_b, history_b, shape_b) = trace(7);
    assert_eq!(omega_a, omega_b);
    assert_eq!(defects_a, defects_b);
    assert_eq!(history_a, history_b);
    assert_eq!(shape_a, shape_b);
}

#[test]
fn rejected_steps_leave_no_trace() {
    let mut engine = seeded(3);
    for _ in 0..400 {
        let shape = engine.hypergraph().shape();
        let xi = engine.xi().clone();
        let history = engine.rewrite_history().len();
        let summary = engine.advance();
        if summary.outcome != StepOutcome::Committed {
            assert_eq!(engine.hypergraph().shape(), shape);
            assert_eq!(engine.xi(), &xi);
            assert_eq!(engine.rewrite_history().len(), history);
        }
    }
}

#[test]
fn forced_defect_on_edgeless_graph() {
    let mut h = Hypergraph::new();
    for _ in 0..3 {
        h.add_vertex();
    }
    let mut engine = RewriteEngine::new(h, EngineConfig::default()).unwrap();
    assert!(!engine.force_defect(0.3));
    assert!(engine.defect_log().is_empty());
    assert!(engine.forced_time().is_none());

    // Neither rule can act on an edgeless graph.
    assert!(!engine.step());
    assert_eq!(engine.time(), 1);
    assert_eq!(engine.hypergraph().vertex_count(), 3);
}

#[test]
fn omega_inertia_relaxes_after_injection() {
    let mut config = EngineConfig::default();
    config.acceptance.forced_relax_window = 1000;
    let mut engine = RewriteEngine::new(Hypergraph::seed_universe(), config).unwrap();
    engine.run(100);
    assert!(engine.force_defect(0.3));
    for _ in 0..300 {
        let summary = engine.advance();
        if let Some(acceptance) = summary.acceptance {
            assert_eq!(acceptance.exponent(Factor::OmegaInertia), 0.0);
            assert!(acceptance.probability > 0.0 && acceptance.probability <= 1.0);
        }
    }
}

/// Per-step acceptance breakdowns over the first `steps` steps after a
/// forced defect, keeping only steps that started with live ξ-support.
fn supported_breakdowns(seed: u64, steps: usize) -> Vec<Acceptance> {
    let mut engine = seeded(seed);
    engine.run(200);
    assert!(engine.force_defect(0.3));
    let mut seen = Vec::new();
    for _ in 0..steps {
        let supported = !engine.live_support().is_empty();
        let summary = engine.advance();
        if let (true, Some(acceptance)) = (supported, summary.acceptance) {
            seen.push(acceptance);
        }
    }
    seen
}

#[test]
fn localization_penalizes_inherited_drift() {
    for seed in 0..4 {
        let seen = supported_breakdowns(seed, 150);
        assert!(!seen.is_empty(), "seed {seed}: ξ-support never evaluated");
        let localization: Vec<f64> = seen
            .iter()
            .map(|a| a.exponent(Factor::Localization))
            .collect();
        assert!(localization.iter().all(|&x| x <= 0.0));
        assert!(
            localization.iter().any(|&x| x < 0.0),
            "seed {seed}: centroid never drifted"
        );
    }
}

#[test]
fn field_factors_keep_their_sign() {
    let mut active = BTreeSet::new();
    for seed in 0..4 {
        for acceptance in supported_breakdowns(seed, 150) {
            for factor in [
                Factor::Cohesion,
                Factor::Confinement,
                Factor::Mass,
                Factor::Localization,
                Factor::SurfaceTension,
            ] {
                let x = acceptance.exponent(factor);
                assert!(x <= 0.0, "seed {seed}: {factor:?} rewarded with {x}");
                if x < 0.0 {
                    active.insert(factor);
                }
            }
            let binding = acceptance.exponent(Factor::Binding);
            assert!(binding >= 0.0);
            if binding > 0.0 {
                active.insert(Factor::Binding);
            }
        }
    }
    active.remove(&Factor::Localization);
    assert!(
        !active.is_empty(),
        "no cluster-level factor ever fired under ξ-support"
    );
}

#[test]
fn second_object_lands_on_the_interaction_graph() {
    let min_distance = 3;
    let max_depth = EngineConfig::default().memory.max_bfs_depth;
    for seed in 0..10 {
        let mut engine = seeded(seed);
        engine.run(200);
        assert!(engine.force_defect(0.3));
        engine.run(5);

        let support = engine.live_support();
        let graph = engine.measure().graph.clone();
        let reached = graph.bounded_distances(&support, max_depth, |_| true);
        let far = graph
            .nodes()
            .filter(|v| !support.contains(v))
            .filter_map(|v| reached.get(&v).copied())
            .max()
            .filter(|&d| d >= min_distance);

        if !engine.force_second_proto_object(0.3, 1.0, min_distance) {
            assert!(graph.nodes().all(|v| support.contains(&v)));
            continue;
        }
        let event = engine.defect_log().last().unwrap();
        let anchor = event.anchor_vertex.unwrap();
        assert!(graph.contains(anchor), "seed {seed}: anchor {anchor} off the graph");
        assert!(!support.contains(&anchor));
        assert_eq!(event.omega_kick, Some(0.3));
        assert_eq!(event.delta_omega, 0.0);
        assert_eq!(event.support_distance, reached.get(&anchor).copied());
        if let Some(d) = far {
            assert_eq!(event.support_distance, Some(d), "seed {seed}");
        }
    }
}

#[test]
fn committed_rewrites_are_recorded() {
    let mut engine = seeded(1);
    let summary = run_simulation(&mut engine, 200, &mut NoOpCallback);
    assert_eq!(
        u64::try_from(engine.rewrite_history().len()).unwrap(),
        summary.accepted
    );
    for record in engine.rewrite_history() {
        assert!(record.time < 200);
        let sized: usize = record.cluster_sizes.values().sum();
        assert!(sized >= record.cluster_ids.len());
    }
}

#[test]
fn logs_export_as_json_lines() {
    let mut engine = seeded(1);
    engine.force_defect(0.3);
    engine.run(150);

    let mut defects = Vec::new();
    let written = write_json_lines(&mut defects, engine.defect_log()).unwrap();
    assert_eq!(written, engine.defect_log().len());
    let text = String::from_utf8(defects).unwrap();
    assert_eq!(text.lines().count(), written);
    let first: DefectEvent = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert!(first.forced);

    let mut history = Vec::new();
    write_json_lines(&mut history, engine.rewrite_history()).unwrap();
    let restored: Vec<RewriteRecord> = String::from_utf8(history)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(restored.len(), engine.rewrite_history().len());
    for (a, b) in restored.iter().zip(engine.rewrite_history()) {
        assert_eq!(a.time, b.time);
        assert_eq!(a.rule, b.rule);
        assert_eq!(a.added_vertices, b.added_vertices);
        assert_eq!(a.cluster_ids, b.cluster_ids);
    }
}

#[test]
fn config_loaded_from_yaml_drives_engine() {
    let config = EngineConfig::parse(
        r"
engine:
  seed: 11
  p_create: 1.0
field:
  boundary_erosion: 0.01
",
    )
    .unwrap();
    let mut engine = RewriteEngine::new(Hypergraph::seed_universe(), config).unwrap();
    engine.run(50);
    assert!(
        engine
            .rewrite_history()
            .iter()
            .all(|r| r.removed_vertices.is_empty()),
        "p_create = 1 never proposes fusion"
    );
}
