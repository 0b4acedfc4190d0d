//! Forced-injection schedule for a driver run.
//!
//! The engine's callbacks only see it read-only, so injections are applied
//! between run segments: the run is cut at every scheduled step, the
//! injection is applied, and the segments are folded into one summary.

use hcsn_core::config::RunConfig;
use hcsn_core::engine::RewriteEngine;
use hcsn_core::runner::{RunSummary, StepCallback, run_simulation};
use tracing::{info, warn};

/// One forced injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Injection {
    /// Seed the first proto-object.
    FirstObject {
        /// ξ placed on the anchor.
        magnitude: f64,
    },
    /// Seed a second proto-object far from existing ξ.
    SecondObject {
        /// ΔΩ recorded for the injection.
        omega_kick: f64,
        /// ξ placed on the chosen vertex.
        xi_seed: f64,
        /// Desired hop distance from existing ξ.
        min_distance: u32,
    },
}

impl Injection {
    fn apply(self, engine: &mut RewriteEngine) -> bool {
        match self {
            Self::FirstObject { magnitude } => engine.force_defect(magnitude),
            Self::SecondObject {
                omega_kick,
                xi_seed,
                min_distance,
            } => engine.force_second_proto_object(omega_kick, xi_seed, min_distance),
        }
    }
}

/// Injections keyed by the step (relative to the run start) before which
/// they are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    events: Vec<(u64, Injection)>,
}

impl Schedule {
    /// Build the schedule from the `run` config section.
    pub fn from_config(run: &RunConfig) -> Self {
        let mut schedule = Self::default();
        if let Some(at) = run.force_defect_at {
            schedule.push(
                at,
                Injection::FirstObject {
                    magnitude: run.force_magnitude,
                },
            );
        }
        if let Some(at) = run.second_object_at {
            schedule.push(
                at,
                Injection::SecondObject {
                    omega_kick: run.second_omega_kick,
                    xi_seed: run.second_xi_seed,
                    min_distance: run.second_min_distance,
                },
            );
        }
        schedule
    }

    /// Add an injection; same-step injections keep insertion order.
    pub fn push(&mut self, at: u64, injection: Injection) {
        let idx = self.events.partition_point(|&(t, _)| t <= at);
        self.events.insert(idx, (at, injection));
    }

    /// Scheduled injections in application order.
    pub fn events(&self) -> &[(u64, Injection)] {
        &self.events
    }

    /// Run `steps` steps, applying every injection scheduled before the end.
    pub fn run(
        &self,
        engine: &mut RewriteEngine,
        steps: u64,
        callback: &mut dyn StepCallback,
    ) -> RunSummary {
        let start = engine.time();
        let end = start.saturating_add(steps);
        let mut summary = RunSummary::default();

        for &(at, injection) in &self.events {
            let due = start.saturating_add(at);
            if due >= end {
                warn!(at, steps, ?injection, "Injection scheduled past the end of the run");
                continue;
            }
            let gap = due.saturating_sub(engine.time());
            summary.absorb(run_simulation(engine, gap, callback));
            if injection.apply(engine) {
                info!(time = engine.time(), ?injection, "Injection applied");
            } else {
                warn!(time = engine.time(), ?injection, "Injection had no effect");
            }
        }

        let remaining = end.saturating_sub(engine.time());
        summary.absorb(run_simulation(engine, remaining, callback));
        summary.defects = engine.defect_log().len();
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hcsn_core::config::EngineConfig;
    use hcsn_core::runner::NoOpCallback;
    use hcsn_graph::Hypergraph;
    use hcsn_types::ProtoObject;

    use super::*;

    #[test]
    fn schedule_orders_injections() {
        let run = RunConfig {
            force_defect_at: Some(300),
            second_object_at: Some(100),
            ..RunConfig::default()
        };
        let schedule = Schedule::from_config(&run);
        let steps: Vec<u64> = schedule.events().iter().map(|&(t, _)| t).collect();
        assert_eq!(steps, vec![100, 300]);
        assert!(Schedule::from_config(&RunConfig::default()).events().is_empty());
    }

    #[test]
    fn injections_land_at_their_steps() {
        let mut engine =
            RewriteEngine::new(Hypergraph::seed_universe(), EngineConfig::default()).unwrap();
        let mut schedule = Schedule::default();
        schedule.push(20, Injection::FirstObject { magnitude: 0.3 });
        schedule.push(
            40,
            Injection::SecondObject {
                omega_kick: 0.3,
                xi_seed: 1.0,
                min_distance: 10,
            },
        );
        schedule.push(500, Injection::FirstObject { magnitude: 0.3 });

        let summary = schedule.run(&mut engine, 60, &mut NoOpCallback);
        assert_eq!(summary.steps, 60);
        assert_eq!(engine.time(), 60);

        let forced: Vec<(u64, Option<ProtoObject>)> = engine
            .defect_log()
            .iter()
            .filter(|d| d.forced)
            .map(|d| (d.time, d.proto_object))
            .collect();
        assert_eq!(
            forced,
            vec![(20, Some(ProtoObject::First)), (40, Some(ProtoObject::Second))]
        );
    }
}
