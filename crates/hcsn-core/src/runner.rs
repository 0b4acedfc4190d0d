//! Simulation loop runner.
//!
//! This module provides [`run_simulation`], which drives the engine for a
//! fixed number of steps with a per-step callback, and
//! [`run_until_omega`], which drives it until hierarchical closure Ω lands
//! within a tolerance of a target.

use tracing::{info, warn};

use crate::engine::{RewriteEngine, StepOutcome, StepSummary};

/// Errors that can occur during a goal-conditioned run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerError {
    /// Ω never came within tolerance of the target.
    #[error("omega target {target} not reached after {steps} steps (last omega {last_omega})")]
    TargetNotReached {
        /// The requested Ω.
        target: f64,
        /// Ω after the final step.
        last_omega: f64,
        /// Steps executed.
        steps: u64,
    },
}

/// Result of a bounded run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Steps executed.
    pub steps: u64,
    /// Steps that committed a rewrite.
    pub accepted: u64,
    /// Steps whose rewrite was rolled back.
    pub rejected: u64,
    /// Steps whose rule declined to mutate the graph.
    pub rule_rejections: u64,
    /// Ω after the final step, if any step ran.
    pub final_omega: Option<f64>,
    /// Length of the defect log at the end of the run.
    pub defects: usize,
    /// The last step summary, if any step ran.
    pub final_summary: Option<StepSummary>,
}

impl RunSummary {
    /// Committed steps over executed steps; 0.0 for an empty run.
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_ratio(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.accepted as f64 / self.steps as f64
        }
    }

    /// Fold a later segment of the same run into this summary.
    pub fn absorb(&mut self, later: Self) {
        self.steps = self.steps.saturating_add(later.steps);
        self.accepted = self.accepted.saturating_add(later.accepted);
        self.rejected = self.rejected.saturating_add(later.rejected);
        self.rule_rejections = self.rule_rejections.saturating_add(later.rule_rejections);
        self.defects = later.defects;
        if later.final_summary.is_some() {
            self.final_omega = later.final_omega;
            self.final_summary = later.final_summary;
        }
    }
}

/// Callback invoked after each step completes.
///
/// Implementations can use this to sample time series, stream records, and
/// so on. The callback receives the step summary and the engine.
pub trait StepCallback {
    /// Called after a step completes.
    fn on_step(&mut self, summary: &StepSummary, engine: &RewriteEngine);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _summary: &StepSummary, _engine: &RewriteEngine) {}
}

/// Run the engine for `steps` steps.
pub fn run_simulation(
    engine: &mut RewriteEngine,
    steps: u64,
    callback: &mut dyn StepCallback,
) -> RunSummary {
    info!(
        steps,
        start_time = engine.time(),
        vertices = engine.hypergraph().vertex_count(),
        seed = engine.config().engine.seed,
        "Simulation starting"
    );

    let mut summary = RunSummary {
        steps: 0,
        accepted: 0,
        rejected: 0,
        rule_rejections: 0,
        final_omega: None,
        defects: engine.defect_log().len(),
        final_summary: None,
    };

    for _ in 0..steps {
        let step = engine.advance();
        summary.steps = summary.steps.saturating_add(1);
        match step.outcome {
            StepOutcome::Committed => summary.accepted = summary.accepted.saturating_add(1),
            StepOutcome::RolledBack => summary.rejected = summary.rejected.saturating_add(1),
            StepOutcome::RuleRejected => {
                summary.rule_rejections = summary.rule_rejections.saturating_add(1);
            }
        }
        callback.on_step(&step, engine);
        summary.final_omega = Some(step.omega);
        summary.final_summary = Some(step);
    }

    summary.defects = engine.defect_log().len();
    summary
}

/// Step until `|Ω - target| <= tolerance`, at most `max_steps` times.
///
/// Returns the number of steps taken (0 when Ω already matches).
pub fn run_until_omega(
    engine: &mut RewriteEngine,
    target: f64,
    tolerance: f64,
    max_steps: u64,
) -> Result<u64, RunnerError> {
    let within = |omega: f64| (omega - target).abs() <= tolerance;
    let mut omega = engine.measure().omega;
    if within(omega) {
        return Ok(0);
    }

    let mut steps: u64 = 0;
    while steps < max_steps {
        omega = engine.advance().omega;
        steps = steps.saturating_add(1);
        if within(omega) {
            info!(target, omega, steps, "Omega target reached");
            return Ok(steps);
        }
    }

    Err(RunnerError::TargetNotReached {
        target,
        last_omega: omega,
        steps,
    })
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        steps = summary.steps,
        accepted = summary.accepted,
        rejected = summary.rejected,
        rule_rejections = summary.rule_rejections,
        acceptance_ratio = summary.acceptance_ratio(),
        final_omega = ?summary.final_omega,
        defects = summary.defects,
        "Simulation ended"
    );

    if let Some(ref last) = summary.final_summary {
        info!(
            time = last.time,
            vertices = last.vertex_count,
            omega = last.omega,
            outcome = ?last.outcome,
            "Final step summary"
        );
    } else {
        warn!("Simulation ended with no steps executed");
    }
}
