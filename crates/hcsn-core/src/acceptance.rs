//! The multiplicative acceptance model.
//!
//! A proposed rewrite is accepted with probability `prod exp(x_i)`, one
//! factor per [`Factor`]. Each exponent `x_i` is clamped to
//! `±exponent_clamp` before it is used and the product is clamped to
//! `[min_accept_probability, 1]`, so no combination of inputs can overflow,
//! underflow to zero or exceed one.

use serde::Serialize;

use crate::config::AcceptanceConfig;

/// Population above which the coordination stiffness saturates.
const SATURATION_POPULATION: usize = 300;

/// Saturated coordination stiffness.
const SATURATED_STIFFNESS: f64 = 0.6;

/// Margin above the coordination target where the hard cap engages.
const COORDINATION_CAP_MARGIN: f64 = 0.8;

/// Population scale of the defect-suppression decay.
const DEFECT_POPULATION_SCALE: f64 = 800.0;

/// One term of the acceptance product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Hard penalty once average coordination overshoots the target.
    CoordinationCap,
    /// Quadratic pull towards the target coordination.
    CoordinationTarget,
    /// Penalty on a shrinking longest causal chain.
    CausalInertia,
    /// Penalty on rising interaction concentration.
    HubSuppression,
    /// Reward for rising closure density.
    ClosureReward,
    /// Reward for rising Ω.
    HierarchyReward,
    /// Penalty on defect-sized Ω jumps.
    DefectSuppression,
    /// Age-based penalty on Ω jumps shortly after the previous defect.
    OmegaInertia,
    /// Penalty on members leaving their ξ-cluster.
    Cohesion,
    /// Reward for touched ξ vertices that keep a ξ neighbour.
    Binding,
    /// Penalty when the ξ-support loses its coordination advantage.
    Confinement,
    /// Penalty on large touched clusters.
    Mass,
    /// Penalty on ξ centroid drift.
    Localization,
    /// Reward for retained remembered ξ–ξ links.
    LinkMemory,
    /// Penalty on newly exposed ξ vertices.
    SurfaceTension,
}

/// Structural change caused by the tentative rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StructuralDeltas {
    /// Live vertex count after the rewrite.
    pub vertex_count: usize,
    /// Average coordination after the rewrite.
    pub avg_coordination: f64,
    /// Change of the longest causal chain.
    pub delta_depth: f64,
    /// Change of interaction concentration.
    pub delta_concentration: f64,
    /// Change of closure density.
    pub delta_closure: f64,
    /// Change of hierarchical closure Ω.
    pub delta_omega: f64,
}

/// ξ-dependent quantities. The default is neutral for every factor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldTerms {
    /// Members lost by pre-existing clusters.
    pub cohesion_loss: f64,
    /// Fraction of touched ξ vertices that still have a ξ neighbour.
    pub binding_fraction: Option<f64>,
    /// Change of (interior − exterior) Ω potential.
    pub confinement_shift: Option<f64>,
    /// Capped quadratic size excess of touched clusters.
    pub mass_load: f64,
    /// Absolute shift of the ξ-weighted depth centroid.
    pub centroid_drift: Option<f64>,
    /// Retained minus lost remembered link strength.
    pub link_balance: f64,
    /// Change in the number of ξ vertices with fewer than two ξ neighbours.
    pub exposure_shift: f64,
}

/// The assembled acceptance probability with its clamped exponents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acceptance {
    /// Final probability in `[min_accept_probability, 1]`.
    pub probability: f64,
    /// Every non-zero clamped exponent, in evaluation order.
    pub exponents: Vec<(Factor, f64)>,
}

impl Acceptance {
    /// Clamped exponent of one factor (0.0 when it did not fire).
    pub fn exponent(&self, factor: Factor) -> f64 {
        self.exponents
            .iter()
            .find(|(f, _)| *f == factor)
            .map_or(0.0, |&(_, x)| x)
    }
}

/// Coordination stiffness `λ_k`: grows with population and saturates.
#[allow(clippy::cast_precision_loss)]
pub fn coordination_stiffness(vertex_count: usize) -> f64 {
    if vertex_count < SATURATION_POPULATION {
        let v = vertex_count as f64;
        0.2 * (1.0 - (-v / 200.0).exp())
    } else {
        SATURATED_STIFFNESS
    }
}

/// Defect suppression strength: `gamma_defect · e^{−V/800}`.
#[allow(clippy::cast_precision_loss)]
pub fn defect_suppression(gamma_defect: f64, vertex_count: usize) -> f64 {
    gamma_defect * (-(vertex_count as f64) / DEFECT_POPULATION_SCALE).exp()
}

fn clamp_exponent(x: f64, bound: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(-bound, bound)
}

/// Assemble the acceptance probability.
///
/// `defect_age` is the number of steps since the latest defect when the
/// Ω-gradient inertia applies to this step, `None` otherwise.
pub fn assemble(
    config: &AcceptanceConfig,
    s: &StructuralDeltas,
    f: &FieldTerms,
    defect_age: Option<u64>,
) -> Acceptance {
    let mut raw: Vec<(Factor, f64)> = Vec::with_capacity(16);
    let k_excess = s.avg_coordination - config.k_target;

    if s.avg_coordination > config.k_target + COORDINATION_CAP_MARGIN {
        raw.push((Factor::CoordinationCap, -0.5 * k_excess.powi(2)));
    }
    raw.push((
        Factor::CoordinationTarget,
        -coordination_stiffness(s.vertex_count) * k_excess.powi(2),
    ));
    if s.delta_depth < 0.0 {
        raw.push((Factor::CausalInertia, config.gamma_time * s.delta_depth));
    }
    if s.delta_concentration > 0.0 {
        raw.push((Factor::HubSuppression, -config.gamma_ext * s.delta_concentration));
    }
    if s.delta_closure > 0.0 {
        raw.push((Factor::ClosureReward, config.gamma_closure * s.delta_closure));
    }
    if s.delta_omega > 0.0 {
        raw.push((Factor::HierarchyReward, config.gamma_hier * s.delta_omega));
    }
    if s.delta_omega.abs() > config.epsilon_label_violation {
        let strength = defect_suppression(config.gamma_defect, s.vertex_count);
        raw.push((Factor::DefectSuppression, -strength * s.delta_omega.abs()));
    }
    if let Some(age) = defect_age {
        #[allow(clippy::cast_precision_loss)]
        let age = age as f64;
        raw.push((Factor::OmegaInertia, -config.inertia_scale / (age + 1.0)));
    }

    raw.push((Factor::Cohesion, -config.gamma_cohesion * f.cohesion_loss));
    if let Some(fraction) = f.binding_fraction {
        raw.push((Factor::Binding, config.gamma_binding * fraction));
    }
    if let Some(shift) = f.confinement_shift.filter(|shift| *shift < 0.0) {
        raw.push((Factor::Confinement, config.gamma_confinement * shift));
    }
    raw.push((Factor::Mass, -config.gamma_mass * f.mass_load));
    if let Some(drift) = f.centroid_drift {
        raw.push((Factor::Localization, -config.gamma_localization * drift));
    }
    raw.push((Factor::LinkMemory, config.gamma_link_memory * f.link_balance));
    if f.exposure_shift > 0.0 {
        raw.push((Factor::SurfaceTension, -config.gamma_surface * f.exposure_shift));
    }

    let exponents: Vec<(Factor, f64)> = raw
        .into_iter()
        .map(|(factor, x)| (factor, clamp_exponent(x, config.exponent_clamp)))
        .filter(|(_, x)| *x != 0.0)
        .collect();

    let product = exponents.iter().map(|(_, x)| x.exp()).product::<f64>();
    let probability = if product.is_finite() {
        product.clamp(config.min_accept_probability, 1.0)
    } else {
        config.min_accept_probability
    };

    Acceptance {
        probability,
        exponents,
    }
}
