//! Configuration loading and typed config structures for the HCSN simulator.
//!
//! The canonical configuration lives in `hcsn-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file at all)
//! yields the reference parameter set. [`EngineConfig::validate`] rejects
//! values that would make the acceptance model or the field dynamics
//! ill-defined.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside its admissible range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulator configuration.
///
/// Mirrors the structure of `hcsn-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Proposal and measurement settings.
    #[serde(default)]
    pub engine: ProposalConfig,

    /// Weights of the acceptance-probability factors.
    #[serde(default)]
    pub acceptance: AcceptanceConfig,

    /// ξ field dynamics.
    #[serde(default)]
    pub field: FieldConfig,

    /// Cluster, link and geometry memories.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Driver schedule (read by the binary only).
    #[serde(default)]
    pub run: RunConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the defect physics:
    /// - `HCSN_GAMMA_DEFECT` overrides `acceptance.gamma_defect`
    /// - `HCSN_INERTIA_SCALE` overrides `acceptance.inertia_scale`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.acceptance.apply_env_overrides();
        Ok(config)
    }

    /// Check every value against its admissible range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        unit("engine.p_create", e.p_create)?;
        unit("engine.anchor_probability", e.anchor_probability)?;
        unit("engine.interaction_fraction", e.interaction_fraction)?;

        let a = &self.acceptance;
        for (field, value) in [
            ("acceptance.gamma_time", a.gamma_time),
            ("acceptance.gamma_ext", a.gamma_ext),
            ("acceptance.gamma_closure", a.gamma_closure),
            ("acceptance.gamma_hier", a.gamma_hier),
            ("acceptance.epsilon_label_violation", a.epsilon_label_violation),
            ("acceptance.gamma_defect", a.gamma_defect),
            ("acceptance.inertia_scale", a.inertia_scale),
            ("acceptance.gamma_cohesion", a.gamma_cohesion),
            ("acceptance.gamma_binding", a.gamma_binding),
            ("acceptance.gamma_confinement", a.gamma_confinement),
            ("acceptance.gamma_mass", a.gamma_mass),
            ("acceptance.mass_cap", a.mass_cap),
            ("acceptance.gamma_localization", a.gamma_localization),
            ("acceptance.gamma_link_memory", a.gamma_link_memory),
            ("acceptance.gamma_surface", a.gamma_surface),
        ] {
            non_negative(field, value)?;
        }
        positive("acceptance.k_target", a.k_target)?;
        positive("acceptance.exponent_clamp", a.exponent_clamp)?;
        positive("acceptance.min_accept_probability", a.min_accept_probability)?;
        unit("acceptance.min_accept_probability", a.min_accept_probability)?;

        let f = &self.field;
        unit("field.xi_decay", f.xi_decay)?;
        unit("field.xi_coupling", f.xi_coupling)?;
        non_negative("field.xi_threshold", f.xi_threshold)?;
        positive("field.xi_floor", f.xi_floor)?;
        non_negative("field.inherit_fraction", f.inherit_fraction)?;
        non_negative("field.boundary_erosion", f.boundary_erosion)?;

        let m = &self.memory;
        unit("memory.omega_alpha", m.omega_alpha)?;
        unit("memory.link_decay", m.link_decay)?;
        non_negative("memory.link_floor", m.link_floor)?;
        unit("memory.distance_alpha", m.distance_alpha)?;
        if m.geometry_stride == 0 {
            return Err(invalid("memory.geometry_stride", "must be at least 1"));
        }
        if self.logging.print_interval == 0 {
            return Err(invalid("logging.print_interval", "must be at least 1"));
        }
        if self.run.sample_interval == 0 {
            return Err(invalid("run.sample_interval", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is not a finite non-negative number")))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is not a finite positive number")))
    }
}

fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is outside [0, 1]")))
    }
}

/// Proposal and measurement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalConfig {
    /// Probability of proposing edge creation (otherwise vertex fusion).
    #[serde(default = "default_p_create")]
    pub p_create: f64,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Probability of anchoring creation at a ξ-carrying vertex when any exist.
    #[serde(default = "default_anchor_probability")]
    pub anchor_probability: f64,

    /// Depth fraction defining deep worldlines.
    #[serde(default = "default_interaction_fraction")]
    pub interaction_fraction: f64,

    /// Coarse-graining scales for hierarchical closure Ω.
    #[serde(default = "default_closure_scales")]
    pub closure_scales: Vec<usize>,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            p_create: default_p_create(),
            seed: default_seed(),
            anchor_probability: default_anchor_probability(),
            interaction_fraction: default_interaction_fraction(),
            closure_scales: default_closure_scales(),
        }
    }
}

/// Weights of the acceptance-probability factors.
///
/// Every factor is `exp(weight * quantity)` with the exponent clamped to
/// `±exponent_clamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceConfig {
    /// Causal-depth inertia (penalizes a shrinking longest chain).
    #[serde(default = "default_gamma_time")]
    pub gamma_time: f64,

    /// Hub suppression (penalizes rising interaction concentration).
    #[serde(default = "default_gamma_ext")]
    pub gamma_ext: f64,

    /// Closure reward.
    #[serde(default = "default_gamma_closure")]
    pub gamma_closure: f64,

    /// Hierarchical-stability reward.
    #[serde(default = "default_gamma_hier")]
    pub gamma_hier: f64,

    /// |ΔΩ| above which a step is a defect.
    #[serde(default = "default_epsilon_label_violation")]
    pub epsilon_label_violation: f64,

    /// Target average coordination.
    #[serde(default = "default_k_target")]
    pub k_target: f64,

    /// Base defect suppression, decaying with population.
    #[serde(default = "default_gamma_defect")]
    pub gamma_defect: f64,

    /// Scale of the age-based Ω-gradient inertia.
    #[serde(default = "default_inertia_scale")]
    pub inertia_scale: f64,

    /// Steps after a forced injection during which Ω-gradient inertia is off.
    #[serde(default = "default_forced_relax_window")]
    pub forced_relax_window: u64,

    /// ξ-cluster cohesion penalty per lost member.
    #[serde(default = "default_gamma_cohesion")]
    pub gamma_cohesion: f64,

    /// ξ–ξ binding reward.
    #[serde(default = "default_gamma_binding")]
    pub gamma_binding: f64,

    /// Ω-confinement penalty.
    #[serde(default = "default_gamma_confinement")]
    pub gamma_confinement: f64,

    /// Cluster-size mass penalty.
    #[serde(default = "default_gamma_mass")]
    pub gamma_mass: f64,

    /// Cap on the per-cluster mass term.
    #[serde(default = "default_mass_cap")]
    pub mass_cap: f64,

    /// ξ centroid drift penalty.
    #[serde(default = "default_gamma_localization")]
    pub gamma_localization: f64,

    /// Link-memory retention reward.
    #[serde(default = "default_gamma_link_memory")]
    pub gamma_link_memory: f64,

    /// Surface-tension penalty per newly exposed ξ vertex.
    #[serde(default = "default_gamma_surface")]
    pub gamma_surface: f64,

    /// Bound on every exponent before exponentiation.
    #[serde(default = "default_exponent_clamp")]
    pub exponent_clamp: f64,

    /// Floor of the final acceptance probability.
    #[serde(default = "default_min_accept_probability")]
    pub min_accept_probability: f64,
}

impl AcceptanceConfig {
    /// Apply `HCSN_GAMMA_DEFECT` / `HCSN_INERTIA_SCALE` if set and numeric.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_f64("HCSN_GAMMA_DEFECT") {
            self.gamma_defect = value;
        }
        if let Some(value) = env_f64("HCSN_INERTIA_SCALE") {
            self.inertia_scale = value;
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, value = %raw, %err, "Ignoring non-numeric override");
            None
        }
    }
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            gamma_time: default_gamma_time(),
            gamma_ext: default_gamma_ext(),
            gamma_closure: default_gamma_closure(),
            gamma_hier: default_gamma_hier(),
            epsilon_label_violation: default_epsilon_label_violation(),
            k_target: default_k_target(),
            gamma_defect: default_gamma_defect(),
            inertia_scale: default_inertia_scale(),
            forced_relax_window: default_forced_relax_window(),
            gamma_cohesion: default_gamma_cohesion(),
            gamma_binding: default_gamma_binding(),
            gamma_confinement: default_gamma_confinement(),
            gamma_mass: default_gamma_mass(),
            mass_cap: default_mass_cap(),
            gamma_localization: default_gamma_localization(),
            gamma_link_memory: default_gamma_link_memory(),
            gamma_surface: default_gamma_surface(),
            exponent_clamp: default_exponent_clamp(),
            min_accept_probability: default_min_accept_probability(),
        }
    }
}

/// ξ field dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Multiplicative decay per committed step.
    #[serde(default = "default_xi_decay")]
    pub xi_decay: f64,

    /// Share of the decayed value handed to same-cluster neighbours.
    #[serde(default = "default_xi_coupling")]
    pub xi_coupling: f64,

    /// Values at or below this are absent for support and clustering.
    #[serde(default = "default_xi_threshold")]
    pub xi_threshold: f64,

    /// Values below this are pruned from the field.
    #[serde(default = "default_xi_floor")]
    pub xi_floor: f64,

    /// Fraction of the parents' mean ξ a created vertex inherits.
    #[serde(default = "default_inherit_fraction")]
    pub inherit_fraction: f64,

    /// Amount removed from cluster-boundary vertices per commit (0 = off).
    #[serde(default)]
    pub boundary_erosion: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            xi_decay: default_xi_decay(),
            xi_coupling: default_xi_coupling(),
            xi_threshold: default_xi_threshold(),
            xi_floor: default_xi_floor(),
            inherit_fraction: default_inherit_fraction(),
            boundary_erosion: 0.0,
        }
    }
}

/// Cluster, link and geometry memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// EMA weight of the previous per-cluster Ω.
    #[serde(default = "default_omega_alpha")]
    pub omega_alpha: f64,

    /// Per-commit decay of ξ–ξ link strengths.
    #[serde(default = "default_link_decay")]
    pub link_decay: f64,

    /// Link strengths below this are forgotten.
    #[serde(default = "default_link_floor")]
    pub link_floor: f64,

    /// EMA weight of the previous inter-cluster distance.
    #[serde(default = "default_distance_alpha")]
    pub distance_alpha: f64,

    /// Committed steps between geometry updates.
    #[serde(default = "default_geometry_stride")]
    pub geometry_stride: u64,

    /// Depth bound of every breadth-first search.
    #[serde(default = "default_max_bfs_depth")]
    pub max_bfs_depth: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            omega_alpha: default_omega_alpha(),
            link_decay: default_link_decay(),
            link_floor: default_link_floor(),
            distance_alpha: default_distance_alpha(),
            geometry_stride: default_geometry_stride(),
            max_bfs_depth: default_max_bfs_depth(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit a progress line every `print_interval` steps.
    #[serde(default)]
    pub verbose: bool,

    /// Steps between progress lines.
    #[serde(default = "default_print_interval")]
    pub print_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: false,
            print_interval: default_print_interval(),
        }
    }
}

/// Driver schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of engine steps.
    #[serde(default = "default_steps")]
    pub steps: u64,

    /// Steps between time-series samples.
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u64,

    /// Directory receiving the run record and JSON-lines logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Step at which to inject the first proto-object, if any.
    #[serde(default)]
    pub force_defect_at: Option<u64>,

    /// ξ magnitude of the first injection.
    #[serde(default = "default_force_magnitude")]
    pub force_magnitude: f64,

    /// Step at which to inject the second proto-object, if any.
    #[serde(default)]
    pub second_object_at: Option<u64>,

    /// ξ seeded at the second proto-object.
    #[serde(default = "default_second_xi_seed")]
    pub second_xi_seed: f64,

    /// ΔΩ recorded for the second proto-object.
    #[serde(default = "default_second_omega_kick")]
    pub second_omega_kick: f64,

    /// Desired hop distance between the second object and existing ξ.
    #[serde(default = "default_second_min_distance")]
    pub second_min_distance: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            sample_interval: default_sample_interval(),
            output_dir: default_output_dir(),
            force_defect_at: None,
            force_magnitude: default_force_magnitude(),
            second_object_at: None,
            second_xi_seed: default_second_xi_seed(),
            second_omega_kick: default_second_omega_kick(),
            second_min_distance: default_second_min_distance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_p_create() -> f64 {
    0.6
}

const fn default_seed() -> u64 {
    1
}

const fn default_anchor_probability() -> f64 {
    0.7
}

const fn default_interaction_fraction() -> f64 {
    0.6
}

fn default_closure_scales() -> Vec<usize> {
    vec![2, 4, 8]
}

const fn default_gamma_time() -> f64 {
    0.1
}

const fn default_gamma_ext() -> f64 {
    0.05
}

const fn default_gamma_closure() -> f64 {
    0.05
}

const fn default_gamma_hier() -> f64 {
    0.06
}

const fn default_epsilon_label_violation() -> f64 {
    0.08
}

const fn default_k_target() -> f64 {
    8.0
}

const fn default_gamma_defect() -> f64 {
    0.15
}

const fn default_inertia_scale() -> f64 {
    1.0
}

const fn default_forced_relax_window() -> u64 {
    50
}

const fn default_gamma_cohesion() -> f64 {
    0.5
}

const fn default_gamma_binding() -> f64 {
    0.2
}

const fn default_gamma_confinement() -> f64 {
    1.0
}

const fn default_gamma_mass() -> f64 {
    0.02
}

const fn default_mass_cap() -> f64 {
    3.0
}

const fn default_gamma_localization() -> f64 {
    0.1
}

const fn default_gamma_link_memory() -> f64 {
    0.3
}

const fn default_gamma_surface() -> f64 {
    0.1
}

const fn default_exponent_clamp() -> f64 {
    5.0
}

const fn default_min_accept_probability() -> f64 {
    1e-6
}

const fn default_xi_decay() -> f64 {
    0.98
}

const fn default_xi_coupling() -> f64 {
    0.5
}

const fn default_xi_threshold() -> f64 {
    0.05
}

const fn default_xi_floor() -> f64 {
    1e-6
}

const fn default_inherit_fraction() -> f64 {
    0.5
}

const fn default_omega_alpha() -> f64 {
    0.9
}

const fn default_link_decay() -> f64 {
    0.95
}

const fn default_link_floor() -> f64 {
    1e-3
}

const fn default_distance_alpha() -> f64 {
    0.8
}

const fn default_geometry_stride() -> u64 {
    5
}

const fn default_max_bfs_depth() -> u32 {
    12
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_print_interval() -> u64 {
    100
}

const fn default_steps() -> u64 {
    3000
}

const fn default_sample_interval() -> u64 {
    100
}

fn default_output_dir() -> String {
    "runs".to_owned()
}

const fn default_force_magnitude() -> f64 {
    0.3
}

const fn default_second_xi_seed() -> f64 {
    1.0
}

const fn default_second_omega_kick() -> f64 {
    0.3
}

const fn default_second_min_distance() -> u32 {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.seed, 1);
        assert_eq!(config.engine.closure_scales, vec![2, 4, 8]);
        assert_eq!(config.memory.geometry_stride, 5);
        assert_eq!(config.run.steps, 3000);
        assert!(config.run.force_defect_at.is_none());
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r"
engine:
  p_create: 0.8
  seed: 7
field:
  xi_decay: 0.9
  boundary_erosion: 0.01
logging:
  verbose: true
run:
  force_defect_at: 500
";
        let config = EngineConfig::parse(yaml).unwrap();
        assert!((config.engine.p_create - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.engine.seed, 7);
        assert!((config.engine.anchor_probability - 0.7).abs() < f64::EPSILON);
        assert!((config.field.xi_decay - 0.9).abs() < f64::EPSILON);
        assert!((config.field.xi_coupling - 0.5).abs() < f64::EPSILON);
        assert!(config.logging.verbose);
        assert_eq!(config.run.force_defect_at, Some(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = EngineConfig::parse("{}").unwrap();
        assert_eq!(config.engine, ProposalConfig::default());
        assert_eq!(config.memory, MemoryConfig::default());
    }

    #[test]
    fn invalid_yaml_is_error() {
        assert!(matches!(
            EngineConfig::parse("engine: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.engine.p_create = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "engine.p_create",
                ..
            })
        ));

        let mut config = EngineConfig::default();
        config.memory.geometry_stride = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.acceptance.exponent_clamp = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.field.xi_floor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = EngineConfig::from_file(Path::new("/nonexistent/hcsn-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("hcsn-config.yaml");
        if path.exists() {
            let config = EngineConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
            assert!(config.unwrap().validate().is_ok());
        }
    }
}
