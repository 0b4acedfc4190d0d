//! Simulator binary for the HCSN causal hypergraph.
//!
//! Loads configuration, grows the seed universe for the configured number
//! of steps (applying any scheduled proto-object injections) and writes the
//! run outputs.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `hcsn-config.yaml` (or `HCSN_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the seed universe and the rewrite engine
//! 4. Run the schedule, sampling the time series
//! 5. Log the result and defect spacing
//! 6. Write the defect log, rewrite history, cluster geometry and run record

mod error;
mod schedule;

use std::path::{Path, PathBuf};
use std::time::Instant;

use hcsn_core::config::EngineConfig;
use hcsn_core::engine::RewriteEngine;
use hcsn_core::export::{
    RunRecord, TimeSeriesSampler, append_run, defect_spacing, new_run_id, write_json_file,
    write_json_lines_file,
};
use hcsn_core::runner;
use hcsn_graph::Hypergraph;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::SimError;
use crate::schedule::Schedule;

/// Config file used when `HCSN_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "hcsn-config.yaml";

/// Application entry point for the simulator.
///
/// # Errors
///
/// Returns an error if configuration, the engine or the export fails.
fn main() -> Result<(), SimError> {
    // 1. Load configuration. Logging is not up yet, so remember where it came from.
    let config_path = std::env::var("HCSN_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging. RUST_LOG wins over the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("hcsn-sim starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        seed = config.engine.seed,
        steps = config.run.steps,
        p_create = config.engine.p_create,
        gamma_defect = config.acceptance.gamma_defect,
        inertia_scale = config.acceptance.inertia_scale,
        "Run parameters"
    );

    // 3. Build the seed universe and the engine.
    let steps = config.run.steps;
    let schedule = Schedule::from_config(&config.run);
    info!(injections = schedule.events().len(), "Injection schedule built");
    let output_dir = PathBuf::from(&config.run.output_dir);
    let mut sampler = TimeSeriesSampler::new(config.run.sample_interval);
    let mut engine = RewriteEngine::new(Hypergraph::seed_universe(), config)?;

    // 4. Run.
    let run_id = new_run_id();
    let started = Instant::now();
    let summary = schedule.run(&mut engine, steps, &mut sampler);
    let wall_time_sec = started.elapsed().as_secs_f64();

    // 5. Log results.
    runner::log_run_end(&summary);
    match defect_spacing(engine.defect_log()) {
        Some(spacing) => info!(
            mean = spacing.mean,
            min = spacing.min,
            max = spacing.max,
            "Defect spacing"
        ),
        None => info!(defects = summary.defects, "Too few defects for spacing statistics"),
    }

    // 6. Write outputs.
    std::fs::create_dir_all(&output_dir).map_err(|source| SimError::OutputDir {
        path: output_dir.display().to_string(),
        source,
    })?;
    let defects = write_json_lines_file(&output_dir.join("defects.jsonl"), engine.defect_log())?;
    let rewrites =
        write_json_lines_file(&output_dir.join("rewrites.jsonl"), engine.rewrite_history())?;
    write_json_file(
        &output_dir.join("geometry.json"),
        &engine.export_cluster_geometry(),
    )?;

    let record = RunRecord::from_run(
        run_id,
        &engine,
        &summary,
        sampler.into_series(),
        wall_time_sec,
    );
    let runs = append_run(&output_dir.join("timeseries.json"), record)?;

    info!(
        output_dir = %output_dir.display(),
        defects,
        rewrites,
        archived_runs = runs,
        wall_time_sec,
        "hcsn-sim finished"
    );

    Ok(())
}

/// Load the configuration, falling back to defaults when the file is absent.
///
/// Returns the config and whether it was read from `path`.
fn load_config(path: &Path) -> Result<(EngineConfig, bool), SimError> {
    if path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        let mut config = EngineConfig::default();
        config.acceptance.apply_env_overrides();
        Ok((config, false))
    }
}
