//! Record-oriented export of engine logs and run records.
//!
//! Defect and rewrite logs are written as JSON lines, one record per line.
//! Whole runs are appended to a `{"runs": [...]}` archive so repeated runs
//! accumulate in one file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use hcsn_types::DefectEvent;

use crate::engine::{RewriteEngine, StepSummary};
use crate::runner::{RunSummary, StepCallback};

/// Errors that can occur while exporting.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Reading or writing a file failed.
    #[error("export I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A record could not be encoded or an archive could not be decoded.
    #[error("export JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Write each record as one JSON object per line. Returns the record count.
pub fn write_json_lines<W, T>(writer: W, records: &[T]) -> Result<usize, ExportError>
where
    W: Write,
    T: Serialize,
{
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Write records as JSON lines into a new file at `path`.
pub fn write_json_lines_file<T: Serialize>(path: &Path, records: &[T]) -> Result<usize, ExportError> {
    write_json_lines(File::create(path)?, records)
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// Sampled time series of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Step counter at each sample.
    pub t: Vec<u64>,
    /// Average coordination at each sample.
    pub k: Vec<f64>,
    /// Hierarchical closure Ω at each sample.
    pub omega: Vec<f64>,
}

impl TimeSeries {
    /// Append one sample.
    pub fn push(&mut self, t: u64, k: f64, omega: f64) {
        self.t.push(t);
        self.k.push(k);
        self.omega.push(omega);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// Whether no sample was taken.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Step counter at the end of the run.
    pub steps: u64,
    /// Steps between samples.
    pub sample_interval: u64,
    /// Engine seed.
    pub seed: u64,
    /// Committed steps.
    pub accepted: u64,
    /// Steps that did not commit.
    pub rejected: u64,
    /// Committed over executed steps.
    pub acceptance_ratio: f64,
    /// Wall-clock duration in seconds.
    pub wall_time_sec: f64,
}

/// One complete run: metadata, sampled time series, defect log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Start timestamp (ISO 8601, second precision).
    pub run_id: String,
    /// Run-level metadata.
    pub meta: RunMeta,
    /// Sampled time series.
    pub timeseries: TimeSeries,
    /// The engine's defect log.
    pub defects: Vec<DefectEvent>,
}

impl RunRecord {
    /// Assemble a record from a finished run.
    pub fn from_run(
        run_id: String,
        engine: &RewriteEngine,
        summary: &RunSummary,
        timeseries: TimeSeries,
        wall_time_sec: f64,
    ) -> Self {
        Self {
            run_id,
            meta: RunMeta {
                steps: engine.time(),
                sample_interval: engine.config().run.sample_interval,
                seed: engine.config().engine.seed,
                accepted: summary.accepted,
                rejected: summary.rejected.saturating_add(summary.rule_rejections),
                acceptance_ratio: summary.acceptance_ratio(),
                wall_time_sec: (wall_time_sec * 1000.0).round() / 1000.0,
            },
            timeseries,
            defects: engine.defect_log().to_vec(),
        }
    }
}

/// A fresh run identifier from the current UTC time.
pub fn new_run_id() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// The append-only `{"runs": [...]}` archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunArchive {
    /// Every archived run, oldest first.
    pub runs: Vec<RunRecord>,
}

/// Append `record` to the archive at `path`, creating it if missing.
/// Returns the number of runs now archived.
pub fn append_run(path: &Path, record: RunRecord) -> Result<usize, ExportError> {
    let mut archive: RunArchive = if path.exists() {
        serde_json::from_reader(BufReader::new(File::open(path)?))?
    } else {
        RunArchive::default()
    };
    archive.runs.push(record);
    write_json_file(path, &archive)?;
    Ok(archive.runs.len())
}

/// Write `value` as pretty-printed JSON into a new file at `path`.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sampling and defect statistics
// ---------------------------------------------------------------------------

/// Step callback that samples `<k>` and Ω every `interval` steps.
#[derive(Debug, Clone)]
pub struct TimeSeriesSampler {
    interval: u64,
    series: TimeSeries,
}

impl TimeSeriesSampler {
    /// Sample whenever the step counter is a multiple of `interval`.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            series: TimeSeries::default(),
        }
    }

    /// The samples taken so far.
    pub const fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Take the samples.
    pub fn into_series(self) -> TimeSeries {
        self.series
    }
}

impl StepCallback for TimeSeriesSampler {
    fn on_step(&mut self, summary: &StepSummary, engine: &RewriteEngine) {
        let t = engine.time();
        if t.checked_rem(self.interval) == Some(0) {
            self.series
                .push(t, engine.hypergraph().average_coordination(), summary.omega);
        }
    }
}

/// Spacing between consecutive defects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DefectSpacing {
    /// Mean gap in steps.
    pub mean: f64,
    /// Smallest gap.
    pub min: u64,
    /// Largest gap.
    pub max: u64,
}

/// Gap statistics of a defect log; `None` with fewer than two defects.
pub fn defect_spacing(defects: &[DefectEvent]) -> Option<DefectSpacing> {
    let gaps: Vec<u64> = defects
        .windows(2)
        .filter_map(|pair| match pair {
            [a, b] => Some(b.time.saturating_sub(a.time)),
            _ => None,
        })
        .collect();
    let min = gaps.iter().copied().min()?;
    let max = gaps.iter().copied().max()?;
    #[allow(clippy::cast_precision_loss)]
    let mean = gaps.iter().map(|&g| g as f64).sum::<f64>() / gaps.len() as f64;
    Some(DefectSpacing { mean, min, max })
}
