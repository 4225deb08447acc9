//! Analysis Run
//!
//! One run: split the history window, fetch every sub-range through the
//! worker pool, then (after all fetches finished) normalize, analyze and
//! reduce. Failed ranges are collected as gaps, never thrown.

use crate::error::MagnetError;
use crate::settings::MagnetConfig;
use crate::telemetry;
use alert_model::{unix_now, FiringInterval, RawSample, TimeRange, Timestamp};
use dependency_analyzer::{analyze, DependencyGraph};
use firing_intervals::{join_at_boundary, merge_intervals, Normalizer};
use query_engine::{MetricsBackend, QueryExecutor};
use reduction::{reduce, ReductionReport};
use std::fmt;
use std::sync::Arc;
use storage::{ResultStore, RunManifest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some ranges failed or the run was cancelled; analysis used what was fetched
    SuccessWithWarnings,
    /// More ranges failed than `max_failed_ratio` allows
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::SuccessWithWarnings => write!(f, "success with warnings"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A sub-range missing from the analyzed history
#[derive(Debug, Clone, PartialEq)]
pub struct RangeGap {
    pub range: TimeRange,
    pub cause: String,
    pub attempts: u32,
    /// Retries were exhausted on a transient failure
    pub transient: bool,
}

/// Result of normalize, analyze and reduce
#[derive(Debug, Clone)]
pub struct Analysis {
    pub sample_count: usize,
    pub intervals: Vec<FiringInterval>,
    pub graph: DependencyGraph,
    pub reduction: ReductionReport,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub window: TimeRange,
    pub total_ranges: usize,
    pub gaps: Vec<RangeGap>,
    /// Ranges never dispatched because the run was cancelled
    pub skipped_ranges: usize,
    pub cancelled: bool,
    pub analysis: Analysis,
}

impl RunReport {
    /// Share of ranges missing from the history
    pub fn failed_ratio(&self) -> f64 {
        if self.total_ranges == 0 {
            return 0.0;
        }
        (self.gaps.len() + self.skipped_ranges) as f64 / self.total_ranges as f64
    }
}

fn run_status(failed_ratio: f64, max_failed_ratio: f64, warnings: bool) -> RunStatus {
    if failed_ratio > max_failed_ratio {
        RunStatus::Failed
    } else if warnings {
        RunStatus::SuccessWithWarnings
    } else {
        RunStatus::Success
    }
}

/// Fetch and analyze the configured history window
pub async fn run(
    config: MagnetConfig,
    backend: Arc<dyn MetricsBackend>,
    store: Arc<dyn ResultStore>,
    cancel: CancellationToken,
) -> Result<RunReport, MagnetError> {
    config.validate()?;

    let now = unix_now();
    let window = TimeRange::ending_at(now, config.history()?)?;
    let plan = config.split_plan(now)?;
    store.write_manifest(&RunManifest {
        started_at: now,
        downsample_boundary: plan.boundary(),
    })?;
    let tasks: Vec<_> = plan.tasks(window, &config.query).collect();
    let total_ranges = tasks.len();
    info!("Analyzing {} in {} range(s)", window, total_ranges);

    let executor = QueryExecutor::new(backend, store, config.executor_config());
    let outcomes = executor.execute(tasks, cancel.clone()).await;

    let mut samples: Vec<RawSample> = Vec::new();
    let mut gaps = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(fetched) => samples.extend_from_slice(fetched),
            Err(err) => {
                warn!("Range {} excluded from analysis: {}", err.task.range, err.cause);
                gaps.push(RangeGap {
                    range: err.task.range,
                    cause: err.cause.to_string(),
                    attempts: err.attempts,
                    transient: err.cause.is_transient(),
                });
            }
        }
    }
    gaps.sort_by_key(|gap| gap.range);
    let skipped_ranges = total_ranges - outcomes.len();
    let cancelled = cancel.is_cancelled();

    let analysis = analyze_samples(samples, plan.boundary(), &config)?;

    let mut report = RunReport {
        status: RunStatus::Success,
        window,
        total_ranges,
        gaps,
        skipped_ranges,
        cancelled,
        analysis,
    };
    let warnings = !report.gaps.is_empty() || report.skipped_ranges > 0 || cancelled;
    report.status = run_status(report.failed_ratio(), config.max_failed_ratio, warnings);

    info!(
        "Run finished: {} ({} of {} range(s) missing, {})",
        report.status,
        report.gaps.len() + report.skipped_ranges,
        total_ranges,
        report.analysis.reduction.outcome()
    );
    Ok(report)
}

/// Re-run the analysis on everything in `store` without fetching.
///
/// Samples are split into resolution tiers at the boundary the storing run
/// recorded; stores without a manifest fall back to the current one.
pub fn reprocess(store: &dyn ResultStore, config: &MagnetConfig) -> Result<Analysis, MagnetError> {
    config.validate()?;
    let samples = store.read_all()?;
    let boundary = match store.read_manifest()? {
        Some(manifest) => manifest.downsample_boundary,
        None => {
            warn!("No run manifest stored, deriving the downsampling boundary from the current time");
            config.split_plan(unix_now())?.boundary()
        }
    };
    info!("Reprocessing {} stored sample(s)", samples.len());
    analyze_samples(samples, boundary, config)
}

/// Normalize, analyze and reduce. Downsampled samples (older than
/// `boundary`) are merged with the coarser step as gap tolerance, and an
/// instance firing across the boundary stays one interval.
fn analyze_samples(
    samples: Vec<RawSample>,
    boundary: Option<Timestamp>,
    config: &MagnetConfig,
) -> Result<Analysis, MagnetError> {
    let sample_count = samples.len();
    let (recent_config, downsampled_config) = config.normalizer_configs()?;

    let (downsampled, recent): (Vec<RawSample>, Vec<RawSample>) = samples
        .into_iter()
        .partition(|sample| matches!(boundary, Some(boundary) if sample.timestamp < boundary));

    let boundary_tolerance = downsampled_config.gap_tolerance;
    let mut intervals = Normalizer::new(recent_config).normalize(recent);
    intervals.extend(Normalizer::new(downsampled_config).normalize(downsampled));
    let intervals = match boundary {
        Some(boundary) => join_at_boundary(intervals, boundary, boundary_tolerance),
        None => merge_intervals(intervals),
    };

    let graph = analyze(&intervals, &config.analyzer_policy());
    let reduction = reduce(&graph);
    telemetry::record_analysis(&graph, &reduction);

    Ok(Analysis {
        sample_count,
        intervals,
        graph,
        reduction,
    })
}
