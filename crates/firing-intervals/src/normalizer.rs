//! Sample-to-Interval Normalizer

use crate::error::NormalizerError;
use crate::key::{identity_labels, instance_key, DEFAULT_IGNORED_LABELS};
use alert_model::{FiringInterval, RawSample, Timestamp, ALERTNAME_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Normalizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Largest gap (seconds) between consecutive firing samples that still
    /// belongs to one interval; normally the query step
    pub gap_tolerance: i64,
    /// Labels excluded from the instance identity
    pub ignored_labels: BTreeSet<String>,
}

impl NormalizerConfig {
    /// Settings with the default ignored labels
    pub fn new(gap_tolerance: i64) -> Result<Self, NormalizerError> {
        if gap_tolerance < 1 {
            return Err(NormalizerError::InvalidGapTolerance(gap_tolerance));
        }
        Ok(Self {
            gap_tolerance,
            ignored_labels: DEFAULT_IGNORED_LABELS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Exclude one more label from the instance identity
    pub fn ignore_label(mut self, label: impl Into<String>) -> Self {
        self.ignored_labels.insert(label.into());
        self
    }
}

/// Samples of one instance, keyed by timestamp
struct InstanceSamples {
    alert_type: String,
    labels: BTreeMap<String, String>,
    /// timestamp -> firing; a firing sample wins over a duplicate
    points: BTreeMap<Timestamp, bool>,
}

/// Merges raw samples into firing intervals
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Group, sort and merge samples. Input order is irrelevant; output is
    /// ordered by instance key, then start.
    pub fn normalize(&self, samples: impl IntoIterator<Item = RawSample>) -> Vec<FiringInterval> {
        let mut instances: BTreeMap<String, InstanceSamples> = BTreeMap::new();
        let mut sample_count = 0usize;

        for sample in samples {
            sample_count += 1;
            let firing = sample.is_firing();
            let labels = identity_labels(&sample.labels, &self.config.ignored_labels);
            let key = instance_key(&sample.alert_id, &labels);

            let instance = instances.entry(key).or_insert_with(|| InstanceSamples {
                alert_type: sample.alert_id,
                labels,
                points: BTreeMap::new(),
            });
            *instance.points.entry(sample.timestamp).or_insert(false) |= firing;
        }

        let mut intervals = Vec::new();
        for (key, instance) in instances {
            let spans = self.firing_spans(&instance.points);
            let merged = merge_intervals(spans.into_iter().map(|(start, end)| FiringInterval {
                alert_type: instance.alert_type.clone(),
                instance_key: key.clone(),
                labels: instance.labels.clone(),
                start,
                end,
            }));
            intervals.extend(merged);
        }

        debug!(
            "Normalized {} sample(s) into {} interval(s)",
            sample_count,
            intervals.len()
        );
        intervals
    }

    /// Runs of firing points whose gaps stay within the tolerance
    fn firing_spans(&self, points: &BTreeMap<Timestamp, bool>) -> Vec<(Timestamp, Timestamp)> {
        let mut spans = Vec::new();
        let mut current: Option<(Timestamp, Timestamp)> = None;

        for (&timestamp, &firing) in points {
            if !firing {
                spans.extend(current.take());
                continue;
            }
            current = match current {
                Some((start, end)) if timestamp - end <= self.config.gap_tolerance => Some((start, timestamp)),
                Some(done) => {
                    spans.push(done);
                    Some((timestamp, timestamp))
                }
                None => Some((timestamp, timestamp)),
            };
        }
        spans.extend(current);
        spans
    }

    /// Render intervals back into samples that normalize to the same
    /// intervals: firing samples no further apart than the gap tolerance,
    /// and a resolved sample between neighbouring intervals of an instance.
    pub fn to_samples(&self, intervals: &[FiringInterval]) -> Vec<RawSample> {
        let stride = self.config.gap_tolerance;
        let mut samples = Vec::new();

        for (index, interval) in intervals.iter().enumerate() {
            let mut labels = interval.labels.clone();
            labels.insert(ALERTNAME_LABEL.to_string(), interval.alert_type.clone());

            let mut timestamp = interval.start;
            while timestamp < interval.end {
                samples.push(RawSample::new(&interval.alert_type, labels.clone(), timestamp, 1.0));
                timestamp += stride;
            }
            samples.push(RawSample::new(&interval.alert_type, labels.clone(), interval.end, 1.0));

            if let Some(next) = intervals.get(index + 1) {
                if next.instance_key == interval.instance_key && next.start - interval.end >= 2 {
                    let resolved_at = interval.end + (next.start - interval.end) / 2;
                    samples.push(RawSample::new(&interval.alert_type, labels, resolved_at, 0.0));
                }
            }
        }

        samples
    }
}

/// Merge overlapping or touching intervals of the same instance.
///
/// Output is sorted by instance key, then start.
pub fn merge_intervals(intervals: impl IntoIterator<Item = FiringInterval>) -> Vec<FiringInterval> {
    let mut sorted: Vec<FiringInterval> = intervals.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.instance_key
            .cmp(&b.instance_key)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
    });

    let mut merged: Vec<FiringInterval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if last.instance_key == interval.instance_key && last.overlaps_or_touches(&interval) => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Join each instance's last interval before `boundary` with its first
/// interval from `boundary` on when they are at most `tolerance` apart.
///
/// Intervals on either side were normalized with different gap tolerances;
/// only the pair straddling the boundary uses the coarser one. Output is
/// sorted by instance key, then start.
pub fn join_at_boundary(
    intervals: impl IntoIterator<Item = FiringInterval>,
    boundary: Timestamp,
    tolerance: i64,
) -> Vec<FiringInterval> {
    let mut joined: Vec<FiringInterval> = Vec::new();
    for interval in merge_intervals(intervals) {
        match joined.last_mut() {
            Some(last)
                if last.instance_key == interval.instance_key
                    && last.end < boundary
                    && interval.start >= boundary
                    && interval.start - last.end <= tolerance =>
            {
                last.end = interval.end;
            }
            _ => joined.push(interval),
        }
    }
    joined
}
