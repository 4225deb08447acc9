//! Pairwise Overlap Scoring

use crate::coverage::Coverage;
use crate::graph::{AlertStats, DependencyGraph};
use crate::policy::AnalyzerPolicy;
use alert_model::{DependencyScore, FiringInterval, Timestamp};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Firing history of one alert type, split by partition scope
#[derive(Default)]
struct TypeProfile {
    /// scope -> extended intervals `[start, end + step)`
    spans: BTreeMap<String, Vec<(Timestamp, Timestamp)>>,
    /// scope -> union of the spans
    coverage: BTreeMap<String, Coverage>,
    interval_count: usize,
    interval_seconds: i64,
}

impl TypeProfile {
    fn firing_seconds(&self) -> i64 {
        self.coverage.values().map(Coverage::total).sum()
    }
}

fn build_profiles(intervals: &[FiringInterval], policy: &AnalyzerPolicy) -> BTreeMap<String, TypeProfile> {
    let mut profiles: BTreeMap<String, TypeProfile> = BTreeMap::new();

    for interval in intervals {
        let scope = policy
            .partition_label
            .as_deref()
            .and_then(|label| interval.label(label))
            .unwrap_or_default()
            .to_string();
        let profile = profiles.entry(interval.alert_type.clone()).or_default();
        profile.interval_count += 1;
        profile.interval_seconds += interval.duration();
        profile
            .spans
            .entry(scope)
            .or_default()
            .push((interval.start, interval.end.saturating_add(policy.sample_step)));
    }

    for profile in profiles.values_mut() {
        profile.coverage = profile
            .spans
            .iter()
            .map(|(scope, spans)| (scope.clone(), Coverage::from_spans(spans.iter().copied())))
            .collect();
    }
    profiles
}

/// How much of `dependent`'s firing time `cause` covers
fn score_pair(cause_type: &str, cause: &TypeProfile, dependent_type: &str, dependent: &TypeProfile) -> DependencyScore {
    let mut covered = 0i64;
    let mut sample_count = 0usize;

    for (scope, dependent_coverage) in &dependent.coverage {
        let Some(cause_coverage) = cause.coverage.get(scope) else {
            continue;
        };
        covered += cause_coverage.intersection(dependent_coverage);
        sample_count += dependent
            .spans
            .get(scope)
            .map_or(0, |spans| {
                spans
                    .iter()
                    .filter(|&&(start, end)| cause_coverage.overlaps(start, end))
                    .count()
            });
    }

    let total = dependent.firing_seconds();
    let overlap_ratio = if total > 0 {
        (covered as f64 / total as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    DependencyScore {
        from_type: cause_type.to_string(),
        to_type: dependent_type.to_string(),
        overlap_ratio,
        sample_count,
    }
}

/// Build the dependency graph of the given intervals.
///
/// An empty interval set yields an empty graph.
pub fn analyze(intervals: &[FiringInterval], policy: &AnalyzerPolicy) -> DependencyGraph {
    let profiles = build_profiles(intervals, policy);

    let mut scores = Vec::new();
    for (cause_type, cause) in &profiles {
        for (dependent_type, dependent) in &profiles {
            if cause_type == dependent_type {
                continue;
            }
            let score = score_pair(cause_type, cause, dependent_type, dependent);
            if score.sample_count > 0 {
                debug!(
                    "{} -> {}: overlap {:.3} over {} interval(s)",
                    cause_type, dependent_type, score.overlap_ratio, score.sample_count
                );
                scores.push(score);
            }
        }
    }

    let stats = profiles
        .iter()
        .map(|(alert_type, profile)| {
            (
                alert_type.clone(),
                AlertStats {
                    interval_count: profile.interval_count,
                    firing_seconds: profile.firing_seconds(),
                    interval_seconds: profile.interval_seconds,
                },
            )
        })
        .collect();

    let graph = DependencyGraph::new(stats, scores, policy.min_overlap_ratio, policy.min_samples);
    info!(
        "Analyzed {} interval(s) of {} alert type(s): {} co-occurring pair(s), {} dependency edge(s)",
        intervals.len(),
        graph.node_count(),
        graph.scores().len(),
        graph.edges().len()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn interval(alert: &str, cluster: &str, start: i64, end: i64) -> FiringInterval {
        let labels = BTreeMap::from([("cluster".to_string(), cluster.to_string())]);
        FiringInterval {
            alert_type: alert.to_string(),
            instance_key: format!("{}{{cluster={:?}}}", alert, cluster),
            labels,
            start,
            end,
        }
    }

    fn policy(min_overlap_ratio: f64, min_samples: usize) -> AnalyzerPolicy {
        AnalyzerPolicy::new(min_overlap_ratio, min_samples).with_sample_step(1)
    }

    #[test]
    fn test_empty_input() {
        let graph = analyze(&[], &policy(0.9, 1));
        assert!(graph.is_empty());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_contained_alert_depends_on_container() {
        let intervals = vec![
            interval("A", "eu", 0, 100),
            interval("A", "eu", 200, 300),
            interval("B", "eu", 10, 20),
            interval("B", "eu", 210, 215),
        ];
        let graph = analyze(&intervals, &policy(0.9, 1));

        assert_eq!(graph.edges().len(), 1);
        let edge = &graph.edges()[0];
        assert_eq!((edge.from_type.as_str(), edge.to_type.as_str()), ("A", "B"));
        assert_eq!(edge.overlap_ratio, 1.0);
        assert_eq!(edge.sample_count, 2);
        assert_eq!(graph.parent_of("B").map(|e| e.from_type.as_str()), Some("A"));
        assert!(graph.parent_of("A").is_none());
    }

    #[test]
    fn test_partial_overlap_ratio() {
        let intervals = vec![interval("A", "eu", 0, 49), interval("B", "eu", 25, 124)];
        let graph = analyze(&intervals, &policy(0.9, 1));

        let score = graph
            .scores()
            .iter()
            .find(|s| s.from_type == "A" && s.to_type == "B")
            .unwrap();
        // B covers [25, 125), A covers [0, 50)
        assert!((score.overlap_ratio - 0.25).abs() < 1e-9);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_partitions_do_not_co_occur() {
        let intervals = vec![interval("A", "eu", 0, 100), interval("B", "us", 10, 20)];
        let graph = analyze(&intervals, &policy(0.9, 1));
        assert!(graph.scores().is_empty());

        let global = policy(0.9, 1).with_partition_label(None);
        let graph = analyze(&intervals, &global);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_min_samples_guard() {
        let intervals = vec![interval("A", "eu", 0, 100), interval("B", "eu", 10, 20)];
        let graph = analyze(&intervals, &policy(0.9, 2));
        assert!(graph.edges().is_empty());
        assert_eq!(graph.scores().len(), 2);
    }

    #[test]
    fn test_stats() {
        let intervals = vec![interval("A", "eu", 0, 9), interval("A", "us", 0, 9)];
        let graph = analyze(&intervals, &policy(0.9, 1));
        assert_eq!(
            graph.stats("A"),
            Some(&AlertStats {
                interval_count: 2,
                firing_seconds: 20,
                interval_seconds: 18,
            })
        );
    }

    fn arb_interval() -> impl Strategy<Value = FiringInterval> {
        (
            prop::sample::select(vec!["A", "B", "C", "D", "E"]),
            prop::sample::select(vec!["eu", "us"]),
            0i64..1_000,
            0i64..200,
        )
            .prop_map(|(alert, cluster, start, width)| interval(alert, cluster, start, start + width))
    }

    proptest! {
        #[test]
        fn prop_graph_is_acyclic_with_single_parent(
            intervals in prop::collection::vec(arb_interval(), 0..60),
            min_overlap_ratio in 0.05f64..1.0,
        ) {
            let graph = analyze(&intervals, &policy(min_overlap_ratio, 1));
            prop_assert!(!graph.has_cycle());

            let mut inbound: BTreeMap<&str, usize> = BTreeMap::new();
            for edge in graph.edges() {
                *inbound.entry(edge.to_type.as_str()).or_default() += 1;
                prop_assert!(edge.overlap_ratio >= min_overlap_ratio);
            }
            prop_assert!(inbound.values().all(|&count| count == 1));
        }
    }
}
