//! Reduction Report

use dependency_analyzer::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::info;

/// Firing duration statistics of one alert type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub interval_count: usize,
    /// Seconds during which at least one instance was firing
    pub total_firing_seconds: i64,
    /// Mean `end - start` of a single interval
    pub mean_firing_seconds: f64,
}

/// Short verdict of a reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionOutcome {
    /// The history contained no firing alerts
    NoRootsIdentified,
    Reduced { roots: usize, suppressible: usize },
}

impl fmt::Display for ReductionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionOutcome::NoRootsIdentified => write!(f, "no roots identified"),
            ReductionOutcome::Reduced { roots, suppressible } => {
                write!(f, "{} root alert(s), {} suppressible", roots, suppressible)
            }
        }
    }
}

/// Roots and suppressible alerts of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionReport {
    /// Alert types with no incoming dependency edge
    pub roots: BTreeSet<String>,
    /// Suppressible alert type -> alert type causing it
    pub suppressible: BTreeMap<String, String>,
    /// Per alert type
    pub durations: BTreeMap<String, DurationStats>,
}

impl ReductionReport {
    pub fn outcome(&self) -> ReductionOutcome {
        if self.roots.is_empty() {
            ReductionOutcome::NoRootsIdentified
        } else {
            ReductionOutcome::Reduced {
                roots: self.roots.len(),
                suppressible: self.suppressible.len(),
            }
        }
    }

    pub fn is_root(&self, alert_type: &str) -> bool {
        self.roots.contains(alert_type)
    }

    /// Follow the suppression chain of `alert_type` to its root.
    ///
    /// A root maps to itself; unknown alert types map to `None`.
    pub fn root_of<'a>(&'a self, alert_type: &'a str) -> Option<&'a str> {
        let mut current = alert_type;
        for _ in 0..=self.suppressible.len() {
            if self.roots.contains(current) {
                return Some(current);
            }
            current = self.suppressible.get(current).map(String::as_str)?;
        }
        None
    }
}

/// Derive roots and suppression mapping from `graph`
pub fn reduce(graph: &DependencyGraph) -> ReductionReport {
    let suppressible: BTreeMap<String, String> = graph
        .edges()
        .iter()
        .map(|edge| (edge.to_type.clone(), edge.from_type.clone()))
        .collect();

    let roots: BTreeSet<String> = graph
        .nodes()
        .filter(|node| !suppressible.contains_key(*node))
        .map(str::to_string)
        .collect();

    let durations = graph
        .all_stats()
        .iter()
        .map(|(alert_type, stats)| {
            let mean = if stats.interval_count > 0 {
                stats.interval_seconds as f64 / stats.interval_count as f64
            } else {
                0.0
            };
            (
                alert_type.clone(),
                DurationStats {
                    interval_count: stats.interval_count,
                    total_firing_seconds: stats.firing_seconds,
                    mean_firing_seconds: mean,
                },
            )
        })
        .collect();

    let report = ReductionReport {
        roots,
        suppressible,
        durations,
    };
    info!("Reduction: {}", report.outcome());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_model::FiringInterval;
    use dependency_analyzer::{analyze, AnalyzerPolicy};
    use std::collections::BTreeMap;

    fn interval(alert: &str, start: i64, end: i64) -> FiringInterval {
        FiringInterval {
            alert_type: alert.to_string(),
            instance_key: format!("{}{{}}", alert),
            labels: BTreeMap::new(),
            start,
            end,
        }
    }

    fn policy() -> AnalyzerPolicy {
        AnalyzerPolicy::new(0.9, 1)
            .with_sample_step(1)
            .with_partition_label(None)
    }

    #[test]
    fn test_contained_alert_is_suppressible() {
        let intervals = vec![
            interval("A", 0, 100),
            interval("A", 200, 300),
            interval("B", 10, 20),
            interval("B", 210, 215),
        ];
        let report = reduce(&analyze(&intervals, &policy()));

        assert_eq!(report.roots, BTreeSet::from(["A".to_string()]));
        assert_eq!(report.suppressible.get("B").map(String::as_str), Some("A"));
        assert_eq!(report.outcome(), ReductionOutcome::Reduced { roots: 1, suppressible: 1 });
    }

    #[test]
    fn test_root_chain() {
        let intervals = vec![
            interval("A", 0, 999),
            interval("B", 100, 1090),
            interval("C", 1010, 1090),
        ];
        let report = reduce(&analyze(&intervals, &policy()));

        assert_eq!(report.suppressible.get("C").map(String::as_str), Some("B"));
        assert_eq!(report.root_of("C"), Some("A"));
        assert_eq!(report.root_of("A"), Some("A"));
        assert_eq!(report.root_of("Z"), None);
        assert!(report.is_root("A"));
    }

    #[test]
    fn test_independent_alerts_are_all_roots() {
        let intervals = vec![interval("A", 0, 10), interval("B", 100, 110)];
        let report = reduce(&analyze(&intervals, &policy()));
        assert_eq!(report.roots.len(), 2);
        assert!(report.suppressible.is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let report = reduce(&analyze(&[], &policy()));
        assert_eq!(report.outcome(), ReductionOutcome::NoRootsIdentified);
        assert_eq!(report.outcome().to_string(), "no roots identified");
    }

    #[test]
    fn test_duration_stats() {
        let intervals = vec![interval("A", 0, 9), interval("A", 100, 129)];
        let report = reduce(&analyze(&intervals, &policy()));
        let stats = report.durations.get("A").unwrap();
        assert_eq!(stats.interval_count, 2);
        assert_eq!(stats.total_firing_seconds, 40);
        assert_eq!(stats.mean_firing_seconds, 19.0);
    }

    #[test]
    fn test_mean_duration_with_overlapping_instances() {
        let mut second = interval("NodeDown", 0, 99);
        second.instance_key = r#"NodeDown{instance="n2"}"#.to_string();
        let intervals = vec![interval("NodeDown", 0, 99), second];

        let report = reduce(&analyze(&intervals, &policy()));
        let stats = report.durations.get("NodeDown").unwrap();
        assert_eq!(stats.interval_count, 2);
        assert_eq!(stats.total_firing_seconds, 100);
        assert_eq!(stats.mean_firing_seconds, 99.0);
    }

    #[test]
    fn test_report_serializes() {
        let intervals = vec![interval("A", 0, 100), interval("B", 10, 20)];
        let report = reduce(&analyze(&intervals, &policy()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["suppressible"]["B"], "A");
    }
}
