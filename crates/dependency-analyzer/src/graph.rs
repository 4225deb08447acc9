//! Dependency Graph
//!
//! Edge resolution turns qualifying scores into a forest: mutual pairs keep
//! one direction, cycles lose their weakest edge and every node keeps at
//! most its strongest inbound edge.

use alert_model::DependencyScore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Firing statistics of one alert type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    /// Normalized intervals
    pub interval_count: usize,
    /// Seconds during which at least one instance was firing
    pub firing_seconds: i64,
    /// Sum of `end - start` over the normalized intervals
    pub interval_seconds: i64,
}

type EdgeKey = (String, String);

/// Directed acyclic dependency relation over alert types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    stats: BTreeMap<String, AlertStats>,
    /// Retained edges, ordered by (from, to)
    edges: Vec<DependencyScore>,
    /// Every pair with at least one co-occurrence
    scores: Vec<DependencyScore>,
}

impl DependencyGraph {
    pub(crate) fn new(
        stats: BTreeMap<String, AlertStats>,
        scores: Vec<DependencyScore>,
        min_overlap_ratio: f64,
        min_samples: usize,
    ) -> Self {
        let edges = resolve_edges(&scores, &stats, min_overlap_ratio, min_samples);
        Self { stats, edges, scores }
    }

    /// Alert types observed in the history
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.stats.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn edges(&self) -> &[DependencyScore] {
        &self.edges
    }

    /// All computed pair scores, retained or not
    pub fn scores(&self) -> &[DependencyScore] {
        &self.scores
    }

    pub fn stats(&self, alert_type: &str) -> Option<&AlertStats> {
        self.stats.get(alert_type)
    }

    pub fn all_stats(&self) -> &BTreeMap<String, AlertStats> {
        &self.stats
    }

    /// The retained edge pointing at `alert_type`, if any
    pub fn parent_of(&self, alert_type: &str) -> Option<&DependencyScore> {
        self.edges.iter().find(|edge| edge.to_type == alert_type)
    }

    /// Whether the retained edges contain a cycle
    pub fn has_cycle(&self) -> bool {
        let edges: BTreeMap<EdgeKey, f64> = self
            .edges
            .iter()
            .map(|e| ((e.from_type.clone(), e.to_type.clone()), e.overlap_ratio))
            .collect();
        find_cycle(&edges).is_some()
    }
}

/// Select the edges to keep from the scored pairs
pub(crate) fn resolve_edges(
    scores: &[DependencyScore],
    stats: &BTreeMap<String, AlertStats>,
    min_overlap_ratio: f64,
    min_samples: usize,
) -> Vec<DependencyScore> {
    let proposed: BTreeMap<EdgeKey, &DependencyScore> = scores
        .iter()
        .filter(|score| score.from_type != score.to_type)
        .filter(|score| score.qualifies(min_overlap_ratio, min_samples))
        .map(|score| ((score.from_type.clone(), score.to_type.clone()), score))
        .collect();

    let firing_seconds = |alert: &str| stats.get(alert).map_or(0, |s| s.firing_seconds);

    // Mutual containment: the more persistent alert is the cause
    let mut edges: BTreeMap<EdgeKey, f64> = BTreeMap::new();
    for ((from, to), score) in &proposed {
        if proposed.contains_key(&(to.clone(), from.clone())) {
            let keep = match firing_seconds(from).cmp(&firing_seconds(to)) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => from < to,
            };
            if !keep {
                debug!("Mutual dependency {} <-> {}: keeping {} -> {}", from, to, to, from);
                continue;
            }
        }
        edges.insert((from.clone(), to.clone()), score.overlap_ratio);
    }

    while let Some(cycle) = find_cycle(&edges) {
        let weakest = cycle.into_iter().min_by(|a, b| {
            let ratio = |edge: &EdgeKey| edges.get(edge).copied().unwrap_or(0.0);
            ratio(a)
                .total_cmp(&ratio(b))
                // lexicographically lowest alert type becomes the root
                .then_with(|| a.1.cmp(&b.1))
        });
        let Some(weakest) = weakest else {
            break;
        };
        debug!("Breaking dependency cycle at {} -> {}", weakest.0, weakest.1);
        edges.remove(&weakest);
    }

    // One cause per dependent: highest ratio, then lowest source name
    let mut inbound: BTreeMap<String, (String, f64)> = BTreeMap::new();
    for ((from, to), ratio) in edges {
        match inbound.get(&to) {
            Some((_, best)) if *best >= ratio => {}
            _ => {
                inbound.insert(to, (from, ratio));
            }
        }
    }

    let mut retained: Vec<DependencyScore> = inbound
        .into_iter()
        .filter_map(|(to, (from, _))| proposed.get(&(from, to)).map(|score| (*score).clone()))
        .collect();
    retained.sort_by(|a, b| (&a.from_type, &a.to_type).cmp(&(&b.from_type, &b.to_type)));
    retained
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// First cycle found by a depth-first search in node order, as its edges
fn find_cycle(edges: &BTreeMap<EdgeKey, f64>) -> Option<Vec<EdgeKey>> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (from, to) in edges.keys() {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }

    let mut state: BTreeMap<&str, Visit> = BTreeMap::new();
    for &node in adjacency.keys() {
        if state.contains_key(node) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(node, &adjacency, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    adjacency: &BTreeMap<&'a str, Vec<&'a str>>,
    state: &mut BTreeMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<EdgeKey>> {
    state.insert(node, Visit::InProgress);
    path.push(node);

    for &next in adjacency.get(node).into_iter().flatten() {
        match state.get(next).copied() {
            Some(Visit::InProgress) => {
                let position = path.iter().position(|&n| n == next)?;
                let mut cycle: Vec<EdgeKey> = path[position..]
                    .windows(2)
                    .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                    .collect();
                cycle.push((node.to_string(), next.to_string()));
                return Some(cycle);
            }
            Some(Visit::Done) => {}
            None => {
                if let Some(cycle) = visit(next, adjacency, state, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    state.insert(node, Visit::Done);
    None
}
