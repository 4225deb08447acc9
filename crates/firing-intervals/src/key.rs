//! Alert Instance Identity

use alert_model::ALERTNAME_LABEL;
use std::collections::{BTreeMap, BTreeSet};

/// Labels that vary between samples of the same alert instance
pub const DEFAULT_IGNORED_LABELS: &[&str] = &["__name__", "alertstate", "prometheus_replica", "replica"];

/// Labels identifying an instance: everything except the alert name and
/// the ignored labels
pub fn identity_labels(
    labels: &BTreeMap<String, String>,
    ignored: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(name, _)| name.as_str() != ALERTNAME_LABEL && !ignored.contains(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Stable key `alertname{k="v",...}` with labels in lexicographic order
pub fn instance_key(alert_type: &str, identity: &BTreeMap<String, String>) -> String {
    let labels: Vec<String> = identity
        .iter()
        .map(|(name, value)| format!("{}={:?}", name, value))
        .collect();
    format!("{}{{{}}}", alert_type, labels.join(","))
}
