//! Firing Intervals

use crate::range::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A closed span `[start, end]` during which one alert instance was firing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiringInterval {
    /// Alert type (alertname)
    pub alert_type: String,
    /// Stable identity of the alert instance
    pub instance_key: String,
    /// Identity labels the instance key was derived from
    pub labels: BTreeMap<String, String>,
    /// First firing timestamp
    pub start: Timestamp,
    /// Last firing timestamp (inclusive)
    pub end: Timestamp,
}

impl FiringInterval {
    /// Length in seconds; zero for a single-sample interval
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Whether two closed intervals share at least one point
    pub fn overlaps_or_touches(&self, other: &FiringInterval) -> bool {
        other.start <= self.end && self.start <= other.end
    }

    /// Look up an identity label
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}
