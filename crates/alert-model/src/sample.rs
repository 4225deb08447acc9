//! Raw Alert Samples

use crate::range::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label carrying the alert type on the `ALERTS` series
pub const ALERTNAME_LABEL: &str = "alertname";

/// Label carrying `pending` / `firing` on the `ALERTS` series
pub const ALERTSTATE_LABEL: &str = "alertstate";

/// One sample of one alert series as returned by the metrics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Alert type (the `alertname` label)
    pub alert_id: String,
    /// Full label set of the series
    pub labels: BTreeMap<String, String>,
    /// Sample timestamp (Unix seconds)
    pub timestamp: Timestamp,
    /// Sample value, > 0 while the alert is active
    pub value: f64,
}

impl RawSample {
    /// Create a new sample
    pub fn new(
        alert_id: impl Into<String>,
        labels: BTreeMap<String, String>,
        timestamp: Timestamp,
        value: f64,
    ) -> Self {
        Self {
            alert_id: alert_id.into(),
            labels,
            timestamp,
            value,
        }
    }

    /// Whether the sample marks the alert as firing.
    ///
    /// Pending alerts have not fired yet and count as inactive.
    pub fn is_firing(&self) -> bool {
        self.value > 0.0
            && self
                .labels
                .get(ALERTSTATE_LABEL)
                .map_or(true, |state| state != "pending")
    }
}
