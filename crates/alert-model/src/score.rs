//! Dependency Scores

use serde::{Deserialize, Serialize};

/// Overlap statistics for an ordered pair of alert types.
///
/// `overlap_ratio` is the share of `to_type`'s firing time during which
/// `from_type` was also firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyScore {
    pub from_type: String,
    pub to_type: String,
    /// In `[0, 1]`
    pub overlap_ratio: f64,
    /// Number of `to_type` intervals that co-occur with `from_type`
    pub sample_count: usize,
}

impl DependencyScore {
    /// Whether the score is strong and frequent enough to propose an edge
    pub fn qualifies(&self, min_overlap_ratio: f64, min_samples: usize) -> bool {
        self.sample_count >= min_samples && self.overlap_ratio >= min_overlap_ratio
    }
}
