//! Analyzer Policy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid analyzer policy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    #[error("Minimum overlap ratio must be in (0, 1], got {0}")]
    InvalidOverlapRatio(f64),

    #[error("Sample step must be at least 1s, got {0}s")]
    InvalidSampleStep(i64),
}

/// Thresholds deciding when one alert type depends on another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerPolicy {
    /// Share of the dependent's firing time the cause must cover
    pub min_overlap_ratio: f64,
    /// Co-occurring dependent intervals required before an edge is proposed
    pub min_samples: usize,
    /// Seconds one sample stands for; each interval covers `[start, end + step)`
    pub sample_step: i64,
    /// Only intervals with the same value of this label can co-occur
    pub partition_label: Option<String>,
}

impl Default for AnalyzerPolicy {
    fn default() -> Self {
        Self {
            min_overlap_ratio: 0.9,
            min_samples: 1,
            sample_step: 60,
            partition_label: Some("cluster".to_string()),
        }
    }
}

impl AnalyzerPolicy {
    pub fn new(min_overlap_ratio: f64, min_samples: usize) -> Self {
        Self {
            min_overlap_ratio,
            min_samples,
            ..Self::default()
        }
    }

    pub fn with_sample_step(mut self, sample_step: i64) -> Self {
        self.sample_step = sample_step;
        self
    }

    /// Set the partition label; `None` puts all intervals in one scope
    pub fn with_partition_label(mut self, label: Option<String>) -> Self {
        self.partition_label = label.filter(|l| !l.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if !(self.min_overlap_ratio > 0.0 && self.min_overlap_ratio <= 1.0) {
            return Err(AnalyzerError::InvalidOverlapRatio(self.min_overlap_ratio));
        }
        if self.sample_step < 1 {
            return Err(AnalyzerError::InvalidSampleStep(self.sample_step));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(AnalyzerPolicy::default().validate().is_ok());
        assert_eq!(
            AnalyzerPolicy::new(1.5, 1).validate(),
            Err(AnalyzerError::InvalidOverlapRatio(1.5))
        );
        assert!(AnalyzerPolicy::new(f64::NAN, 1).validate().is_err());
        assert_eq!(
            AnalyzerPolicy::default().with_sample_step(0).validate(),
            Err(AnalyzerError::InvalidSampleStep(0))
        );
    }

    #[test]
    fn test_empty_partition_label_is_global() {
        let policy = AnalyzerPolicy::default().with_partition_label(Some(String::new()));
        assert_eq!(policy.partition_label, None);
    }
}
