//! Metrics Backend Contract

use crate::error::BackendError;
use alert_model::{RawSample, TimeRange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resolution tier of a sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Newer than the downsampling threshold, queried at full resolution
    Raw,
    /// Reaches past the threshold, queried against downsampled blocks
    Downsampled,
}

/// A Prometheus/Thanos-compatible range query API
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Fetch every sample of `selector` inside `range`
    async fn query(
        &self,
        selector: &str,
        range: &TimeRange,
        resolution: Resolution,
    ) -> Result<Vec<RawSample>, BackendError>;
}
