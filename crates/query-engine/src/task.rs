//! Query Tasks

use crate::backend::Resolution;
use alert_model::TimeRange;
use storage::TaskId;

/// One sub-range fetch scheduled on the worker pool
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTask {
    /// Position in the split sequence, also the result store key
    pub id: TaskId,
    /// Window to fetch
    pub range: TimeRange,
    /// Series selector
    pub query: String,
    /// Resolution tier the range is queried at
    pub resolution: Resolution,
    /// Requests issued so far
    pub attempt: u32,
}

impl QueryTask {
    /// Create a task that has not been attempted yet
    pub fn new(id: TaskId, range: TimeRange, query: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            id,
            range,
            query: query.into(),
            resolution,
            attempt: 0,
        }
    }
}
