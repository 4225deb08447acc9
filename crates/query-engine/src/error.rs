//! Query Engine Error Types

use crate::task::QueryTask;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a metrics backend for a single request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// No response within the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// 4xx: the query itself is malformed
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    /// 5xx: the backend failed to answer
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Connection refused, reset or TLS failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Response body was not a valid range-query result
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Too many points per series; the range has to be narrowed
    #[error("Exceeded maximum resolution: {0}")]
    ResolutionExceeded(String),
}

impl BackendError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout(_) | BackendError::Server { .. } | BackendError::Connection(_)
        )
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "timeout",
            BackendError::Client { .. } => "client",
            BackendError::Server { .. } => "server",
            BackendError::Connection(_) => "connection",
            BackendError::Decode(_) => "decode",
            BackendError::ResolutionExceeded(_) => "resolution",
        }
    }
}

/// Why a task ended without a result
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Fetched samples could not be written through to the result store
    #[error("Result store rejected batch: {0}")]
    Store(String),
}

impl FailureCause {
    /// Permanent failures are recorded as gaps in the analyzed history
    pub fn is_transient(&self) -> bool {
        match self {
            FailureCause::Backend(err) => err.is_retryable(),
            FailureCause::Store(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FailureCause::Backend(err) => err.kind(),
            FailureCause::Store(_) => "store",
        }
    }
}

/// A task that exhausted its attempts or failed permanently
#[derive(Debug, Clone, Error)]
#[error("Query {} for {} failed after {attempts} attempt(s): {cause}", .task.id, .task.range)]
pub struct QueryError {
    pub task: QueryTask,
    pub cause: FailureCause,
    pub attempts: u32,
}

/// Invalid splitting parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("Chunk span must be at least one second, got {0:?}")]
    ZeroSpan(Duration),
}
