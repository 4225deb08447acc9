//! Historical Query Engine
//!
//! Splits a long history window into sub-ranges that respect the backend's
//! downsampling threshold, then fetches them through a bounded worker pool
//! with per-worker pacing, timeouts and retry with exponential backoff.

mod backend;
mod backoff;
mod error;
mod executor;
#[cfg(any(test, feature = "test-support"))]
mod mock;
mod prometheus;
mod splitter;
mod task;

pub use backend::{MetricsBackend, Resolution};
pub use backoff::BackoffPolicy;
pub use error::{BackendError, FailureCause, QueryError, SplitError};
pub use executor::{ExecutorConfig, QueryExecutor, TaskOutcome};
#[cfg(any(test, feature = "test-support"))]
pub use mock::MockBackend;
pub use prometheus::{PrometheusClient, QueryParams};
pub use splitter::{split, SplitIter, SplitOrder, SplitPlan};
pub use task::QueryTask;

/// Default series selector: Prometheus' synthetic alert series
pub const DEFAULT_SELECTOR: &str = "ALERTS";
