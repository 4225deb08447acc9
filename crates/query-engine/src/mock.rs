//! Scripted In-Process Backend
//!
//! Serves a fixed sample set, optionally failing the first requests with
//! scripted errors. Built for tests only (`test-support` feature).

use crate::backend::{MetricsBackend, Resolution};
use crate::error::BackendError;
use alert_model::{RawSample, TimeRange};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory metrics backend
pub struct MockBackend {
    samples: Vec<RawSample>,
    failures: Mutex<VecDeque<BackendError>>,
    latency: Duration,
    max_width: Option<i64>,
    calls: AtomicUsize,
    requested: Mutex<Vec<TimeRange>>,
}

impl MockBackend {
    /// Backend answering every request from `samples`
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self {
            samples,
            failures: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            max_width: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next requests with these errors, in order
    pub fn with_failures(self, failures: impl IntoIterator<Item = BackendError>) -> Self {
        if let Ok(mut queue) = self.failures.lock() {
            queue.extend(failures);
        }
        self
    }

    /// Delay every answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject ranges wider than `seconds` as exceeding the maximum resolution
    pub fn with_max_width(mut self, seconds: i64) -> Self {
        self.max_width = Some(seconds);
        self
    }

    /// Requests served so far, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ranges requested so far, in arrival order
    pub fn requested_ranges(&self) -> Vec<TimeRange> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_failure(&self) -> Option<BackendError> {
        self.failures.lock().ok().and_then(|mut queue| queue.pop_front())
    }
}

#[async_trait]
impl MetricsBackend for MockBackend {
    async fn query(
        &self,
        _selector: &str,
        range: &TimeRange,
        _resolution: Resolution,
    ) -> Result<Vec<RawSample>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(*range);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(failure) = self.next_failure() {
            return Err(failure);
        }
        if let Some(max) = self.max_width {
            if range.width() > max {
                return Err(BackendError::ResolutionExceeded(format!(
                    "exceeded maximum resolution for {}s window",
                    range.width()
                )));
            }
        }

        // Range queries evaluate both ends, so boundary samples repeat
        // across adjacent windows
        Ok(self
            .samples
            .iter()
            .filter(|s| s.timestamp >= range.start() && s.timestamp <= range.end())
            .cloned()
            .collect())
    }
}
