//! Time Ranges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Unix timestamp in whole seconds
pub type Timestamp = i64;

/// Current wall-clock time as a Unix timestamp
pub fn unix_now() -> Timestamp {
    Utc::now().timestamp()
}

/// Errors constructing a time range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    /// Start is not strictly before end
    #[error("Invalid time range: start {start} is not before end {end}")]
    Empty { start: Timestamp, end: Timestamp },

    /// Span does not fit into the timestamp domain
    #[error("Time span of {0:?} is out of range")]
    SpanOverflow(Duration),
}

/// A half-open window `[start, end)` of history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct TimeRange {
    start: Timestamp,
    end: Timestamp,
}

#[derive(Deserialize)]
struct RangeBounds {
    start: Timestamp,
    end: Timestamp,
}

impl TryFrom<RangeBounds> for TimeRange {
    type Error = TimeRangeError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        TimeRange::new(bounds.start, bounds.end)
    }
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted bounds
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, TimeRangeError> {
        if start >= end {
            return Err(TimeRangeError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range of length `span` ending at `end`
    pub fn ending_at(end: Timestamp, span: Duration) -> Result<Self, TimeRangeError> {
        let secs = i64::try_from(span.as_secs()).map_err(|_| TimeRangeError::SpanOverflow(span))?;
        let start = end
            .checked_sub(secs)
            .ok_or(TimeRangeError::SpanOverflow(span))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Width in seconds (always positive)
    pub fn width(&self) -> i64 {
        self.end - self.start
    }

    /// Check whether a timestamp falls inside the range
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Split into two adjacent halves, or `None` if narrower than `min_width` per half
    pub fn split_half(&self, min_width: i64) -> Option<(TimeRange, TimeRange)> {
        let half = self.width() / 2;
        if half < min_width.max(1) {
            return None;
        }
        let mid = self.start + half;
        Some((
            TimeRange { start: self.start, end: mid },
            TimeRange { start: mid, end: self.end },
        ))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            DateTime::<Utc>::from_timestamp(self.start, 0),
            DateTime::<Utc>::from_timestamp(self.end, 0),
        ) {
            (Some(start), Some(end)) => write!(f, "[{}, {})", start.to_rfc3339(), end.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start, self.end),
        }
    }
}
