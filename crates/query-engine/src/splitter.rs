//! Time-Range Splitter
//!
//! Cuts a history window into disjoint sub-ranges. Data older than
//! `now - threshold_age` is only served downsampled, so that part is cut
//! into chunks no wider than `max_span`, and no chunk straddles the
//! threshold. Newer data is cut into `recent_span` chunks.

use crate::backend::Resolution;
use crate::error::SplitError;
use crate::task::QueryTask;
use alert_model::{TimeRange, Timestamp};
use std::time::Duration;

/// Emission order of the sub-ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitOrder {
    /// Most recent chunk first
    #[default]
    NewestFirst,
    /// Oldest chunk first
    OldestFirst,
}

/// Splitting parameters, fixed for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    /// Start of downsampled history; `None` when the backend never downsamples
    boundary: Option<Timestamp>,
    /// Chunk width for full-resolution data (seconds)
    recent_span: i64,
    /// Chunk width for data older than the boundary (seconds)
    max_span: i64,
    order: SplitOrder,
}

fn span_secs(span: Duration) -> Result<i64, SplitError> {
    match i64::try_from(span.as_secs()) {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(SplitError::ZeroSpan(span)),
    }
}

impl SplitPlan {
    /// Create a plan relative to `now`
    pub fn new(
        now: Timestamp,
        threshold_age: Option<Duration>,
        max_span: Duration,
        recent_span: Duration,
    ) -> Result<Self, SplitError> {
        let boundary = threshold_age.map(|age| {
            let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
            now.saturating_sub(age)
        });

        Ok(Self {
            boundary,
            recent_span: span_secs(recent_span)?,
            max_span: span_secs(max_span)?,
            order: SplitOrder::default(),
        })
    }

    /// Change the emission order
    pub fn with_order(mut self, order: SplitOrder) -> Self {
        self.order = order;
        self
    }

    /// Timestamp before which the backend serves downsampled data
    pub fn boundary(&self) -> Option<Timestamp> {
        self.boundary
    }

    /// Resolution tier a sub-range has to be queried at
    pub fn tier(&self, range: &TimeRange) -> Resolution {
        match self.boundary {
            Some(boundary) if range.start() < boundary => Resolution::Downsampled,
            _ => Resolution::Raw,
        }
    }

    /// Lazily split `total`; restartable since it only depends on its inputs
    pub fn split(&self, total: TimeRange) -> SplitIter {
        let cursor = match self.order {
            SplitOrder::NewestFirst => total.end(),
            SplitOrder::OldestFirst => total.start(),
        };
        SplitIter {
            plan: *self,
            total,
            cursor,
            single: self.fits_one_chunk(&total),
            done: false,
        }
    }

    /// Whether `total` lies on one side of the boundary and within that
    /// side's chunk width
    fn fits_one_chunk(&self, total: &TimeRange) -> bool {
        match self.boundary {
            Some(boundary) if total.end() <= boundary => total.width() <= self.max_span,
            Some(boundary) if total.start() < boundary => false,
            _ => total.width() <= self.recent_span,
        }
    }

    /// Split `total` into numbered query tasks for `selector`
    pub fn tasks<'a>(
        &'a self,
        total: TimeRange,
        selector: &'a str,
    ) -> impl Iterator<Item = QueryTask> + 'a {
        self.split(total)
            .zip(0u64..)
            .map(move |(range, id)| QueryTask::new(id, range, selector, self.tier(&range)))
    }
}

/// Split with a single chunk width on both sides of the threshold
pub fn split(
    total: TimeRange,
    threshold_age: Option<Duration>,
    max_span: Duration,
    now: Timestamp,
) -> Result<SplitIter, SplitError> {
    Ok(SplitPlan::new(now, threshold_age, max_span, max_span)?.split(total))
}

/// Iterator over the sub-ranges of one split
#[derive(Debug, Clone)]
pub struct SplitIter {
    plan: SplitPlan,
    total: TimeRange,
    cursor: Timestamp,
    single: bool,
    done: bool,
}

impl SplitIter {
    fn next_newest_first(&mut self) -> Option<(Timestamp, Timestamp)> {
        if self.cursor <= self.total.start() {
            return None;
        }
        let end = self.cursor;
        let (span, floor) = match self.plan.boundary {
            Some(boundary) if end <= boundary => (self.plan.max_span, self.total.start()),
            Some(boundary) => (self.plan.recent_span, self.total.start().max(boundary)),
            None => (self.plan.recent_span, self.total.start()),
        };
        let start = end.saturating_sub(span).max(floor);
        self.cursor = start;
        Some((start, end))
    }

    fn next_oldest_first(&mut self) -> Option<(Timestamp, Timestamp)> {
        if self.cursor >= self.total.end() {
            return None;
        }
        let start = self.cursor;
        let old = matches!(self.plan.boundary, Some(boundary) if start < boundary);
        let span = if old { self.plan.max_span } else { self.plan.recent_span };
        let mut end = start.saturating_add(span).min(self.total.end());
        if let (true, Some(boundary)) = (old, self.plan.boundary) {
            end = end.min(boundary);
        }
        self.cursor = end;
        Some((start, end))
    }
}

impl Iterator for SplitIter {
    type Item = TimeRange;

    fn next(&mut self) -> Option<TimeRange> {
        if self.done {
            return None;
        }
        if self.single {
            self.done = true;
            return Some(self.total);
        }

        let bounds = match self.plan.order {
            SplitOrder::NewestFirst => self.next_newest_first(),
            SplitOrder::OldestFirst => self.next_oldest_first(),
        };
        match bounds.and_then(|(start, end)| TimeRange::new(start, end).ok()) {
            Some(range) => Some(range),
            None => {
                self.done = true;
                None
            }
        }
    }
}
