//! Interval Coverage Arithmetic

use alert_model::Timestamp;

/// Union of half-open spans `[start, end)`, kept sorted and disjoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    spans: Vec<(Timestamp, Timestamp)>,
}

impl Coverage {
    /// Build the union of `spans`; empty spans are dropped
    pub fn from_spans(spans: impl IntoIterator<Item = (Timestamp, Timestamp)>) -> Self {
        let mut sorted: Vec<_> = spans.into_iter().filter(|(start, end)| start < end).collect();
        sorted.sort_unstable();

        let mut merged: Vec<(Timestamp, Timestamp)> = Vec::with_capacity(sorted.len());
        for (start, end) in sorted {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { spans: merged }
    }

    pub fn spans(&self) -> &[(Timestamp, Timestamp)] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Covered seconds
    pub fn total(&self) -> i64 {
        self.spans.iter().map(|(start, end)| end - start).sum()
    }

    /// Seconds covered by both
    pub fn intersection(&self, other: &Coverage) -> i64 {
        let (mut i, mut j, mut shared) = (0, 0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (a_start, a_end) = self.spans[i];
            let (b_start, b_end) = other.spans[j];
            shared += (a_end.min(b_end) - a_start.max(b_start)).max(0);
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        shared
    }

    /// Whether `[start, end)` shares at least one second with the coverage
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        let first_candidate = self.spans.partition_point(|&(_, span_end)| span_end <= start);
        self.spans
            .get(first_candidate)
            .map_or(false, |&(span_start, _)| span_start < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let coverage = Coverage::from_spans([(10, 20), (0, 5), (15, 30), (30, 31), (40, 40)]);
        assert_eq!(coverage.spans(), &[(0, 5), (10, 31)]);
        assert_eq!(coverage.total(), 26);
    }

    #[test]
    fn test_intersection() {
        let a = Coverage::from_spans([(0, 100), (200, 300)]);
        let b = Coverage::from_spans([(10, 20), (90, 210), (290, 400)]);
        assert_eq!(a.intersection(&b), 10 + 10 + 10 + 10);
        assert_eq!(b.intersection(&a), a.intersection(&b));
        assert_eq!(a.intersection(&Coverage::default()), 0);
    }

    #[test]
    fn test_overlaps() {
        let coverage = Coverage::from_spans([(0, 10), (20, 30)]);
        assert!(coverage.overlaps(5, 6));
        assert!(coverage.overlaps(25, 40));
        assert!(!coverage.overlaps(10, 20));
        assert!(!coverage.overlaps(30, 50));
    }
}
