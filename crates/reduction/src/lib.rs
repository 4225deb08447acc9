//! Alert Reduction
//!
//! Reads a dependency graph and reports which alert types carry
//! independent signal (roots) and which can be suppressed in favour of
//! the alert they depend on.

mod report;

pub use report::{reduce, DurationStats, ReductionOutcome, ReductionReport};
