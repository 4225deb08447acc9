//! Alert History Data Model
//!
//! Types shared by the query engine, the interval normalizer and the
//! dependency analyzer. Everything here is created and consumed within a
//! single analysis run.

mod interval;
mod range;
mod sample;
mod score;

pub use interval::FiringInterval;
pub use range::{unix_now, TimeRange, TimeRangeError, Timestamp};
pub use sample::{RawSample, ALERTNAME_LABEL, ALERTSTATE_LABEL};
pub use score::DependencyScore;
