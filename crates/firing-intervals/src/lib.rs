//! Firing-Interval Normalization
//!
//! Turns raw samples of the alert series into closed firing intervals per
//! alert instance. Samples may arrive in any order and may repeat at
//! sub-range boundaries; the output per instance is sorted, disjoint and
//! non-touching.

mod error;
mod key;
mod normalizer;

pub use error::NormalizerError;
pub use key::{identity_labels, instance_key, DEFAULT_IGNORED_LABELS};
pub use normalizer::{join_at_boundary, merge_intervals, Normalizer, NormalizerConfig};
