//! Normalizer Error Types

use thiserror::Error;

/// Invalid normalizer settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizerError {
    /// Gap tolerance has to cover at least one second
    #[error("Gap tolerance must be at least 1s, got {0}s")]
    InvalidGapTolerance(i64),
}
