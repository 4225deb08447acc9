//! Alert Dependency Analyzer
//!
//! Scores every ordered pair of alert types by how much of one type's
//! firing time is covered by the other, and builds an acyclic dependency
//! graph where an edge `A -> B` means B is redundant given A.

mod analyzer;
mod coverage;
mod graph;
mod policy;

pub use analyzer::analyze;
pub use coverage::Coverage;
pub use graph::{AlertStats, DependencyGraph};
pub use policy::{AnalyzerError, AnalyzerPolicy};
