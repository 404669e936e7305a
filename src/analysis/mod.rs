//! Graph traversals and per-call diagnostics.
pub mod telemetry;
pub mod topology;

pub use telemetry::SolveStats;
pub use topology::{discover, traverse_backward, usage_counts, Discovery};
