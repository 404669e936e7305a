//! Append-only storage for Variables and Operations.
pub mod operation;
pub mod registry;
pub mod types;

pub use operation::{Args, OpFailure, Operation};
pub use registry::Graph;
pub use types::{ArgKey, ArgSource, Argument, BuildMode, OpId, VarId, VarKind, VarMetadata};
