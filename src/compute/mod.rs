//! Resolves Variables: folding, residual construction and dispatch.
pub mod bindings;
pub mod dispatch;
pub mod engine;
pub mod handle;
pub mod ledger;

pub use bindings::{Binding, Bindings};
pub use dispatch::{Executor, Job};
pub use engine::{Engine, Solution};
pub use handle::Handle;
