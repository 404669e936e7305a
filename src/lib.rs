// Lazy functional computation graphs.
//
// A graph is built once from Operations applied to Variables, then solved
// against bindings: fully bound outputs are computed, everything else is
// folded into a smaller residual graph over the inputs still unbound.

mod error;

pub mod analysis;
pub mod compute;
pub mod requirements;
pub mod session;
pub mod store;

// --- Public API ---
pub use analysis::SolveStats;
pub use compute::{Binding, Bindings, Executor, Handle, Job, Solution};
pub use error::{EvalError, GraphError, SharedFailure};
pub use requirements::{solve_requirements, Requirement, RequirementError};
#[allow(deprecated)]
pub use session::evaluate;
pub use session::{apply, solve, solve_with, Apply, MissingInputs, Options, Outcome};
pub use store::{ArgKey, ArgSource, Argument, Args, BuildMode, Graph, OpFailure, OpId, Operation, VarId, VarKind, VarMetadata};
