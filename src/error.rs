//! Error types for graph construction and evaluation.
use crate::store::{ArgKey, OpId, VarId};
use std::sync::Arc;
use thiserror::Error;

/// A failure reported by an operation, shared between every consumer of its result.
pub type SharedFailure = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown variable {0:?}")]
    UnknownVariable(VarId),
    #[error("Unknown operation {0:?}")]
    UnknownOperation(OpId),
    #[error("Argument '{key}' given twice to operation '{op}'")]
    DuplicateArgument { op: String, key: ArgKey },
}

#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// A Variable was reached again while still open on the exploration path.
    #[error("Cyclic dependency detected at '{label}'")]
    Cycle { var: VarId, label: String },
    #[error("Variable '{label}' has neither a binding nor a generating operation")]
    UnresolvedInput { var: VarId, label: String },
    #[error("Operation '{op}' failed while computing '{label}': {source}")]
    OperationExecution {
        var: VarId,
        label: String,
        op: String,
        #[source]
        source: SharedFailure,
    },
    /// Raised when building in eager mode, before any Variable exists.
    #[error("Operation '{op}' failed during eager application: {source}")]
    EagerExecution {
        op: String,
        #[source]
        source: SharedFailure,
    },
    #[error("Variable '{label}' is bound both statically and per iteration")]
    ConflictingBinding { var: VarId, label: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl EvalError {
    /// The Variable the error is attached to, if any.
    pub fn var(&self) -> Option<VarId> {
        match self {
            EvalError::Cycle { var, .. }
            | EvalError::UnresolvedInput { var, .. }
            | EvalError::OperationExecution { var, .. }
            | EvalError::ConflictingBinding { var, .. } => Some(*var),
            EvalError::Graph(GraphError::UnknownVariable(var)) => Some(*var),
            _ => None,
        }
    }
}
