//! Hands ready operations to a caller-owned executor, or runs them in place.
use super::handle::Handle;
use super::ledger::Resolved;
use crate::error::EvalError;
use crate::store::operation::Callable;
use crate::store::{ArgKey, Args, VarId};
use std::sync::Arc;
use tracing::debug;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Capability the engine needs from a thread pool.
///
/// The pool is created, owned and shut down by the caller. Jobs may block on
/// handles produced by jobs submitted earlier, so an executor must start jobs
/// in submission order (FIFO); a bounded pool then always has a runnable job.
pub trait Executor: Sync {
    fn execute(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl<E: Executor + Send + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl Executor for rayon::ThreadPool {
    fn execute(&self, job: Job) {
        self.spawn_fifo(job)
    }
}

/// An argument value at dispatch time.
pub(crate) enum ArgValue<V> {
    Ready(V),
    Pending(Handle<V>),
}

/// An operation whose arguments are all concrete or pending.
pub(crate) struct ReadyOp<V> {
    pub var: VarId,
    pub label: String,
    pub op_name: String,
    pub func: Arc<Callable<V>>,
    pub thread_safe: bool,
    pub args: Vec<(ArgKey, ArgValue<V>)>,
}

impl<V: Clone> ReadyOp<V> {
    /// Awaits pending arguments, then invokes the callable.
    fn run(self) -> Result<V, EvalError> {
        let mut entries = Vec::with_capacity(self.args.len());
        for (key, value) in self.args {
            let value = match value {
                ArgValue::Ready(v) => v,
                ArgValue::Pending(handle) => handle.wait()?,
            };
            entries.push((key, value));
        }
        (self.func)(&Args::new(entries)).map_err(|e| EvalError::OperationExecution {
            var: self.var,
            label: self.label,
            op: self.op_name,
            source: e.into(),
        })
    }
}

/// Whether a call ran in place or went to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Inline,
    Dispatched,
}

/// Runs `task` according to its thread-safety and the executor supplied.
///
/// Thread-unsafe operations never reach the executor: they run on the calling
/// thread after synchronously awaiting their pending arguments.
pub(crate) fn dispatch<V>(task: ReadyOp<V>, executor: Option<&dyn Executor>) -> Result<(Resolved<V>, Placement), EvalError>
where
    V: Clone + Send + Sync + 'static,
{
    match executor {
        Some(executor) if task.thread_safe => {
            debug!(var = task.var.index(), op = %task.op_name, "dispatching to executor");
            let handle = Handle::new();
            let slot = handle.clone();
            executor.execute(Box::new(move || slot.complete(task.run())));
            Ok((Resolved::Pending(handle), Placement::Dispatched))
        }
        _ => Ok((Resolved::Ready(task.run()?), Placement::Inline)),
    }
}
