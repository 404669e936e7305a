//! Forward evaluation with constant folding and residual-graph construction.
use super::bindings::{Binding, Bindings};
use super::dispatch::{self, ArgValue, Executor, Placement, ReadyOp};
use super::handle::Handle;
use super::ledger::{Ledger, Resolved};
use crate::analysis::telemetry::SolveStats;
use crate::analysis::topology::{self, Step};
use crate::error::EvalError;
use crate::session::{MissingInputs, Options, Outcome};
use crate::store::{ArgKey, ArgSource, Argument, Graph, OpId, VarId, VarKind};
use smallvec::smallvec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, debug_span, trace};

/// Result of one solve call.
#[derive(Debug, Clone)]
pub struct Solution {
    /// One Variable per requested output, in request order.
    pub outputs: Vec<VarId>,
    pub stats: SolveStats,
}

/// An argument after its dependency has been resolved.
struct Operand<V> {
    key: ArgKey,
    /// The referenced Variable; `None` for literals.
    origin: Option<VarId>,
    value: Resolved<V>,
}

/// Drives one solve call. All state except the graph is owned by the call.
pub struct Engine<'a, V, R> {
    graph: &'a mut Graph<V, R>,
    executor: Option<&'a dyn Executor>,
    options: &'a Options,
    ledger: Ledger<V>,
    usages: HashMap<VarId, u32>,
    requested: HashSet<VarId>,
    // Deferred wrappers created for pending values, so residuals share them.
    deferred: HashMap<VarId, VarId>,
    stats: SolveStats,
}

impl<'a, V, R> Engine<'a, V, R>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(graph: &'a mut Graph<V, R>, executor: Option<&'a dyn Executor>, options: &'a Options) -> Self {
        Self {
            graph,
            executor,
            options,
            ledger: Ledger::new(),
            usages: HashMap::new(),
            requested: HashSet::new(),
            deferred: HashMap::new(),
            stats: SolveStats::default(),
        }
    }

    /// Resolves `outputs` under `bindings`.
    ///
    /// Every Variable of the minimal subgraph is processed once, in dependency
    /// order. Operations whose arguments are all concrete run (in place or on
    /// the executor); the others are re-applied to their remaining symbolic
    /// arguments, with the concrete ones baked in as literals.
    pub fn run(mut self, outputs: &[VarId], bindings: &Bindings<V>) -> Result<Solution, EvalError> {
        let span = debug_span!("solve", outputs = outputs.len(), bindings = bindings.len());
        let _enter = span.enter();

        self.resolve_all(outputs, bindings)?;

        let mut finished: HashMap<VarId, VarId> = HashMap::with_capacity(outputs.len());
        let mut result = Vec::with_capacity(outputs.len());
        for &output in outputs {
            if let Some(&done) = finished.get(&output) {
                result.push(done);
                continue;
            }
            let done = self.finish(output, bindings);
            finished.insert(output, done);
            result.push(done);
        }

        debug!(stats = %self.stats.to_json(), "solve finished");
        Ok(Solution { outputs: result, stats: self.stats })
    }

    /// Like [`run`](Self::run), but hands resolved outputs back as values,
    /// blocking on those still being computed.
    ///
    /// No constant or deferred wrapper is appended for an output; the graph
    /// only grows when a residual has to be built.
    pub fn run_values(mut self, outputs: &[VarId], bindings: &Bindings<V>) -> Result<(Vec<Outcome<V>>, SolveStats), EvalError> {
        let span = debug_span!("evaluate", outputs = outputs.len(), bindings = bindings.len());
        let _enter = span.enter();

        self.resolve_all(outputs, bindings)?;

        let mut result = Vec::with_capacity(outputs.len());
        for &output in outputs {
            let resolved = self
                .ledger
                .get(output)
                .cloned()
                .expect("BUG: requested outputs are never released");
            result.push(match resolved {
                Resolved::Ready(value) => Outcome::Value(value),
                Resolved::Pending(handle) => Outcome::Value(handle.wait()?),
                Resolved::Symbolic(var) => Outcome::Residual(var),
            });
        }

        debug!(stats = %self.stats.to_json(), "evaluate finished");
        Ok((result, self.stats))
    }

    fn resolve_all(&mut self, outputs: &[VarId], bindings: &Bindings<V>) -> Result<(), EvalError> {
        let discovery = self.discover(outputs, bindings)?;
        if let (MissingInputs::Reject, Some(&var)) = (self.options.missing_inputs, discovery.missing.first()) {
            return Err(EvalError::UnresolvedInput { var, label: self.graph.label(var) });
        }

        self.stats.visited = discovery.order.len();
        self.stats.missing_inputs = discovery.missing.len();
        self.usages = discovery.usages;
        self.requested = outputs.iter().copied().collect();
        self.ledger = Ledger::with_capacity(self.graph.var_count());

        for &var in &discovery.order {
            let resolved = self.resolve(var, bindings)?;
            trace!(var = var.index(), concrete = resolved.is_concrete(), "resolved");
            self.ledger.insert(var, resolved);
        }
        Ok(())
    }

    fn discover(&self, outputs: &[VarId], bindings: &Bindings<V>) -> Result<topology::Discovery, EvalError> {
        let graph = &*self.graph;
        topology::discover_with(graph, outputs, |var| match bindings.get(var) {
            Some(Binding::Value(_)) | Some(Binding::Pending(_)) => Step::Leaf,
            // Composition: the bound Variable now depends on its substitute.
            Some(Binding::Variable(target)) => Step::Expand(smallvec![*target]),
            None => match graph.kind(var) {
                VarKind::Input => Step::Missing,
                VarKind::Constant(_) | VarKind::Deferred(_) => Step::Leaf,
                VarKind::Derived(_) => Step::Expand(graph.dependencies(var).collect()),
            },
        })
    }

    fn resolve(&mut self, var: VarId, bindings: &Bindings<V>) -> Result<Resolved<V>, EvalError> {
        if let Some(binding) = bindings.get(var) {
            return Ok(match binding {
                Binding::Value(v) => Resolved::Ready(v.clone()),
                Binding::Pending(handle) => Resolved::Pending(handle.clone()),
                Binding::Variable(target) => self.consume(*target),
            });
        }
        match self.graph.kind(var) {
            VarKind::Input => Ok(Resolved::Symbolic(var)),
            VarKind::Constant(v) => Ok(Resolved::Ready(v.clone())),
            VarKind::Deferred(handle) => Ok(Resolved::Pending(handle.clone())),
            VarKind::Derived(op) => {
                let op = *op;
                self.resolve_derived(var, op)
            }
        }
    }

    /// Reads a dependency's entry, releasing it after its last consumer.
    fn consume(&mut self, dep: VarId) -> Resolved<V> {
        let value = self
            .ledger
            .get(dep)
            .cloned()
            .expect("BUG: dependency must be resolved before its consumer");

        if let Some(count) = self.usages.get_mut(&dep) {
            *count = count.saturating_sub(1);
            if *count == 0
                && self.options.release_intermediates
                && !self.requested.contains(&dep)
                && self.ledger.release(dep)
            {
                self.stats.released += 1;
            }
        }
        value
    }

    fn resolve_derived(&mut self, var: VarId, op: OpId) -> Result<Resolved<V>, EvalError> {
        let args: Vec<Argument<V>> = self.graph.args(var).to_vec();
        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            let (value, origin) = match arg.source {
                ArgSource::Literal(v) => (Resolved::Ready(v), None),
                ArgSource::Reference(dep) => (self.consume(dep), Some(dep)),
            };
            operands.push(Operand { key: arg.key, origin, value });
        }

        if operands.iter().any(|o| !o.value.is_concrete()) {
            return self.residual(var, op, operands);
        }

        let concrete = operands
            .into_iter()
            .filter_map(|o| match o.value {
                Resolved::Ready(v) => Some((o.key, ArgValue::Ready(v))),
                Resolved::Pending(handle) => Some((o.key, ArgValue::Pending(handle))),
                Resolved::Symbolic(_) => None,
            })
            .collect();

        let operation = self.graph.operation(op);
        let task = ReadyOp {
            var,
            label: self.graph.label(var),
            op_name: operation.name().to_string(),
            func: operation.callable(),
            thread_safe: operation.is_thread_safe(),
            args: concrete,
        };
        let (resolved, placement) = dispatch::dispatch(task, self.executor)?;
        match placement {
            Placement::Inline => self.stats.executed_inline += 1,
            Placement::Dispatched => self.stats.dispatched += 1,
        }
        Ok(resolved)
    }

    /// Re-applies `op` to what is left symbolic, baking concrete values in.
    ///
    /// When no argument changed, the original Variable is its own residual.
    fn residual(&mut self, var: VarId, op: OpId, operands: Vec<Operand<V>>) -> Result<Resolved<V>, EvalError> {
        let folded = operands.iter().any(|o| match (&o.value, o.origin) {
            (_, None) => false,
            (Resolved::Symbolic(residual), Some(dep)) => *residual != dep,
            // A deferred Variable read through unchanged.
            (Resolved::Pending(handle), Some(dep)) => {
                !matches!(self.graph.kind(dep), VarKind::Deferred(own) if own.ptr_eq(handle))
            }
            (Resolved::Ready(_), Some(_)) => true,
        });
        if !folded {
            return Ok(Resolved::Symbolic(var));
        }

        let mut args = Vec::with_capacity(operands.len());
        for o in operands {
            args.push(match o.value {
                Resolved::Ready(v) => Argument::literal(o.key, v),
                Resolved::Symbolic(residual) => Argument::reference(o.key, residual),
                Resolved::Pending(handle) => {
                    let wrapper = match o.origin {
                        Some(dep) => self.deferred_wrapper(dep, &handle),
                        None => self.graph.deferred(handle),
                    };
                    Argument::reference(o.key, wrapper)
                }
            });
        }

        let residual = self.graph.apply(op, args)?;
        self.stats.residuals += 1;
        debug!(var = var.index(), residual = residual.index(), "created residual");
        Ok(Resolved::Symbolic(residual))
    }

    fn deferred_wrapper(&mut self, dep: VarId, handle: &Handle<V>) -> VarId {
        if let VarKind::Deferred(own) = self.graph.kind(dep) {
            if own.ptr_eq(handle) {
                return dep;
            }
        }
        if let Some(&wrapper) = self.deferred.get(&dep) {
            return wrapper;
        }
        let wrapper = self.graph.deferred(handle.clone());
        self.deferred.insert(dep, wrapper);
        wrapper
    }

    /// Wraps an output's resolution into a Variable.
    fn finish(&mut self, output: VarId, bindings: &Bindings<V>) -> VarId {
        let resolved = self
            .ledger
            .get(output)
            .cloned()
            .expect("BUG: requested outputs are never released");
        let unbound = !bindings.contains(output);

        match resolved {
            Resolved::Symbolic(var) => var,
            Resolved::Ready(value) => match self.graph.kind(output) {
                VarKind::Constant(_) if unbound => output,
                _ => self.graph.constant(value),
            },
            Resolved::Pending(handle) => self.deferred_wrapper(output, &handle),
        }
    }
}
