//! Public entry points: solving, evaluating and iterating computation graphs.
//!
//! All state created by a call (memo table, usage counts) lives and dies with
//! that call; the only lasting effect is that residual and constant Variables
//! are appended to the graph.
use crate::compute::bindings::Bindings;
use crate::compute::dispatch::Executor;
use crate::compute::engine::{Engine, Solution};
use crate::error::EvalError;
use crate::store::{Graph, VarId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// What to do with a reachable input that has no binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInputs {
    /// Keep it symbolic and return a residual graph.
    #[default]
    Residual,
    /// Fail with [`EvalError::UnresolvedInput`].
    Reject,
}

/// Per-call settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub missing_inputs: MissingInputs,
    /// Drop intermediate results as soon as their last consumer has read them.
    pub release_intermediates: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { missing_inputs: MissingInputs::Residual, release_intermediates: true }
    }
}

impl Options {
    pub fn strict() -> Self {
        Self { missing_inputs: MissingInputs::Reject, ..Self::default() }
    }
}

/// Resolves `outputs`, returning one Variable per output.
///
/// Fully resolved outputs come back as constant (or, with an executor, deferred)
/// Variables whose value is read with [`Graph::value`]; the others come back as
/// residual Variables depending only on inputs that are still unbound.
pub fn solve<V, R>(
    graph: &mut Graph<V, R>,
    outputs: &[VarId],
    bindings: &Bindings<V>,
    executor: Option<&dyn Executor>,
) -> Result<Vec<VarId>, EvalError>
where
    V: Clone + Send + Sync + 'static,
{
    Ok(solve_with(graph, outputs, bindings, executor, &Options::default())?.outputs)
}

pub fn solve_with<V, R>(
    graph: &mut Graph<V, R>,
    outputs: &[VarId],
    bindings: &Bindings<V>,
    executor: Option<&dyn Executor>,
    options: &Options,
) -> Result<Solution, EvalError>
where
    V: Clone + Send + Sync + 'static,
{
    Engine::new(graph, executor, options).run(outputs, bindings)
}

/// Either a value or the residual Variable of a partially resolved output.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    Value(V),
    Residual(VarId),
}

impl<V> Outcome<V> {
    pub fn value(self) -> Option<V> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Residual(_) => None,
        }
    }
}

/// Evaluates `outputs`, blocking on any result still being computed.
///
/// Resolved outputs come back as values and leave the graph untouched.
#[deprecated(note = "the result type is ambiguous for partially bound graphs; use `solve`")]
pub fn evaluate<V, R>(
    graph: &mut Graph<V, R>,
    outputs: &[VarId],
    bindings: &Bindings<V>,
    executor: Option<&dyn Executor>,
) -> Result<Vec<Outcome<V>>, EvalError>
where
    V: Clone + Send + Sync + 'static,
{
    let options = Options::default();
    let (outcomes, stats) = Engine::new(graph, executor, &options).run_values(outputs, bindings)?;
    if stats.missing_inputs > 0 {
        warn!(
            missing = stats.missing_inputs,
            "evaluate called with unbound inputs, some outputs are returned as residual variables"
        );
    }
    Ok(outcomes)
}

/// Iterates over a sequence of bindings.
///
/// The outputs are first solved under `static_bindings`; every element of
/// `iter_bindings` then only resolves what that first pass left symbolic.
/// Each element yields one [`Outcome`] per output. Fully resolved elements
/// append nothing to the graph.
pub fn apply<'g, V, R, I>(
    graph: &'g mut Graph<V, R>,
    outputs: &[VarId],
    static_bindings: &Bindings<V>,
    iter_bindings: I,
    executor: Option<&'g dyn Executor>,
) -> Result<Apply<'g, V, R, I::IntoIter>, EvalError>
where
    V: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Bindings<V>>,
{
    let residuals = solve(graph, outputs, static_bindings, executor)?;
    Ok(Apply {
        graph,
        residuals,
        static_vars: static_bindings.vars().collect(),
        iter: iter_bindings.into_iter(),
        executor,
        options: Options::default(),
    })
}

pub struct Apply<'g, V, R, I> {
    graph: &'g mut Graph<V, R>,
    residuals: Vec<VarId>,
    static_vars: HashSet<VarId>,
    iter: I,
    executor: Option<&'g dyn Executor>,
    options: Options,
}

impl<'g, V, R, I> Apply<'g, V, R, I> {
    /// The outputs as simplified by the static bindings.
    pub fn residuals(&self) -> &[VarId] {
        &self.residuals
    }

    pub fn graph(&self) -> &Graph<V, R> {
        &*self.graph
    }
}

impl<'g, V, R, I> Iterator for Apply<'g, V, R, I>
where
    V: Clone + Send + Sync + 'static,
    I: Iterator<Item = Bindings<V>>,
{
    type Item = Result<Vec<Outcome<V>>, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bindings = self.iter.next()?;
        if let Some(var) = bindings.vars().find(|v| self.static_vars.contains(v)) {
            // Bindings may name Variables the graph never had.
            let label = if self.graph.contains(var) { self.graph.label(var) } else { format!("{:?}", var) };
            return Some(Err(EvalError::ConflictingBinding { var, label }));
        }
        let engine = Engine::new(&mut *self.graph, self.executor, &self.options);
        Some(engine.run_values(&self.residuals, &bindings).map(|(outcomes, _)| outcomes))
    }
}
