use super::operation::{Args, Operation};
use super::types::*;
use crate::compute::handle::Handle;
use crate::error::{EvalError, GraphError};
use std::collections::HashSet;
use tracing::trace;

/// Append-only arena holding the bipartite Variable/Operation graph.
///
/// Variables reference operations and other variables by id only. An
/// argument can only reference a Variable that already exists, so the stored
/// graph is acyclic by construction; cycles can only be introduced by binding
/// a Variable to another Variable at solve time.
#[derive(Debug, Clone)]
pub struct Graph<V, R = ()> {
    // Columnar Arrays
    kinds: Vec<VarKind<V>>,
    meta: Vec<VarMetadata>,

    // Arguments (CSR)
    args_flat: Vec<Argument<V>>,
    args_ranges: Vec<(u32, u32)>, // (start, count)

    operations: Vec<Operation<V, R>>,

    used_names: HashSet<String>,
}

impl<V, R> Default for Graph<V, R> {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            meta: Vec::new(),
            args_flat: Vec::new(),
            args_ranges: Vec::new(),
            operations: Vec::new(),
            used_names: HashSet::new(),
        }
    }
}

impl<V, R> Graph<V, R> {
    pub fn new() -> Self { Self::default() }
    pub fn var_count(&self) -> usize { self.kinds.len() }
    pub fn op_count(&self) -> usize { self.operations.len() }

    pub fn contains(&self, var: VarId) -> bool { var.index() < self.kinds.len() }

    fn push_var(&mut self, kind: VarKind<V>, args: Vec<Argument<V>>, meta: VarMetadata) -> VarId {
        let id = VarId(self.kinds.len() as u32);

        let start = self.args_flat.len() as u32;
        let count = args.len() as u32;
        self.args_flat.extend(args);
        self.args_ranges.push((start, count));

        self.kinds.push(kind);
        self.meta.push(meta);
        id
    }

    pub fn add_operation(&mut self, op: Operation<V, R>) -> OpId {
        let id = OpId(self.operations.len() as u32);
        self.operations.push(op);
        id
    }

    /// Declares an unbound input. Names are made unique by suffixing a counter.
    pub fn input(&mut self, name: impl Into<String>) -> VarId {
        let original_name = name.into();
        let mut candidate_name = original_name.clone();
        let mut counter = 1;

        while self.used_names.contains(&candidate_name) {
            candidate_name = format!("{}_{}", original_name, counter);
            counter += 1;
        }
        self.used_names.insert(candidate_name.clone());

        self.push_var(VarKind::Input, Vec::new(), VarMetadata { name: Some(candidate_name) })
    }

    pub fn constant(&mut self, value: V) -> VarId {
        self.push_var(VarKind::Constant(value), Vec::new(), VarMetadata::default())
    }

    /// Wraps a value still being computed elsewhere.
    pub fn deferred(&mut self, handle: Handle<V>) -> VarId {
        self.push_var(VarKind::Deferred(handle), Vec::new(), VarMetadata::default())
    }

    /// Records `op` applied to `args` and returns the Variable it generates.
    pub fn apply(&mut self, op: OpId, args: Vec<Argument<V>>) -> Result<VarId, GraphError> {
        if op.index() >= self.operations.len() {
            return Err(GraphError::UnknownOperation(op));
        }
        let mut seen = HashSet::with_capacity(args.len());
        for arg in &args {
            if let ArgSource::Reference(var) = arg.source {
                if !self.contains(var) {
                    return Err(GraphError::UnknownVariable(var));
                }
            }
            if !seen.insert(&arg.key) {
                return Err(GraphError::DuplicateArgument {
                    op: self.operations[op.index()].name().to_string(),
                    key: arg.key.clone(),
                });
            }
        }
        Ok(self.push_var(VarKind::Derived(op), args, VarMetadata::default()))
    }

    // --- Accessors ---
    pub fn kind(&self, var: VarId) -> &VarKind<V> { &self.kinds[var.index()] }
    pub fn meta(&self, var: VarId) -> &VarMetadata { &self.meta[var.index()] }
    pub fn operation(&self, op: OpId) -> &Operation<V, R> { &self.operations[op.index()] }

    pub fn producer(&self, var: VarId) -> Option<OpId> {
        match self.kinds[var.index()] {
            VarKind::Derived(op) => Some(op),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn args(&self, var: VarId) -> &[Argument<V>] {
        let (start, count) = self.args_ranges[var.index()];
        &self.args_flat[start as usize..(start + count) as usize]
    }

    /// Variables referenced by `var`'s arguments, in argument order.
    pub fn dependencies(&self, var: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.args(var).iter().filter_map(|a| a.source.as_reference())
    }

    pub fn is_thread_safe(&self, op: OpId) -> bool {
        self.operations[op.index()].is_thread_safe()
    }

    /// Short human-readable identity used in logs and errors.
    pub fn label(&self, var: VarId) -> String {
        if let Some(name) = &self.meta[var.index()].name {
            return name.clone();
        }
        match &self.kinds[var.index()] {
            VarKind::Derived(op) => format!("{}@{}", self.operations[op.index()].name(), var.index()),
            VarKind::Constant(_) => format!("const@{}", var.index()),
            VarKind::Deferred(_) => format!("deferred@{}", var.index()),
            VarKind::Input => format!("input@{}", var.index()),
        }
    }
}

impl<V: Clone, R> Graph<V, R> {
    /// The value of a resolved Variable, blocking on deferred ones.
    ///
    /// Returns `None` for inputs and derived Variables.
    pub fn value(&self, var: VarId) -> Option<Result<V, EvalError>> {
        match &self.kinds[var.index()] {
            VarKind::Constant(v) => Some(Ok(v.clone())),
            VarKind::Deferred(handle) => Some(handle.wait()),
            _ => None,
        }
    }

    /// Like [`apply`](Self::apply), but in [`BuildMode::Eager`] runs the operation
    /// immediately when every argument is a literal or a constant, returning a
    /// constant Variable holding the result.
    pub fn apply_with(&mut self, mode: BuildMode, op: OpId, args: Vec<Argument<V>>) -> Result<VarId, EvalError> {
        if mode == BuildMode::Lazy {
            return Ok(self.apply(op, args)?);
        }
        if op.index() >= self.operations.len() {
            return Err(GraphError::UnknownOperation(op).into());
        }

        let mut concrete = Vec::with_capacity(args.len());
        for arg in &args {
            let value = match &arg.source {
                ArgSource::Literal(v) => v.clone(),
                ArgSource::Reference(var) if self.contains(*var) => match &self.kinds[var.index()] {
                    VarKind::Constant(v) => v.clone(),
                    _ => return Ok(self.apply(op, args)?),
                },
                ArgSource::Reference(var) => return Err(GraphError::UnknownVariable(*var).into()),
            };
            concrete.push((arg.key.clone(), value));
        }

        let operation = &self.operations[op.index()];
        trace!(op = operation.name(), "eager application");
        let value = operation.call(&Args::new(concrete)).map_err(|e| EvalError::EagerExecution {
            op: operation.name().to_string(),
            source: e.into(),
        })?;
        Ok(self.constant(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_op() -> Operation<i64> {
        Operation::new("add", |a: &Args<i64>| {
            Ok(a.positionals().into_iter().sum())
        })
    }

    #[test]
    fn test_input_names_are_made_unique() {
        let mut g: Graph<i64> = Graph::new();
        let a = g.input("x");
        let b = g.input("x");
        let c = g.input("x");
        assert_eq!(g.label(a), "x");
        assert_eq!(g.label(b), "x_1");
        assert_eq!(g.label(c), "x_2");
    }

    #[test]
    fn test_introspection_of_derived_variable() {
        let mut g: Graph<i64> = Graph::new();
        let add = g.add_operation(add_op());
        let x = g.input("x");
        let s = g.apply(add, vec![Argument::reference(0, x), Argument::literal(1, 5)]).unwrap();

        assert_eq!(g.producer(s), Some(add));
        assert_eq!(g.producer(x), None);
        assert_eq!(g.dependencies(s).collect::<Vec<_>>(), vec![x]);
        assert_eq!(g.args(s).len(), 2);
        assert!(g.is_thread_safe(add));
        assert_eq!(g.label(s), format!("add@{}", s.index()));
        assert!(g.value(s).is_none());
    }

    #[test]
    fn test_apply_rejects_unknown_ids_and_duplicate_keys() {
        let mut g: Graph<i64> = Graph::new();
        let add = g.add_operation(add_op());
        let x = g.input("x");

        let err = g.apply(OpId(9), vec![]).unwrap_err();
        assert_eq!(err, GraphError::UnknownOperation(OpId(9)));

        let err = g.apply(add, vec![Argument::reference(0, VarId(42))]).unwrap_err();
        assert_eq!(err, GraphError::UnknownVariable(VarId(42)));

        let err = g.apply(add, vec![Argument::reference(0, x), Argument::literal(0, 1)]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateArgument { .. }));
    }

    #[test]
    fn test_eager_mode_folds_concrete_arguments() {
        let mut g: Graph<i64> = Graph::new();
        let add = g.add_operation(add_op());
        let two = g.constant(2);
        let v = g.apply_with(BuildMode::Eager, add, vec![Argument::reference(0, two), Argument::literal(1, 3)]).unwrap();
        assert!(matches!(g.kind(v), VarKind::Constant(5)));
        assert_eq!(g.value(v).unwrap().unwrap(), 5);
    }

    #[test]
    fn test_eager_mode_falls_back_to_lazy_with_inputs() {
        let mut g: Graph<i64> = Graph::new();
        let add = g.add_operation(add_op());
        let x = g.input("x");
        let v = g.apply_with(BuildMode::Eager, add, vec![Argument::reference(0, x), Argument::literal(1, 3)]).unwrap();
        assert!(g.kind(v).is_derived());
    }
}
