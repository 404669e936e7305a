//! Backward propagation of requirements from outputs to their dependencies.
//!
//! A requirement is any annotation a collaborator wants to attach to
//! Variables, e.g. the date range or the columns a downstream consumer needs.
//! Each operation maps the requirement bearing on its output onto the
//! requirement bearing on each argument; requirements arriving at a Variable
//! along different paths are merged.
use crate::analysis::topology;
use crate::error::EvalError;
use crate::store::{ArgSource, Graph, VarId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug_span, trace};

/// An annotation that can be merged along converging paths.
///
/// `merge` must be associative and commutative (up to equivalence), and should
/// be idempotent: only then is the outcome of a backward traversal independent
/// of the order in which paths reach a Variable. Compound requirements are
/// plain structs merging field by field.
pub trait Requirement: Clone {
    type Error: std::error::Error + 'static;

    fn merge(&mut self, other: &Self) -> Result<(), Self::Error>;
}

impl Requirement for () {
    type Error = std::convert::Infallible;

    fn merge(&mut self, _other: &Self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RequirementError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Traversal(#[from] EvalError),
    /// Raised by [`Requirement::merge`], passed through as is.
    #[error(transparent)]
    Merge(E),
}

/// Propagates `output_requirements` back through the graph.
///
/// Variables are visited in backward order, so every requirement reaching a
/// Variable has been merged before it is propagated further. The result maps
/// every reached Variable (outputs included) onto its merged requirement;
/// Variables reached only through operations without an argument rule are
/// absent.
pub fn solve_requirements<V, R>(
    graph: &Graph<V, R>,
    output_requirements: impl IntoIterator<Item = (VarId, R)>,
) -> Result<HashMap<VarId, R>, RequirementError<R::Error>>
where
    R: Requirement,
{
    let mut reqs: HashMap<VarId, R> = HashMap::new();
    let mut outputs = Vec::new();
    for (var, req) in output_requirements {
        accumulate(&mut reqs, var, req)?;
        outputs.push(var);
    }

    let span = debug_span!("solve_requirements", outputs = outputs.len());
    let _enter = span.enter();

    for var in topology::traverse_backward(graph, &outputs)? {
        let Some(op) = graph.producer(var) else { continue };
        let Some(req) = reqs.get(&var).cloned() else { continue };
        let operation = graph.operation(op);

        for arg in graph.args(var) {
            let ArgSource::Reference(dep) = arg.source else { continue };
            if let Some(arg_req) = operation.arg_requirements(&req, &arg.key) {
                trace!(var = var.index(), dep = dep.index(), arg = %arg.key, "propagating requirement");
                accumulate(&mut reqs, dep, arg_req)?;
            }
        }
    }

    Ok(reqs)
}

fn accumulate<R: Requirement>(reqs: &mut HashMap<VarId, R>, var: VarId, req: R) -> Result<(), RequirementError<R::Error>> {
    match reqs.entry(var) {
        Entry::Occupied(mut slot) => slot.get_mut().merge(&req).map_err(RequirementError::Merge),
        Entry::Vacant(slot) => {
            slot.insert(req);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ArgKey, Args, Argument, Operation};
    use rstest::rstest;
    use std::collections::BTreeSet;

    /// Closed day range; merging takes the hull.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Window { start: i32, end: i32 }

    /// Set of columns; merging takes the union.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Columns(BTreeSet<String>);

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Needs { window: Window, columns: Columns }

    #[derive(Debug, Error)]
    #[error("empty window {0}..{1}")]
    struct EmptyWindow(i32, i32);

    impl Requirement for Window {
        type Error = EmptyWindow;
        fn merge(&mut self, other: &Self) -> Result<(), EmptyWindow> {
            for w in [&*self, other] {
                if w.start > w.end {
                    return Err(EmptyWindow(w.start, w.end));
                }
            }
            self.start = self.start.min(other.start);
            self.end = self.end.max(other.end);
            Ok(())
        }
    }

    impl Requirement for Columns {
        type Error = std::convert::Infallible;
        fn merge(&mut self, other: &Self) -> Result<(), Self::Error> {
            self.0.extend(other.0.iter().cloned());
            Ok(())
        }
    }

    impl Requirement for Needs {
        type Error = EmptyWindow;
        fn merge(&mut self, other: &Self) -> Result<(), EmptyWindow> {
            self.window.merge(&other.window)?;
            let Ok(()) = self.columns.merge(&other.columns);
            Ok(())
        }
    }

    fn needs(start: i32, end: i32, cols: &[&str]) -> Needs {
        Needs {
            window: Window { start, end },
            columns: Columns(cols.iter().map(|c| c.to_string()).collect()),
        }
    }

    fn passthrough() -> Operation<i64, Needs> {
        Operation::new("id", |a: &Args<i64>| Ok(*a.positional(0).unwrap_or(&0)))
            .with_arg_requirements(|req: &Needs, _: &ArgKey| req.clone())
    }

    /// Shifts the window back by `lag` days and asks for one extra column.
    fn lagged(lag: i32, column: &'static str) -> Operation<i64, Needs> {
        Operation::new("lag", |a: &Args<i64>| Ok(*a.positional(0).unwrap_or(&0)))
            .with_arg_requirements(move |req: &Needs, _: &ArgKey| {
                let mut out = req.clone();
                out.window.start -= lag;
                out.window.end -= lag;
                out.columns.0.insert(column.to_string());
                out
            })
    }

    #[test]
    fn test_arg_requirements_reach_input() {
        let mut g: Graph<i64, Needs> = Graph::new();
        let op = g.add_operation(lagged(1, "close"));
        let x = g.input("x");
        let res = g.apply(op, vec![Argument::literal("a", 1), Argument::reference("b", x)]).unwrap();

        let reqs = solve_requirements(&g, [(res, needs(10, 20, &[]))]).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[&res], needs(10, 20, &[]));
        assert_eq!(reqs[&x], needs(9, 19, &["close"]));
    }

    // x feeds two branches whose requirements converge on x again.
    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_converging_paths_merge_independently_of_order(#[case] swap: bool) {
        let mut g: Graph<i64, Needs> = Graph::new();
        let sum = g.add_operation(
            Operation::new("sum", |a: &Args<i64>| Ok(a.iter().map(|(_, v)| *v).sum()))
                .with_arg_requirements(|req: &Needs, _: &ArgKey| req.clone()),
        );
        let short = g.add_operation(lagged(1, "open"));
        let long = g.add_operation(lagged(30, "close"));
        let x = g.input("x");
        let a = g.apply(short, vec![Argument::reference(0, x)]).unwrap();
        let b = g.apply(long, vec![Argument::reference(0, x)]).unwrap();
        let (first, second) = if swap { (b, a) } else { (a, b) };
        let out = g.apply(sum, vec![Argument::reference(0, first), Argument::reference(1, second)]).unwrap();

        let reqs = solve_requirements(&g, [(out, needs(100, 110, &["volume"]))]).unwrap();
        assert_eq!(reqs[&x], needs(70, 109, &["close", "open", "volume"]));
    }

    #[test]
    fn test_shared_output_merges_initial_and_propagated() {
        let mut g: Graph<i64, Needs> = Graph::new();
        let id = g.add_operation(passthrough());
        let x = g.input("x");
        let y = g.apply(id, vec![Argument::reference(0, x)]).unwrap();
        let z = g.apply(id, vec![Argument::reference(0, y)]).unwrap();

        // y is both an output and a dependency of z.
        let reqs = solve_requirements(&g, [(y, needs(0, 5, &["a"])), (z, needs(3, 9, &["b"]))]).unwrap();
        assert_eq!(reqs[&y], needs(0, 9, &["a", "b"]));
        assert_eq!(reqs[&x], needs(0, 9, &["a", "b"]));
    }

    #[test]
    fn test_operation_without_rule_stops_propagation() {
        let mut g: Graph<i64, Needs> = Graph::new();
        let opaque = g.add_operation(Operation::new("opaque", |a: &Args<i64>| Ok(*a.positional(0).unwrap_or(&0))));
        let x = g.input("x");
        let y = g.apply(opaque, vec![Argument::reference(0, x)]).unwrap();

        let reqs = solve_requirements(&g, [(y, needs(0, 1, &[]))]).unwrap();
        assert_eq!(reqs.len(), 1);
        assert!(!reqs.contains_key(&x));
    }

    #[test]
    fn test_merge_failure_is_propagated() {
        let mut g: Graph<i64, Needs> = Graph::new();
        let id = g.add_operation(passthrough());
        let broken = g.add_operation(
            Operation::new("broken", |a: &Args<i64>| Ok(*a.positional(0).unwrap_or(&0)))
                .with_arg_requirements(|_: &Needs, _: &ArgKey| needs(5, 1, &[])),
        );
        let sum = g.add_operation(
            Operation::new("sum", |a: &Args<i64>| Ok(a.iter().map(|(_, v)| *v).sum()))
                .with_arg_requirements(|req: &Needs, _: &ArgKey| req.clone()),
        );
        let x = g.input("x");
        let a = g.apply(id, vec![Argument::reference(0, x)]).unwrap();
        let b = g.apply(broken, vec![Argument::reference(0, x)]).unwrap();
        let out = g.apply(sum, vec![Argument::reference(0, a), Argument::reference(1, b)]).unwrap();

        let err = solve_requirements(&g, [(out, needs(0, 1, &[]))]).unwrap_err();
        assert!(matches!(err, RequirementError::Merge(EmptyWindow(5, 1))));
    }

    #[test]
    fn test_unit_requirement_reaches_every_dependency() {
        let mut g: Graph<i64> = Graph::new();
        let op = g.add_operation(
            Operation::new("add", |a: &Args<i64>| Ok(a.iter().map(|(_, v)| *v).sum()))
                .with_arg_requirements(|_: &(), _: &ArgKey| ()),
        );
        let x = g.input("x");
        let y = g.input("y");
        let s = g.apply(op, vec![Argument::reference(0, x), Argument::reference(1, y)]).unwrap();

        let reqs = solve_requirements(&g, [(s, ())]).unwrap();
        let mut reached: Vec<VarId> = reqs.keys().copied().collect();
        reached.sort();
        assert_eq!(reached, vec![x, y, s]);
    }
}
