use crate::error::{EvalError, GraphError};
use crate::store::{Graph, VarId, VarKind};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};

pub(crate) type Edges = SmallVec<[VarId; 4]>;

/// What the traversal does when it reaches a Variable.
pub(crate) enum Step {
    /// A resolved boundary node: no further exploration.
    Leaf,
    /// An unbound input with nothing to produce it.
    Missing,
    Expand(Edges),
}

/// The minimal subgraph needed for a set of outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Every Variable appears after all of its (unpruned) dependencies.
    pub order: Vec<VarId>,
    /// Reachable inputs with neither a binding nor a generating operation.
    pub missing: Vec<VarId>,
    /// Number of edges pointing at each Variable from inside the subgraph.
    pub usages: HashMap<VarId, u32>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting, // Used for cycle detection
    Visited,
}

/// Performs a forward traversal from `outputs`, treating `bound` Variables as leaves.
///
/// Returns the Variables in dependency-first order. Ties between independent
/// branches follow argument order, so the result is stable for a given graph.
pub fn discover<V, R>(graph: &Graph<V, R>, outputs: &[VarId], bound: &HashSet<VarId>) -> Result<Discovery, EvalError> {
    discover_with(graph, outputs, |var| {
        if bound.contains(&var) {
            return Step::Leaf;
        }
        match graph.kind(var) {
            VarKind::Input => Step::Missing,
            VarKind::Constant(_) | VarKind::Deferred(_) => Step::Leaf,
            VarKind::Derived(_) => Step::Expand(graph.dependencies(var).collect()),
        }
    })
}

/// Depth-first post-order over an arbitrary edge function.
///
/// Uses an explicit path stack rather than recursion so long dependency chains
/// cannot exhaust the call stack.
pub(crate) fn discover_with<V, R, F>(graph: &Graph<V, R>, outputs: &[VarId], mut step: F) -> Result<Discovery, EvalError>
where
    F: FnMut(VarId) -> Step,
{
    let mut state = vec![VisitState::None; graph.var_count()];
    let mut discovery = Discovery::default();
    let mut path: Vec<(VarId, Edges, usize)> = Vec::new();

    for &output in outputs {
        if !graph.contains(output) {
            return Err(GraphError::UnknownVariable(output).into());
        }
        if state[output.index()] == VisitState::Visited {
            continue;
        }

        open(output, &mut state, &mut path, &mut discovery, &mut step);

        while let Some((var, edges, next)) = path.last_mut() {
            if *next < edges.len() {
                let dep = edges[*next];
                *next += 1;

                if !graph.contains(dep) {
                    return Err(GraphError::UnknownVariable(dep).into());
                }
                match state[dep.index()] {
                    VisitState::Visited => {}
                    VisitState::Visiting => {
                        return Err(EvalError::Cycle { var: dep, label: graph.label(dep) });
                    }
                    VisitState::None => open(dep, &mut state, &mut path, &mut discovery, &mut step),
                }
            } else {
                let var = *var;
                for dep in edges.iter() {
                    *discovery.usages.entry(*dep).or_insert(0) += 1;
                }
                path.pop();
                state[var.index()] = VisitState::Visited;
                discovery.order.push(var);
            }
        }
    }

    Ok(discovery)
}

fn open<F>(
    var: VarId,
    state: &mut [VisitState],
    path: &mut Vec<(VarId, Edges, usize)>,
    discovery: &mut Discovery,
    step: &mut F,
) where
    F: FnMut(VarId) -> Step,
{
    state[var.index()] = VisitState::Visiting;
    let edges = match step(var) {
        Step::Leaf => Edges::new(),
        Step::Missing => {
            discovery.missing.push(var);
            Edges::new()
        }
        Step::Expand(edges) => edges,
    };
    path.push((var, edges, 0));
}

/// Number of consumers of each Variable among the Variables of `order`.
///
/// Every argument counts, so `g(y, y)` uses `y` twice. Variables nobody in
/// `order` consumes are absent.
pub fn usage_counts<V, R>(graph: &Graph<V, R>, order: &[VarId]) -> HashMap<VarId, u32> {
    let mut usages = HashMap::with_capacity(order.len());
    for &var in order {
        for dep in graph.dependencies(var) {
            *usages.entry(dep).or_insert(0) += 1;
        }
    }
    usages
}

/// Backward traversal: every Variable is yielded after all Variables of the
/// subgraph that depend on it.
///
/// An output that is also a dependency of another output is only yielded once
/// all its consumers have been.
pub fn traverse_backward<V, R>(graph: &Graph<V, R>, outputs: &[VarId]) -> Result<Vec<VarId>, EvalError> {
    let discovery = discover(graph, outputs, &HashSet::new())?;
    let mut usages = usage_counts(graph, &discovery.order);

    let mut seeded = HashSet::new();
    let mut queue: VecDeque<VarId> = outputs
        .iter()
        .copied()
        .filter(|v| usages.get(v).copied().unwrap_or(0) == 0 && seeded.insert(*v))
        .collect();
    let mut order = Vec::with_capacity(discovery.order.len());

    while let Some(var) = queue.pop_front() {
        for dep in graph.dependencies(var) {
            if let Some(count) = usages.get_mut(&dep) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dep);
                }
            }
        }
        order.push(var);
    }

    Ok(order)
}
