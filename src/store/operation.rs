//! Operations: pure callables relating argument values to one output value.
use super::types::ArgKey;
use std::fmt;
use std::sync::Arc;

/// Failure reported by an operation's callable.
pub type OpFailure = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type Callable<V> = dyn Fn(&Args<V>) -> Result<V, OpFailure> + Send + Sync;
type ArgRequirementsFn<R> = dyn Fn(&R, &ArgKey) -> R + Send + Sync;

/// A named, pure function over an ordered list of (positional or named) arguments.
///
/// Operations must not mutate their arguments nor keep observable state. The
/// engine relies on this but cannot check it.
pub struct Operation<V, R = ()> {
    name: String,
    func: Arc<Callable<V>>,
    thread_safe: bool,
    arg_requirements: Option<Arc<ArgRequirementsFn<R>>>,
}

impl<V, R> Operation<V, R> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Args<V>) -> Result<V, OpFailure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            thread_safe: true,
            arg_requirements: None,
        }
    }

    /// Marks the callable as unsafe to run on a worker thread.
    pub fn thread_unsafe(mut self) -> Self {
        self.thread_safe = false;
        self
    }

    /// Attaches the rule mapping an output requirement onto the requirement of one argument.
    pub fn with_arg_requirements<F>(mut self, rule: F) -> Self
    where
        F: Fn(&R, &ArgKey) -> R + Send + Sync + 'static,
    {
        self.arg_requirements = Some(Arc::new(rule));
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn is_thread_safe(&self) -> bool { self.thread_safe }
    pub fn has_arg_requirements(&self) -> bool { self.arg_requirements.is_some() }

    pub fn call(&self, args: &Args<V>) -> Result<V, OpFailure> {
        (self.func)(args)
    }

    /// Shared handle on the callable, for jobs that outlive the graph borrow.
    pub(crate) fn callable(&self) -> Arc<Callable<V>> {
        Arc::clone(&self.func)
    }

    /// `None` when the operation propagates no requirement past itself.
    pub fn arg_requirements(&self, req: &R, key: &ArgKey) -> Option<R> {
        self.arg_requirements.as_ref().map(|rule| rule(req, key))
    }
}

impl<V, R> Clone for Operation<V, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
            thread_safe: self.thread_safe,
            arg_requirements: self.arg_requirements.clone(),
        }
    }
}

impl<V, R> fmt::Debug for Operation<V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("thread_safe", &self.thread_safe)
            .field("arg_requirements", &self.arg_requirements.is_some())
            .finish()
    }
}

/// The concrete argument values handed to a callable.
#[derive(Debug, Clone)]
pub struct Args<V> {
    entries: Vec<(ArgKey, V)>,
}

impl<V> Args<V> {
    pub fn new(entries: Vec<(ArgKey, V)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &ArgKey) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn positional(&self, pos: u32) -> Option<&V> {
        self.get(&ArgKey::Position(pos))
    }

    pub fn named(&self, name: &str) -> Option<&V> {
        self.entries.iter().find_map(|(k, v)| match k {
            ArgKey::Named(n) if n == name => Some(v),
            _ => None,
        })
    }

    /// Positional values in position order.
    pub fn positionals(&self) -> Vec<&V> {
        let mut pos: Vec<(u32, &V)> = self.entries.iter()
            .filter_map(|(k, v)| match k { ArgKey::Position(p) => Some((*p, v)), _ => None })
            .collect();
        pos.sort_by_key(|(p, _)| *p);
        pos.into_iter().map(|(_, v)| v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ArgKey, V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_lookup_by_position_and_name() {
        let args = Args::new(vec![
            (ArgKey::named("scale"), 3),
            (ArgKey::Position(1), 20),
            (ArgKey::Position(0), 10),
        ]);
        assert_eq!(args.positional(0), Some(&10));
        assert_eq!(args.named("scale"), Some(&3));
        assert_eq!(args.named("missing"), None);
        assert_eq!(args.positionals(), vec![&10, &20]);
    }

    #[test]
    fn test_operation_defaults_to_thread_safe_without_requirements() {
        let op: Operation<i64> = Operation::new("neg", |a: &Args<i64>| Ok(-a.positional(0).copied().unwrap_or(0)));
        assert!(op.is_thread_safe());
        assert!(op.arg_requirements(&(), &ArgKey::Position(0)).is_none());
        assert!(!op.clone().thread_unsafe().is_thread_safe());
        assert_eq!(op.call(&Args::new(vec![(ArgKey::Position(0), 4)])).unwrap(), -4);
    }
}
