use super::handle::Handle;
use crate::store::VarId;
use std::collections::HashMap;

/// A value supplied for a Variable at call time.
#[derive(Debug, Clone)]
pub enum Binding<V> {
    Value(V),
    /// Awaited by consuming operations.
    Pending(Handle<V>),
    /// Splices another Variable's subgraph in place of the bound one.
    Variable(VarId),
}

#[derive(Debug, Clone)]
pub struct Bindings<V> {
    entries: HashMap<VarId, Binding<V>>,
}

impl<V> Default for Bindings<V> {
    fn default() -> Self { Self { entries: HashMap::new() } }
}

impl<V> Bindings<V> {
    pub fn new() -> Self { Self::default() }

    pub fn value(mut self, var: VarId, value: V) -> Self {
        self.entries.insert(var, Binding::Value(value));
        self
    }

    pub fn pending(mut self, var: VarId, handle: Handle<V>) -> Self {
        self.entries.insert(var, Binding::Pending(handle));
        self
    }

    pub fn variable(mut self, var: VarId, target: VarId) -> Self {
        self.entries.insert(var, Binding::Variable(target));
        self
    }

    pub fn insert(&mut self, var: VarId, binding: Binding<V>) {
        self.entries.insert(var, binding);
    }

    pub fn get(&self, var: VarId) -> Option<&Binding<V>> {
        self.entries.get(&var)
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.entries.contains_key(&var)
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<V> FromIterator<(VarId, V)> for Bindings<V> {
    fn from_iter<I: IntoIterator<Item = (VarId, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k, Binding::Value(v))).collect() }
    }
}
