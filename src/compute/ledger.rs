//! ledger.rs
//! Per-call memo table: one slot per Variable, discarded when the call ends.

use super::handle::Handle;
use crate::store::VarId;

/// What a Variable resolved to during one solve call.
#[derive(Debug, Clone)]
pub enum Resolved<V> {
    Ready(V),
    /// Being computed by the executor.
    Pending(Handle<V>),
    /// Still depends on unbound inputs; holds the (possibly residual) Variable.
    Symbolic(VarId),
}

impl<V> Resolved<V> {
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Resolved::Symbolic(_))
    }
}

#[derive(Debug, Clone)]
pub struct Ledger<V> {
    values: Vec<Option<Resolved<V>>>,
}

impl<V> Default for Ledger<V> {
    fn default() -> Self { Self { values: Vec::new() } }
}

impl<V> Ledger<V> {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(size: usize) -> Self {
        let mut values = Vec::with_capacity(size);
        values.resize_with(size, || None);
        Self { values }
    }

    #[inline(always)]
    pub fn get(&self, var: VarId) -> Option<&Resolved<V>> {
        self.values.get(var.index())?.as_ref()
    }

    #[inline(always)]
    pub fn insert(&mut self, var: VarId, value: Resolved<V>) {
        let idx = var.index();
        if idx >= self.values.len() {
            self.values.resize_with(idx + 1, || None);
        }
        self.values[idx] = Some(value);
    }

    /// Drops a slot once no consumer needs it. Returns whether anything was held.
    pub fn release(&mut self, var: VarId) -> bool {
        self.values.get_mut(var.index()).and_then(Option::take).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_grows_and_release_empties() {
        let mut ledger: Ledger<i32> = Ledger::with_capacity(2);
        ledger.insert(VarId(5), Resolved::Ready(1));
        assert!(matches!(ledger.get(VarId(5)), Some(Resolved::Ready(1))));
        assert!(ledger.get(VarId(1)).is_none());
        assert!(ledger.release(VarId(5)));
        assert!(!ledger.release(VarId(5)));
        assert!(ledger.get(VarId(5)).is_none());
    }
}
