//! One-shot result slot shared between the scheduling thread and executor jobs.
//!
//! A `Handle` is both what the engine consumes (a pending binding supplied by
//! the caller) and what it produces (the result of a dispatched operation).
use crate::error::EvalError;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

struct Slot<V> {
    value: Mutex<Option<Result<V, EvalError>>>,
    ready: Condvar,
}

pub struct Handle<V> {
    slot: Arc<Slot<V>>,
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<V> Default for Handle<V> {
    fn default() -> Self { Self::new() }
}

impl<V> Handle<V> {
    /// An empty handle, to be completed exactly once.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot { value: Mutex::new(None), ready: Condvar::new() }),
        }
    }

    pub fn ready(value: V) -> Self {
        let handle = Self::new();
        handle.complete(Ok(value));
        handle
    }

    /// Stores the result and wakes every waiter. Later completions are ignored.
    pub fn complete(&self, result: Result<V, EvalError>) {
        let mut guard = self.slot.value.lock();
        if guard.is_none() {
            *guard = Some(result);
            self.slot.ready.notify_all();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<V: Clone> Handle<V> {
    /// Blocks until the result is available. Safe to call from inside an executor job.
    pub fn wait(&self) -> Result<V, EvalError> {
        let mut guard = self.slot.value.lock();
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            self.slot.ready.wait(&mut guard);
        }
    }

    pub fn try_get(&self) -> Option<Result<V, EvalError>> {
        self.slot.value.lock().clone()
    }
}

impl<V> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("ready", &self.is_ready()).finish()
    }
}
