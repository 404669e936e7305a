use crate::compute::handle::Handle;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Dense identifier of a Variable inside a [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// Dense identifier of an Operation inside a [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl OpId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// How an argument is passed to an operation's callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArgKey {
    Position(u32),
    Named(String),
}

impl ArgKey {
    pub fn named(name: impl Into<String>) -> Self { ArgKey::Named(name.into()) }
}

impl From<u32> for ArgKey {
    fn from(pos: u32) -> Self { ArgKey::Position(pos) }
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self { ArgKey::Named(name.to_string()) }
}

impl fmt::Display for ArgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKey::Position(p) => write!(f, "#{}", p),
            ArgKey::Named(n) => f.write_str(n),
        }
    }
}

/// Where an argument's value comes from.
#[derive(Debug, Clone)]
pub enum ArgSource<V> {
    Literal(V),
    Reference(VarId),
}

impl<V> ArgSource<V> {
    pub fn as_reference(&self) -> Option<VarId> {
        match self {
            ArgSource::Reference(id) => Some(*id),
            ArgSource::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Argument<V> {
    pub key: ArgKey,
    pub source: ArgSource<V>,
}

impl<V> Argument<V> {
    pub fn literal(key: impl Into<ArgKey>, value: V) -> Self {
        Self { key: key.into(), source: ArgSource::Literal(value) }
    }

    pub fn reference(key: impl Into<ArgKey>, var: VarId) -> Self {
        Self { key: key.into(), source: ArgSource::Reference(var) }
    }
}

/// The nature of a Variable.
///
/// Only `Derived` Variables have dependencies. `Constant` and `Deferred` are
/// resolved values; `Input` is an unbound placeholder.
#[derive(Debug, Clone)]
pub enum VarKind<V> {
    Input,
    Constant(V),
    /// A value still being produced by an executor.
    Deferred(Handle<V>),
    Derived(OpId),
}

impl<V> VarKind<V> {
    pub fn is_derived(&self) -> bool { matches!(self, VarKind::Derived(_)) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarMetadata {
    pub name: Option<String>,
}

/// Selects how [`Graph::apply_with`](super::Graph::apply_with) treats fully concrete arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildMode {
    /// Always record the application as a graph node.
    #[default]
    Lazy,
    /// Run the operation right away when every argument is concrete.
    Eager,
}
