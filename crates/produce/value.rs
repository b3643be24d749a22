//! The dynamic value model the draft engine edits.
//!
//! Aggregates hold persistent structures behind `Arc`s, so cloning a value
//! is cheap and two clones of the same version share identity. [`Value::same`]
//! is that identity test; `PartialEq` is structural.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_collections::{OrdMap, OrdSet, PVec};

use crate::dispatch::Kind;
use crate::key::Key;

/// String-keyed plain aggregate ("object" in the host model).
pub type Record = BTreeMap<String, Value>;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(PVec<Value>),
    Map(OrdMap<Key, Value>),
    Set(OrdSet<Key>),
    Record(Arc<Record>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
            Value::Set(_) => Kind::Set,
            Value::Record(_) => Kind::Record,
            _ => Kind::Leaf,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind() != Kind::Leaf
    }

    /// Identity: scalars by value (`-0.0` equals `+0.0`, `NaN` equals
    /// itself), strings by content, aggregates by shared backing structure.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Set(a), Value::Set(b)) => a.ptr_eq(b),
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address of the backing allocation; the identity the key registry tags.
    /// Only meaningful for aggregates.
    pub(crate) fn heap_id(&self) -> usize {
        match self {
            Value::List(v) => v.heap_id(),
            Value::Map(m) => m.heap_id(),
            Value::Set(s) => s.heap_id(),
            Value::Record(r) => Arc::as_ptr(r) as usize,
            _ => 0,
        }
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    pub fn map<I: IntoIterator<Item = (Value, Value)>>(pairs: I) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Key::from_value(&k), v))
                .collect(),
        )
    }

    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::Set(items.into_iter().map(|v| Key::from_value(&v)).collect())
    }

    pub fn record<N: Into<String>, I: IntoIterator<Item = (N, Value)>>(fields: I) -> Value {
        Value::Record(Arc::new(
            fields.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        ))
    }

    pub fn as_list(&self) -> Option<&PVec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OrdMap<Key, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&OrdSet<Key>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<Record>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}
