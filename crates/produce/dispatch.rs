//! Kind classification and the native conversion boundary.

use std::fmt;
use std::sync::Arc;

use arbor_collections::{OrdMap, OrdSet, Owner, PVec};

use crate::key::Key;
use crate::value::Value;

/// The closed set of shapes the engine dispatches over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    List,
    Map,
    Set,
    Record,
    /// Any non-aggregate value.
    Leaf,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Set => "set",
            Kind::Record => "record",
            Kind::Leaf => "leaf",
        };
        f.write_str(name)
    }
}

/// Plain host-side data on its way in or out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Record(Vec<(String, Value)>),
    Leaf(Value),
}

pub fn is_managed(value: &Value) -> bool {
    value.is_aggregate()
}

/// Build a managed value from native data. Map and set entries keep their
/// given order as insertion order; a duplicate map key keeps its first slot
/// and takes the last value.
pub fn wrap(native: Native) -> Value {
    match native {
        Native::List(items) => Value::List(PVec::from_vec(items)),
        Native::Map(pairs) => {
            let owner = Owner::new();
            let mut map = OrdMap::new();
            for (key, value) in pairs {
                map.insert(owner, Key::from_value(&key), value);
            }
            Value::Map(map)
        }
        Native::Set(items) => {
            let owner = Owner::new();
            let mut set = OrdSet::new();
            for item in items {
                set.insert(owner, Key::from_value(&item));
            }
            Value::Set(set)
        }
        Native::Record(fields) => Value::Record(Arc::new(fields.into_iter().collect())),
        Native::Leaf(value) => value,
    }
}

/// Fresh native copy of a managed value. Maps and sets come out in
/// insertion order.
pub fn extract(value: &Value) -> Native {
    match value {
        Value::List(v) => Native::List(v.to_vec()),
        Value::Map(m) => Native::Map(m.iter().map(|(k, v)| (k.to_value(), v.clone())).collect()),
        Value::Set(s) => Native::Set(s.iter().map(Key::to_value).collect()),
        Value::Record(r) => Native::Record(r.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        leaf => Native::Leaf(leaf.clone()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrap_extract_round_trip_list() {
        let native = Native::List(vec![Value::Int(1), Value::from("two"), Value::Null]);
        let wrapped = wrap(native.clone());
        assert!(is_managed(&wrapped));
        assert_eq!(extract(&wrapped), native);
    }

    #[test]
    fn wrap_extract_preserves_map_order() {
        let native = Native::Map(vec![
            (Value::Int(2), Value::from("x")),
            (Value::Int(1), Value::from("y")),
            (Value::Int(3), Value::from("z")),
        ]);
        let wrapped = wrap(native.clone());
        assert_eq!(extract(&wrapped), native);
    }

    #[test]
    fn leaves_are_not_managed() {
        let wrapped = wrap(Native::Leaf(Value::Int(5)));
        assert!(!is_managed(&wrapped));
        assert_eq!(wrapped, Value::Int(5));
    }
}
