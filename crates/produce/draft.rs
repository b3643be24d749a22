//! The root draft engine.
//!
//! A draft wraps one of the aggregate shapes in a mutable façade for the
//! duration of a single produce call. Direct writes go straight to the
//! working structure through its transient operations; reads pass through.
//! Accessing an aggregate child hands out a cached nested draft, and
//! finalisation folds the children that actually changed back into their
//! slots. A draft nothing wrote to finalises to its base by identity.

use std::collections::hash_map::Entry;

use arbor_collections::{OrdMap, OrdSet, Owner, PVec, VecError};
use rustc_hash::FxHashMap;

use crate::dispatch::Kind;
use crate::error::{ProduceError, kind_mismatch};
use crate::key::Key;
use crate::nested::RecordState;
use crate::value::Value;

pub struct Draft {
    owner: Owner,
    state: State,
}

enum State {
    List(ListState),
    Map(MapState),
    Set(SetState),
    Record(RecordState),
    Leaf(Value),
}

struct ListState {
    base: PVec<Value>,
    work: PVec<Value>,
    written: bool,
    children: FxHashMap<usize, Draft>,
}

struct MapState {
    base: OrdMap<Key, Value>,
    work: OrdMap<Key, Value>,
    written: bool,
    children: FxHashMap<Key, Draft>,
}

struct SetState {
    base: OrdSet<Key>,
    work: OrdSet<Key>,
    written: bool,
}

impl Draft {
    pub(crate) fn from_value(value: &Value, owner: Owner) -> Draft {
        let state = match value {
            Value::List(v) => State::List(ListState {
                base: v.clone(),
                work: v.clone(),
                written: false,
                children: FxHashMap::default(),
            }),
            Value::Map(m) => State::Map(MapState {
                base: m.clone(),
                work: m.clone(),
                written: false,
                children: FxHashMap::default(),
            }),
            Value::Set(s) => State::Set(SetState {
                base: s.clone(),
                work: s.clone(),
                written: false,
            }),
            Value::Record(r) => State::Record(RecordState::new(r.clone(), owner)),
            leaf => State::Leaf(leaf.clone()),
        };
        Draft { owner, state }
    }

    pub fn kind(&self) -> Kind {
        match &self.state {
            State::List(_) => Kind::List,
            State::Map(_) => Kind::Map,
            State::Set(_) => Kind::Set,
            State::Record(_) => Kind::Record,
            State::Leaf(_) => Kind::Leaf,
        }
    }

    pub fn len(&self) -> Result<usize, ProduceError> {
        match &self.state {
            State::List(l) => Ok(l.work.len()),
            State::Map(m) => Ok(m.work.len()),
            State::Set(s) => Ok(s.work.len()),
            State::Record(r) => Ok(r.len()),
            State::Leaf(_) => Err(kind_mismatch("len", Kind::Leaf)),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ProduceError> {
        Ok(self.len()? == 0)
    }

    /// The wrapped value of a non-aggregate draft.
    pub fn leaf(&self) -> Option<&Value> {
        match &self.state {
            State::Leaf(v) => Some(v),
            _ => None,
        }
    }

    // --- lists ---

    pub fn at(&self, index: usize) -> Result<Option<Value>, ProduceError> {
        let State::List(list) = &self.state else {
            return Err(kind_mismatch("indexed get", self.kind()));
        };
        if let Some(child) = list.children.get(&index) {
            return Ok(Some(child.snapshot()));
        }
        Ok(list.work.get(index).cloned())
    }

    /// Nested draft for the element at `index`; cached, so repeated access
    /// returns the same draft.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut Draft, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::List(list) = &mut self.state else {
            return Err(kind_mismatch("indexed access", kind));
        };
        if index >= list.work.len() {
            return Err(VecError::IndexOutOfBounds {
                index,
                len: list.work.len(),
            }
            .into());
        }
        match list.children.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let value = list.work.get(index).cloned().unwrap_or(Value::Null);
                Ok(entry.insert(Draft::from_value(&value, owner)))
            }
        }
    }

    pub fn set_at(&mut self, index: usize, value: Value) -> Result<(), ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::List(list) = &mut self.state else {
            return Err(kind_mismatch("indexed set", kind));
        };
        list.work.set(owner, index, value)?;
        list.children.remove(&index);
        list.written = true;
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> Result<(), ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::List(list) = &mut self.state else {
            return Err(kind_mismatch("push", kind));
        };
        list.work.push(owner, value);
        list.written = true;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Option<Value>, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::List(list) = &mut self.state else {
            return Err(kind_mismatch("pop", kind));
        };
        let len = list.work.len();
        if len == 0 {
            return Ok(None);
        }
        let child = list.children.remove(&(len - 1));
        let popped = list.work.pop(owner);
        list.written = true;
        match child {
            Some(child) if child.observably_modified() => Ok(Some(child.extract())),
            _ => Ok(popped),
        }
    }

    // --- maps ---

    pub fn get(&self, key: &Value) -> Result<Option<Value>, ProduceError> {
        let State::Map(map) = &self.state else {
            return Err(kind_mismatch("keyed get", self.kind()));
        };
        let key = Key::from_value(key);
        if let Some(child) = map.children.get(&key) {
            return Ok(Some(child.snapshot()));
        }
        Ok(map.work.get(&key).cloned())
    }

    /// Nested draft for the value under `key`; `None` when the key is
    /// absent.
    pub fn get_mut(&mut self, key: &Value) -> Result<Option<&mut Draft>, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::Map(map) = &mut self.state else {
            return Err(kind_mismatch("keyed access", kind));
        };
        let key = Key::from_value(key);
        if !map.work.contains_key(&key) {
            return Ok(None);
        }
        match map.children.entry(key) {
            Entry::Occupied(entry) => Ok(Some(entry.into_mut())),
            Entry::Vacant(entry) => {
                let value = map.work.get(entry.key()).cloned().unwrap_or(Value::Null);
                Ok(Some(entry.insert(Draft::from_value(&value, owner))))
            }
        }
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::Map(map) = &mut self.state else {
            return Err(kind_mismatch("insert", kind));
        };
        let key = Key::from_value(&key);
        // assigning the value already present is not a change
        if !map.children.contains_key(&key) {
            if let Some(current) = map.work.get(&key) {
                if current.same(&value) {
                    return Ok(());
                }
            }
        }
        map.children.remove(&key);
        map.work.insert(owner, key, value);
        map.written = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::Map(map) = &mut self.state else {
            return Err(kind_mismatch("remove", kind));
        };
        let key = Key::from_value(key);
        let child = map.children.remove(&key);
        let removed = map.work.remove(owner, &key);
        if removed.is_some() {
            map.written = true;
        }
        match child {
            Some(child) if removed.is_some() && child.observably_modified() => {
                Ok(Some(child.extract()))
            }
            _ => Ok(removed),
        }
    }

    pub fn contains_key(&self, key: &Value) -> Result<bool, ProduceError> {
        let State::Map(map) = &self.state else {
            return Err(kind_mismatch("keyed lookup", self.kind()));
        };
        Ok(map.work.contains_key(&Key::from_value(key)))
    }

    // --- sets ---

    pub fn add(&mut self, value: Value) -> Result<bool, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::Set(set) = &mut self.state else {
            return Err(kind_mismatch("add", kind));
        };
        let added = set.work.insert(owner, Key::from_value(&value));
        if added {
            set.written = true;
        }
        Ok(added)
    }

    pub fn delete(&mut self, value: &Value) -> Result<bool, ProduceError> {
        let owner = self.owner;
        let kind = self.kind();
        let State::Set(set) = &mut self.state else {
            return Err(kind_mismatch("delete", kind));
        };
        let removed = set.work.remove(owner, &Key::from_value(value));
        if removed {
            set.written = true;
        }
        Ok(removed)
    }

    pub fn has(&self, value: &Value) -> Result<bool, ProduceError> {
        let State::Set(set) = &self.state else {
            return Err(kind_mismatch("membership test", self.kind()));
        };
        Ok(set.work.contains(&Key::from_value(value)))
    }

    // --- records ---

    pub fn field(&self, name: &str) -> Result<Option<Value>, ProduceError> {
        let State::Record(record) = &self.state else {
            return Err(kind_mismatch("field get", self.kind()));
        };
        Ok(record.field(name))
    }

    /// Nested draft for a present field; `None` when the field is absent.
    pub fn field_mut(&mut self, name: &str) -> Result<Option<&mut Draft>, ProduceError> {
        let kind = self.kind();
        let State::Record(record) = &mut self.state else {
            return Err(kind_mismatch("field access", kind));
        };
        Ok(record.field_mut(name))
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), ProduceError> {
        let kind = self.kind();
        let State::Record(record) = &mut self.state else {
            return Err(kind_mismatch("field set", kind));
        };
        record.set_field(name, value);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Result<Option<Value>, ProduceError> {
        let kind = self.kind();
        let State::Record(record) = &mut self.state else {
            return Err(kind_mismatch("field removal", kind));
        };
        Ok(record.remove_field(name))
    }

    pub fn field_names(&self) -> Result<Vec<String>, ProduceError> {
        let State::Record(record) = &self.state else {
            return Err(kind_mismatch("field listing", self.kind()));
        };
        Ok(record.field_names())
    }

    // --- engine hooks ---

    /// Wrote itself, or holds a descendant draft that did.
    pub(crate) fn observably_modified(&self) -> bool {
        match &self.state {
            State::Leaf(_) => false,
            State::List(l) => l.written || l.children.values().any(Draft::observably_modified),
            State::Map(m) => m.written || m.children.values().any(Draft::observably_modified),
            State::Set(s) => s.written,
            State::Record(r) => r.modified(),
        }
    }

    /// Current value of the draft with child edits folded in; the draft
    /// stays live.
    pub fn snapshot(&self) -> Value {
        match &self.state {
            State::Leaf(v) => v.clone(),
            State::List(l) => {
                let owner = Owner::new();
                let mut work = l.work.clone();
                for (&index, child) in &l.children {
                    if child.observably_modified() {
                        let ok = work.set(owner, index, child.snapshot()).is_ok();
                        debug_assert!(ok, "cached child out of range");
                    }
                }
                Value::List(work)
            }
            State::Map(m) => {
                let owner = Owner::new();
                let mut work = m.work.clone();
                for (key, child) in &m.children {
                    if child.observably_modified() {
                        work.insert(owner, key.clone(), child.snapshot());
                    }
                }
                Value::Map(work)
            }
            State::Set(s) => Value::Set(s.work.clone()),
            State::Record(r) => r.snapshot(),
        }
    }

    /// Final value. A draft nothing wrote to yields its base by identity,
    /// which is what lets the whole produce call collapse to a no-op.
    pub(crate) fn extract(self) -> Value {
        let owner = self.owner;
        match self.state {
            State::Leaf(v) => v,
            State::List(mut l) => {
                let mut changed = l.written;
                for (index, child) in l.children {
                    if child.observably_modified() {
                        let ok = l.work.set(owner, index, child.extract()).is_ok();
                        debug_assert!(ok, "cached child out of range");
                        changed = true;
                    }
                }
                if changed {
                    Value::List(l.work)
                } else {
                    Value::List(l.base)
                }
            }
            State::Map(mut m) => {
                let mut changed = m.written;
                for (key, child) in m.children {
                    if child.observably_modified() {
                        m.work.insert(owner, key, child.extract());
                        changed = true;
                    }
                }
                if changed {
                    Value::Map(m.work)
                } else {
                    Value::Map(m.base)
                }
            }
            State::Set(s) => {
                if s.written {
                    Value::Set(s.work)
                } else {
                    Value::Set(s.base)
                }
            }
            State::Record(r) => r.extract(),
        }
    }
}
