//! Copy-on-write façade for records nested in a draft.
//!
//! A record draft leaves its base untouched until the first real write, then
//! works on a shallow copy. Aggregate fields get their own child drafts on
//! first access; a record counts as observably modified when it copied, or
//! when any cached child did.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_collections::Owner;

use crate::draft::Draft;
use crate::value::{Record, Value};

pub(crate) struct RecordState {
    owner: Owner,
    base: Arc<Record>,
    /// Shallow copy, made on the first write.
    copy: Option<Record>,
    children: BTreeMap<String, Draft>,
}

impl RecordState {
    pub fn new(base: Arc<Record>, owner: Owner) -> Self {
        RecordState {
            owner,
            base,
            copy: None,
            children: BTreeMap::new(),
        }
    }

    fn fields(&self) -> &Record {
        self.copy.as_ref().unwrap_or(self.base.as_ref())
    }

    fn ensure_copy(&mut self) -> &mut Record {
        self.copy.get_or_insert_with(|| (*self.base).clone())
    }

    pub fn len(&self) -> usize {
        self.fields().len()
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(child) = self.children.get(name) {
            return Some(child.snapshot());
        }
        self.fields().get(name).cloned()
    }

    /// Child draft for a present field, created and cached on first access.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Draft> {
        if !self.children.contains_key(name) {
            let value = self.fields().get(name)?.clone();
            self.children
                .insert(name.to_string(), Draft::from_value(&value, self.owner));
        }
        self.children.get_mut(name)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        // writing back the value already there is not a change
        if !self.children.contains_key(name) {
            if let Some(current) = self.fields().get(name) {
                if current.same(&value) {
                    return;
                }
            }
        }
        self.children.remove(name);
        self.ensure_copy().insert(name.to_string(), value);
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        if !self.fields().contains_key(name) {
            return None;
        }
        self.children.remove(name);
        self.ensure_copy().remove(name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields().keys().cloned().collect()
    }

    pub fn modified(&self) -> bool {
        self.copy.is_some() || self.children.values().any(Draft::observably_modified)
    }

    pub fn snapshot(&self) -> Value {
        let edits: Vec<(&String, Value)> = self
            .children
            .iter()
            .filter(|(_, child)| child.observably_modified())
            .map(|(name, child)| (name, child.snapshot()))
            .collect();
        if self.copy.is_none() && edits.is_empty() {
            return Value::Record(self.base.clone());
        }
        let mut fields = self.copy.clone().unwrap_or_else(|| (*self.base).clone());
        for (name, value) in edits {
            fields.insert(name.clone(), value);
        }
        Value::Record(Arc::new(fields))
    }

    /// Final value; an untouched record comes back as the base itself.
    pub fn extract(self) -> Value {
        let RecordState {
            base,
            copy,
            children,
            ..
        } = self;
        let mut edits = Vec::new();
        for (name, child) in children {
            if child.observably_modified() {
                edits.push((name, child.extract()));
            }
        }
        if copy.is_none() && edits.is_empty() {
            return Value::Record(base);
        }
        let mut fields = copy.unwrap_or_else(|| (*base).clone());
        for (name, value) in edits {
            fields.insert(name, value);
        }
        Value::Record(Arc::new(fields))
    }
}
