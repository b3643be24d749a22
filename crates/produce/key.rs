//! Map and set keys.
//!
//! Scalar keys compare by value, with `-0.0` folded onto `+0.0` and every
//! `NaN` collapsed onto one key. Aggregate keys compare by identity; their
//! hash comes from a process-global registry that tags each distinct
//! aggregate on first sight with a monotonically increasing id, scrambled
//! over the full 32-bit range. A live key keeps its referent alive, so an
//! address can never be re-tagged while a key built from it is still
//! reachable.

use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arbor_collections::{Hash32, hash32_of, scramble32};
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::value::Value;

lazy_static! {
    /// Aggregate address → identity tag. Insert-once; readers far outnumber
    /// the single writer a produce call amounts to.
    static ref REF_TAGS: RwLock<FxHashMap<usize, u32>> = RwLock::new(FxHashMap::default());
}

static NEXT_TAG: AtomicU32 = AtomicU32::new(1);

fn ref_tag(addr: usize) -> u32 {
    if let Ok(tags) = REF_TAGS.read() {
        if let Some(tag) = tags.get(&addr) {
            return *tag;
        }
    }
    match REF_TAGS.write() {
        Ok(mut tags) => *tags
            .entry(addr)
            .or_insert_with(|| NEXT_TAG.fetch_add(1, Ordering::Relaxed)),
        Err(_) => {
            debug_assert!(false, "identity-tag registry poisoned");
            0
        }
    }
}

#[derive(Clone, Debug)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(Arc<str>),
    Ref(RefKey),
}

/// Normalised float bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FloatKey(u64);

impl FloatKey {
    pub fn new(value: f64) -> Self {
        let value = if value == 0.0 {
            0.0
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        FloatKey(value.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Identity key over an aggregate value. The tag is only a hash; equality is
/// the identity of the referent, so two aggregates that happen to share a
/// backing address across versions still compare as distinct keys.
#[derive(Clone, Debug)]
pub struct RefKey {
    tag: u32,
    value: Value,
}

impl RefKey {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Key {
    pub fn from_value(value: &Value) -> Key {
        match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(FloatKey::new(*f)),
            Value::Str(s) => Key::Str(s.clone()),
            aggregate => Key::Ref(RefKey {
                tag: ref_tag(aggregate.heap_id()),
                value: aggregate.clone(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(f) => Value::Float(f.value()),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Ref(r) => r.value.clone(),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Null, Key::Null) => true,
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::Int(a), Key::Int(b)) => a == b,
            (Key::Float(a), Key::Float(b)) => a == b,
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Ref(a), Key::Ref(b)) => a.value.same(&b.value),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash32());
    }
}

impl Hash32 for Key {
    fn hash32(&self) -> u32 {
        match self {
            Key::Null => scramble32(0x6e75_6c6c),
            Key::Bool(b) => scramble32(0x626f_6f00 | u32::from(*b)),
            Key::Int(i) => hash32_of(i),
            Key::Float(f) => hash32_of(&f.0),
            Key::Str(s) => hash32_of(&**s),
            Key::Ref(r) => scramble32(r.tag),
        }
    }
}
