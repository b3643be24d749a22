//! Immutable updates through mutable drafts.
//!
//! [`produce`] hands a recipe a [`Draft`] over a base [`Value`], replays the
//! recipe's writes onto transient nodes of the underlying persistent
//! structures, and finalises to a new value sharing everything the recipe
//! left alone. A recipe that changes nothing observable gets the base back
//! by identity.
//!
//! ```
//! use arbor_produce::{Value, produce};
//!
//! let base = Value::list([Value::Int(1), Value::Int(2)]);
//! let next = produce(&base, |d| {
//!     let _ = d.push(Value::Int(3));
//! });
//! assert_eq!(next, Value::list([Value::Int(1), Value::Int(2), Value::Int(3)]));
//! assert_eq!(base, Value::list([Value::Int(1), Value::Int(2)]));
//! ```

mod dispatch;
mod draft;
pub mod error;
mod key;
mod nested;
mod value;

use tracing::trace;

pub use arbor_collections::Owner;

pub use self::dispatch::{Kind, Native, extract, is_managed, wrap};
pub use self::draft::Draft;
pub use self::error::ProduceError;
pub use self::key::{FloatKey, Key, RefKey};
pub use self::value::{Record, Value};

/// Apply `recipe` to a draft of `base` and finalise the result. The recipe
/// runs exactly once.
pub fn produce<F>(base: &Value, recipe: F) -> Value
where
    F: FnOnce(&mut Draft),
{
    let owner = Owner::new();
    let mut draft = Draft::from_value(base, owner);
    recipe(&mut draft);
    finish(draft, base)
}

/// Like [`produce`], but the recipe may fail. On failure the draft is
/// discarded, nothing is published, and the error reaches the caller
/// unchanged.
pub fn try_produce<E, F>(base: &Value, recipe: F) -> Result<Value, E>
where
    F: FnOnce(&mut Draft) -> Result<(), E>,
{
    let owner = Owner::new();
    let mut draft = Draft::from_value(base, owner);
    recipe(&mut draft)?;
    Ok(finish(draft, base))
}

fn finish(draft: Draft, base: &Value) -> Value {
    if draft.observably_modified() {
        trace!(kind = %base.kind(), "produce rebuilt its base");
        draft.extract()
    } else {
        trace!(kind = %base.kind(), "produce returned its base untouched");
        base.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::{collection::vec as vec_strategy, prelude::*, proptest};

    fn ints(values: impl IntoIterator<Item = i64>) -> Value {
        Value::list(values.into_iter().map(Value::Int))
    }

    #[test]
    fn list_push_pop_round_trip() {
        let base = ints([1, 2, 3]);
        let grown = produce(&base, |d| {
            d.push(Value::Int(4)).unwrap();
            d.push(Value::Int(5)).unwrap();
        });
        assert_eq!(grown, ints([1, 2, 3, 4, 5]));
        let mut popped = Vec::new();
        let shrunk = produce(&grown, |d| {
            popped.push(d.pop().unwrap());
            popped.push(d.pop().unwrap());
        });
        assert_eq!(shrunk, ints([1, 2, 3]));
        assert_eq!(
            popped,
            vec![Some(Value::Int(5)), Some(Value::Int(4))]
        );
    }

    #[test]
    fn versions_are_structurally_independent() {
        let a = ints([1, 2]);
        let b = produce(&a, |d| d.push(Value::Int(3)).unwrap());
        let c = produce(&b, |d| d.push(Value::Int(4)).unwrap());
        // mutate b again; neither a nor c may move
        let b2 = produce(&b, |d| d.set_at(0, Value::Int(99)).unwrap());
        assert_eq!(a, ints([1, 2]));
        assert_eq!(b, ints([1, 2, 3]));
        assert_eq!(b2, ints([99, 2, 3]));
        assert_eq!(c, ints([1, 2, 3, 4]));
    }

    #[test]
    fn map_round_trip() {
        let base = Value::map([]);
        let built = produce(&base, |d| {
            d.insert(Value::from("a"), Value::Int(1)).unwrap();
            d.insert(Value::from("b"), Value::Int(2)).unwrap();
        });
        let pruned = produce(&built, |d| {
            d.remove(&Value::from("a")).unwrap();
        });
        assert_eq!(pruned.as_map().map(|m| m.len()), Some(1));
        let m = pruned.as_map().unwrap();
        assert!(!m.contains_key(&Key::from_value(&Value::from("a"))));
        assert_eq!(
            m.get(&Key::from_value(&Value::from("b"))),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn map_iteration_order_survives_edits() {
        let base = Value::map([]);
        let built = produce(&base, |d| {
            d.insert(Value::Int(2), Value::from("x")).unwrap();
            d.insert(Value::Int(1), Value::from("y")).unwrap();
            d.insert(Value::Int(3), Value::from("z")).unwrap();
        });
        let edited = produce(&built, |d| {
            d.remove(&Value::Int(1)).unwrap();
            d.insert(Value::Int(4), Value::from("w")).unwrap();
        });
        let Native::Map(pairs) = extract(&edited) else {
            panic!("expected a map");
        };
        assert_eq!(
            pairs,
            vec![
                (Value::Int(2), Value::from("x")),
                (Value::Int(3), Value::from("z")),
                (Value::Int(4), Value::from("w")),
            ]
        );
    }

    #[test]
    fn set_keeps_insertion_order() {
        let base = Value::set([]);
        let built = produce(&base, |d| {
            for v in [3, 1, 2] {
                d.add(Value::Int(v)).unwrap();
            }
            d.delete(&Value::Int(1)).unwrap();
            d.add(Value::Int(1)).unwrap();
        });
        let Native::Set(items) = extract(&built) else {
            panic!("expected a set");
        };
        assert_eq!(items, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn noop_recipe_returns_base_by_identity() {
        let base = ints([1, 2, 3]);
        let out = produce(&base, |_| {});
        assert!(out.same(&base));

        let rec = Value::record([("x", Value::Int(1))]);
        let out = produce(&rec, |_| {});
        assert!(out.same(&rec));
    }

    #[test]
    fn read_only_recipe_returns_base_by_identity() {
        let base = Value::record([
            ("name", Value::from("a")),
            ("inner", Value::record([("x", Value::Int(1))])),
        ]);
        let out = produce(&base, |d| {
            // reads, including nested draft creation, are not modifications
            assert_eq!(d.field("name").unwrap(), Some(Value::from("a")));
            let inner = d.field_mut("inner").unwrap().unwrap();
            assert_eq!(inner.field("x").unwrap(), Some(Value::Int(1)));
        });
        assert!(out.same(&base));
    }

    #[test]
    fn writing_the_present_value_is_not_a_change() {
        let base = produce(&Value::map([]), |d| {
            d.insert(Value::from("k"), Value::Int(5)).unwrap();
        });
        let out = produce(&base, |d| {
            d.insert(Value::from("k"), Value::Int(5)).unwrap();
        });
        assert!(out.same(&base));

        let rec = Value::record([("f", Value::Int(1))]);
        let out = produce(&rec, |d| {
            d.set_field("f", Value::Int(1)).unwrap();
        });
        assert!(out.same(&rec));
    }

    #[test]
    fn nested_record_edit_bubbles_up() {
        let base = Value::record([
            ("keep", Value::record([("k", Value::Int(0))])),
            ("edit", Value::record([("x", Value::Int(1))])),
        ]);
        let out = produce(&base, |d| {
            let edit = d.field_mut("edit").unwrap().unwrap();
            edit.set_field("x", Value::Int(2)).unwrap();
        });
        assert_eq!(
            out,
            Value::record([
                ("keep", Value::record([("k", Value::Int(0))])),
                ("edit", Value::record([("x", Value::Int(2))])),
            ])
        );
        assert!(!out.same(&base));
        // the untouched sibling is shared by identity, not copied
        let base_keep = base.as_record().unwrap().get("keep").unwrap();
        let out_keep = out.as_record().unwrap().get("keep").unwrap();
        assert!(base_keep.same(out_keep));
        // the base never saw the write
        let base_edit = base.as_record().unwrap().get("edit").unwrap();
        assert_eq!(base_edit, &Value::record([("x", Value::Int(1))]));
    }

    #[test]
    fn nested_list_inside_record() {
        let base = Value::record([("items", ints([1, 2]))]);
        let out = produce(&base, |d| {
            let items = d.field_mut("items").unwrap().unwrap();
            items.push(Value::Int(3)).unwrap();
        });
        assert_eq!(out, Value::record([("items", ints([1, 2, 3]))]));
        assert_eq!(base, Value::record([("items", ints([1, 2]))]));
    }

    #[test]
    fn nested_map_inside_record() {
        let base = Value::record([("m", Value::map([(Value::from("a"), Value::Int(1))]))]);
        let out = produce(&base, |d| {
            let m = d.field_mut("m").unwrap().unwrap();
            m.insert(Value::from("b"), Value::Int(2)).unwrap();
        });
        let m = out.as_record().unwrap().get("m").unwrap().as_map().unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(
            m.get(&Key::from_value(&Value::from("a"))),
            Some(&Value::Int(1))
        );
        let base_m = base.as_record().unwrap().get("m").unwrap().as_map().unwrap();
        assert_eq!(base_m.len(), 1);
    }

    #[test]
    fn nested_record_inside_list() {
        let base = Value::list([Value::record([("x", Value::Int(1))]), Value::Int(9)]);
        let out = produce(&base, |d| {
            let rec = d.at_mut(0).unwrap();
            rec.set_field("x", Value::Int(5)).unwrap();
        });
        assert_eq!(
            out,
            Value::list([Value::record([("x", Value::Int(5))]), Value::Int(9)])
        );
        assert_eq!(
            base,
            Value::list([Value::record([("x", Value::Int(1))]), Value::Int(9)])
        );
    }

    #[test]
    fn deeply_nested_drafts_fold_back() {
        let base = Value::record([(
            "a",
            Value::record([("b", Value::record([("c", Value::Int(1))]))]),
        )]);
        let out = produce(&base, |d| {
            d.field_mut("a")
                .unwrap()
                .unwrap()
                .field_mut("b")
                .unwrap()
                .unwrap()
                .set_field("c", Value::Int(7))
                .unwrap();
        });
        let expect = Value::record([(
            "a",
            Value::record([("b", Value::record([("c", Value::Int(7))]))]),
        )]);
        assert_eq!(out, expect);
    }

    #[test]
    fn direct_write_invalidates_the_cached_child() {
        let base = Value::record([("inner", Value::record([("x", Value::Int(1))]))]);
        let out = produce(&base, |d| {
            let inner = d.field_mut("inner").unwrap().unwrap();
            inner.set_field("x", Value::Int(2)).unwrap();
            // overwrite the slot itself; the child draft's edit must die
            d.set_field("inner", Value::Int(42)).unwrap();
        });
        assert_eq!(out, Value::record([("inner", Value::Int(42))]));
    }

    #[test]
    fn recipe_error_discards_the_draft() {
        let base = ints([1, 2, 3]);
        let result: Result<Value, &str> = try_produce(&base, |d| {
            d.push(Value::Int(4)).map_err(|_| "push failed")?;
            Err("recipe gave up")
        });
        assert_eq!(result, Err("recipe gave up"));
        assert_eq!(base, ints([1, 2, 3]));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let base = Value::record([("x", Value::Int(1))]);
        produce(&base, |d| {
            let err = d.push(Value::Int(1)).unwrap_err();
            assert_eq!(
                err,
                ProduceError::KindMismatch {
                    op: "push",
                    found: Kind::Record
                }
            );
        });
    }

    #[test]
    fn leaf_base_passes_through() {
        let base = Value::Int(17);
        let out = produce(&base, |d| {
            assert_eq!(d.leaf(), Some(&Value::Int(17)));
        });
        assert!(out.same(&base));
    }

    #[test]
    fn structural_sharing_across_produce() {
        let inner = ints([1, 2, 3]);
        let base = Value::record([("left", inner.clone()), ("right", ints([4, 5]))]);
        let out = produce(&base, |d| {
            let right = d.field_mut("right").unwrap().unwrap();
            right.set_at(0, Value::Int(40)).unwrap();
        });
        // left is untouched and shared with the base version
        let out_left = out.as_record().unwrap().get("left").unwrap();
        assert!(out_left.same(&inner));
    }

    proptest! {
        #[test]
        fn list_recipes_match_vec_model(ops in vec_strategy((any::<u8>(), any::<i64>()), 0..60)) {
            let mut model: Vec<i64> = vec![1, 2, 3];
            let mut value = ints(model.clone());
            for (op, x) in ops {
                value = produce(&value, |d| match op % 3 {
                    0 => d.push(Value::Int(x)).unwrap(),
                    1 => {
                        d.pop().unwrap();
                    }
                    _ => {
                        let len = d.len().unwrap();
                        if len > 0 {
                            d.set_at(x.unsigned_abs() as usize % len, Value::Int(x)).unwrap();
                        }
                    }
                });
                match op % 3 {
                    0 => model.push(x),
                    1 => {
                        model.pop();
                    }
                    _ => {
                        if !model.is_empty() {
                            let i = x.unsigned_abs() as usize % model.len();
                            model[i] = x;
                        }
                    }
                }
                prop_assert_eq!(&value, &ints(model.clone()));
            }
        }
    }

    #[test]
    fn removed_key_takes_its_draft_with_it() {
        let base = produce(&Value::map([]), |d| {
            d.insert(Value::from("gone"), Value::record([("x", Value::Int(1))]))
                .unwrap();
            d.insert(Value::from("stay"), Value::Int(2)).unwrap();
        });
        let out = produce(&base, |d| {
            let child = d.get_mut(&Value::from("gone")).unwrap().unwrap();
            child.set_field("x", Value::Int(9)).unwrap();
            d.remove(&Value::from("gone")).unwrap();
        });
        assert_eq!(out.as_map().map(|m| m.len()), Some(1));
        assert!(
            out.as_map()
                .unwrap()
                .contains_key(&Key::from_value(&Value::from("stay")))
        );
    }
}
