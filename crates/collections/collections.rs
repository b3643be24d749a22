//! Persistent collections with transient (owner-tagged) editing.
//!
//! The structures here share unchanged subtrees between versions: every edit
//! copies only the path from the root to the touched node. During a single
//! editing session (identified by an [`Owner`] token) nodes created by that
//! session are patched in place instead, so a burst of edits pays one copy
//! per touched node rather than one per operation.

mod bits;
pub mod error;
mod hash;
pub mod map;
pub mod order;
mod owner;
pub mod set;
pub mod vec;

pub use self::error::VecError;
pub use self::hash::{Hash32, hash32_of, scramble32};
pub use self::map::PMap;
pub use self::order::{OrdMap, OrdSet};
pub use self::owner::Owner;
pub use self::set::PSet;
pub use self::vec::PVec;
