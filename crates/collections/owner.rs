use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity of one editing session.
///
/// A node stamped with the session's owner was allocated by that session and
/// may be mutated in place; any other node must be copied before writing.
/// Tokens are process-unique and never reused, so a token left over from a
/// finished session can never authorise an edit in a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner(u64);

impl Owner {
    pub fn new() -> Self {
        Owner(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn owners_are_unique() {
        let a = Owner::new();
        let b = Owner::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
