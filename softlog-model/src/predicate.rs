//! Predicates and the predicate interning store.
use std::fmt;

use rustc_hash::FxHashMap;

/// The backing type used to represent predicate ids.
pub type PredIdx = u32;

/// Compact reference to an interned [`Predicate`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PredicateId {
    index: PredIdx,
}

impl PredicateId {
    /// Creates a predicate id from a 0-based index.
    #[inline]
    pub fn from_index(index: usize) -> PredicateId {
        debug_assert!(index <= PredIdx::max_value() as usize);
        PredicateId {
            index: index as PredIdx,
        }
    }

    /// The 0-based index representing this predicate.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{}", self.index)
    }
}

/// A named relation with fixed arity.
///
/// Immutable once created.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Predicate {
    name: String,
    arity: usize,
}

impl Predicate {
    /// The predicate's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The predicate's argument count.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Interning store for predicates.
///
/// Predicates are registered once by name and referenced by [`PredicateId`] everywhere else.
/// Registering the same name twice returns the existing id.
#[derive(Default)]
pub struct PredicateStore {
    predicates: Vec<Predicate>,
    by_name: FxHashMap<String, PredicateId>,
}

impl PredicateStore {
    /// Create an empty predicate store.
    pub fn new() -> PredicateStore {
        PredicateStore::default()
    }

    /// Registers a predicate, returning the id of an existing registration if present.
    ///
    /// A predicate's arity is fixed at first registration.
    pub fn register(&mut self, name: impl Into<String>, arity: usize) -> PredicateId {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            assert_eq!(
                self.predicates[id.index()].arity,
                arity,
                "predicate {} re-registered with different arity",
                name
            );
            return id;
        }

        let id = PredicateId::from_index(self.predicates.len());
        self.predicates.push(Predicate {
            name: name.clone(),
            arity,
        });
        self.by_name.insert(name, id);
        id
    }

    /// Looks up a predicate id by name.
    pub fn lookup(&self, name: &str) -> Option<PredicateId> {
        self.by_name.get(name).copied()
    }

    /// Access a predicate by id.
    pub fn get(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.index()]
    }

    /// Number of registered predicates.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether no predicates are registered.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut store = PredicateStore::new();

        let knows = store.register("knows", 2);
        let likes = store.register("likes", 2);
        assert_ne!(knows, likes);

        assert_eq!(store.register("knows", 2), knows);
        assert_eq!(store.len(), 2);

        assert_eq!(store.lookup("knows"), Some(knows));
        assert_eq!(store.lookup("hates"), None);

        assert_eq!(store.get(likes).name(), "likes");
        assert_eq!(store.get(likes).arity(), 2);
    }

    #[test]
    #[should_panic(expected = "different arity")]
    fn register_rejects_arity_change() {
        let mut store = PredicateStore::new();
        store.register("knows", 2);
        store.register("knows", 3);
    }
}
