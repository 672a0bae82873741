//! Ground atom arena.
//!
//! Every ground atom the engine touches is interned here exactly once, so that all ground
//! rules referencing the same `(predicate, arguments)` identity share a single slot and see
//! the same value. Interning takes `&self` behind a lock because the grounder interns from
//! parallel tasks; value mutation takes `&mut self` and happens only in the single-threaded
//! commit step after optimization.
use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use softlog_model::GroundKey;

use crate::facts::FactStore;

/// The backing type used to represent ground atom ids and literals.
pub type AtomIdx = u32;

/// Compact reference to an interned ground atom.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GroundAtomId {
    index: AtomIdx,
}

impl GroundAtomId {
    /// Creates an atom id from a 0-based index.
    ///
    /// The index may not represent an atom past `GroundAtomId::max_count() - 1`.
    #[inline]
    pub fn from_index(index: usize) -> GroundAtomId {
        debug_assert!(index < GroundAtomId::max_count());
        GroundAtomId {
            index: index as AtomIdx,
        }
    }

    /// The 0-based index representing this atom.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Largest number of atoms supported.
    ///
    /// This is less than the backing integer type supports, enabling the polarity bit of
    /// [`GroundLit`] within a single word.
    pub const fn max_count() -> usize {
        (AtomIdx::max_value() >> 1) as usize + 1
    }

    /// Creates a literal from this atom and a `bool` that is `true` when the literal is
    /// positive.
    #[inline]
    pub fn lit(self, polarity: bool) -> GroundLit {
        GroundLit::from_atom(self, polarity)
    }
}

impl fmt::Debug for GroundAtomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a{}", self.index)
    }
}

/// A ground atom occurrence with a polarity.
///
/// Internally represented as an integer that is two times the atom index for a positive
/// occurrence and one more for a negated one. This integer is called the `code` of the
/// literal, and doubles as its canonical sort key within a ground clause.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GroundLit {
    code: AtomIdx,
}

impl GroundLit {
    /// Creates a literal from an atom and a `bool` that is `true` when the literal is
    /// positive.
    #[inline]
    pub fn from_atom(atom: GroundAtomId, polarity: bool) -> GroundLit {
        GroundLit {
            code: (atom.index << 1) | (!polarity as AtomIdx),
        }
    }

    /// Create a positive literal.
    #[inline]
    pub fn positive(atom: GroundAtomId) -> GroundLit {
        GroundLit::from_atom(atom, true)
    }

    /// Create a negated literal.
    #[inline]
    pub fn negative(atom: GroundAtomId) -> GroundLit {
        GroundLit::from_atom(atom, false)
    }

    /// The literal's atom.
    #[inline]
    pub fn atom(self) -> GroundAtomId {
        GroundAtomId {
            index: self.code >> 1,
        }
    }

    /// Whether the literal is negated.
    #[inline]
    pub fn is_negative(self) -> bool {
        (self.code & 1) != 0
    }

    /// Whether the literal is positive.
    #[inline]
    pub fn is_positive(self) -> bool {
        !self.is_negative()
    }

    /// Two times the atom index for positive literals and one more for negated literals.
    #[inline]
    pub fn code(self) -> usize {
        self.code as usize
    }
}

impl std::ops::Not for GroundLit {
    type Output = GroundLit;

    #[inline]
    fn not(self) -> GroundLit {
        GroundLit {
            code: self.code ^ 1,
        }
    }
}

impl fmt::Debug for GroundLit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_negative() {
            write!(f, "!{:?}", self.atom())
        } else {
            write!(f, "{:?}", self.atom())
        }
    }
}

/// Whether a ground atom is externally fixed or inferred.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AtomKind {
    /// Externally fixed truth value, read-only to the solver.
    Observed,
    /// An unknown the solver assigns.
    RandomVariable,
}

struct AtomData {
    key: GroundKey,
    kind: AtomKind,
    value: f64,
    confidence: Option<f64>,
}

/// Result of interning an atom: the id plus the state captured at intern time.
///
/// The grounder works from this snapshot instead of re-reading the store, so parallel
/// grounding tasks never take the read lock in their inner loop.
#[derive(Copy, Clone, Debug)]
pub struct InternedAtom {
    pub id: GroundAtomId,
    pub value: f64,
    pub observed: bool,
}

#[derive(Default)]
struct AtomStoreInner {
    atoms: Vec<AtomData>,
    by_key: FxHashMap<GroundKey, GroundAtomId>,
}

/// Interning arena for ground atoms.
#[derive(Default)]
pub struct AtomStore {
    inner: RwLock<AtomStoreInner>,
}

impl AtomStore {
    /// Create an empty atom store.
    pub fn new() -> AtomStore {
        AtomStore::default()
    }

    /// Interns a ground atom, consulting the fact store on first sight.
    ///
    /// Returns the shared id for the key; all later interns of an equal key return the same
    /// id. The observed flag, value and confidence are captured from the fact store when the
    /// slot is created.
    pub fn intern(&self, key: GroundKey, facts: &dyn FactStore) -> InternedAtom {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.by_key.get(&key) {
                let data = &inner.atoms[id.index()];
                return InternedAtom {
                    id,
                    value: data.value,
                    observed: data.kind == AtomKind::Observed,
                };
            }
        }

        let observed = facts.is_observed(&key);
        let value = facts.value(&key);
        let confidence = facts.confidence(&key);

        let mut inner = self.inner.write();
        // Another task may have interned the key between the locks.
        if let Some(&id) = inner.by_key.get(&key) {
            let data = &inner.atoms[id.index()];
            return InternedAtom {
                id,
                value: data.value,
                observed: data.kind == AtomKind::Observed,
            };
        }

        let id = GroundAtomId::from_index(inner.atoms.len());
        inner.atoms.push(AtomData {
            key: key.clone(),
            kind: if observed {
                AtomKind::Observed
            } else {
                AtomKind::RandomVariable
            },
            value,
            confidence,
        });
        inner.by_key.insert(key, id);

        InternedAtom {
            id,
            value,
            observed,
        }
    }

    /// The id of an already interned atom.
    pub fn lookup(&self, key: &GroundKey) -> Option<GroundAtomId> {
        self.inner.read().by_key.get(key).copied()
    }

    /// The atom's current soft-truth value.
    pub fn value(&self, id: GroundAtomId) -> f64 {
        self.inner.read().atoms[id.index()].value
    }

    /// Whether the atom is observed.
    pub fn is_observed(&self, id: GroundAtomId) -> bool {
        self.inner.read().atoms[id.index()].kind == AtomKind::Observed
    }

    /// The atom's kind.
    pub fn kind(&self, id: GroundAtomId) -> AtomKind {
        self.inner.read().atoms[id.index()].kind
    }

    /// The atom's confidence, if the fact store provided one.
    pub fn confidence(&self, id: GroundAtomId) -> Option<f64> {
        self.inner.read().atoms[id.index()].confidence
    }

    /// The atom's identity key.
    pub fn key(&self, id: GroundAtomId) -> GroundKey {
        self.inner.read().atoms[id.index()].key.clone()
    }

    /// Updates the value of a random-variable atom.
    ///
    /// Observed atoms are read-only to the solver; writing one is a bug in the caller.
    pub fn set_value(&mut self, id: GroundAtomId, value: f64) {
        let inner = self.inner.get_mut();
        let data = &mut inner.atoms[id.index()];
        debug_assert!(
            data.kind == AtomKind::RandomVariable,
            "attempted to write observed atom {}",
            data.key
        );
        data.value = value;
    }

    /// Iterator over all interned random-variable atom ids.
    pub fn random_variables(&mut self) -> impl Iterator<Item = GroundAtomId> + '_ {
        let inner = self.inner.get_mut();
        inner
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, data)| data.kind == AtomKind::RandomVariable)
            .map(|(index, _)| GroundAtomId::from_index(index))
    }

    /// Number of interned atoms.
    pub fn len(&self) -> usize {
        self.inner.read().atoms.len()
    }

    /// Whether no atoms are interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
