//! The relational fact-store boundary.
//!
//! The engine consumes the fact base through [`FactStore`] and never assumes a concrete
//! backend. [`MemoryFactStore`] is the in-memory implementation used by tests and small
//! drivers; real deployments put a database behind the same trait.
use anyhow::{anyhow, Error};
use rustc_hash::FxHashMap;

use softlog_model::{Atom, Bindings, GroundKey, PredicateId, Term};

/// Read and commit access to the relational fact base.
///
/// Queries run during grounding from parallel tasks, hence the `Sync` bound. Writes happen
/// only through [`commit_value`](FactStore::commit_value), after optimization.
pub trait FactStore: Sync {
    /// Executes the conjunction of the given atom templates, returning one row per
    /// variable assignment under which every template matches a stored ground atom.
    fn query_bindings(&self, query: &[Atom]) -> Vec<Bindings>;

    /// The current soft-truth value of a ground atom.
    ///
    /// Unknown atoms report their initial value; atoms the store has never seen report the
    /// closed-world default of 0.0.
    fn value(&self, key: &GroundKey) -> f64;

    /// Whether the ground atom is externally fixed.
    ///
    /// Atoms the store has never seen are observed-false under the closed-world assumption.
    fn is_observed(&self, key: &GroundKey) -> bool;

    /// Advisory confidence attached to an observed value, if any.
    fn confidence(&self, key: &GroundKey) -> Option<f64> {
        let _ = key;
        None
    }

    /// Writes a solved value back to the store.
    fn commit_value(&mut self, key: &GroundKey, value: f64) -> Result<(), Error>;
}

struct StoredFact {
    value: f64,
    confidence: Option<f64>,
    observed: bool,
}

/// In-memory fact store.
///
/// Ground atoms are explicitly listed, either as observed facts with a fixed value or as
/// unknowns for the solver to assign. Queries enumerate listed atoms only; everything else
/// is observed-false (closed world).
#[derive(Default)]
pub struct MemoryFactStore {
    facts: FxHashMap<GroundKey, StoredFact>,
    by_predicate: FxHashMap<PredicateId, Vec<GroundKey>>,
}

impl MemoryFactStore {
    /// Create an empty fact store.
    pub fn new() -> MemoryFactStore {
        MemoryFactStore::default()
    }

    /// Lists an observed ground atom with a fixed value.
    pub fn add_observed(&mut self, key: GroundKey, value: f64) {
        self.insert(key, value, None, true);
    }

    /// Lists an observed ground atom with a fixed value and a confidence.
    pub fn add_observed_with_confidence(&mut self, key: GroundKey, value: f64, confidence: f64) {
        self.insert(key, value, Some(confidence), true);
    }

    /// Lists an unknown ground atom for the solver to assign, starting at 0.0.
    pub fn add_unknown(&mut self, key: GroundKey) {
        self.insert(key, 0.0, None, false);
    }

    fn insert(&mut self, key: GroundKey, value: f64, confidence: Option<f64>, observed: bool) {
        if self
            .facts
            .insert(
                key.clone(),
                StoredFact {
                    value,
                    confidence,
                    observed,
                },
            )
            .is_none()
        {
            self.by_predicate
                .entry(key.predicate())
                .or_default()
                .push(key);
        }
    }

    /// Number of listed ground atoms.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether no ground atoms are listed.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Extends a row so that the atom template matches the stored key, if possible.
    fn unify(atom: &Atom, key: &GroundKey, row: &Bindings) -> Option<Bindings> {
        let mut extended = row.clone();

        for (term, constant) in atom.args().iter().zip(key.args().iter()) {
            match term {
                Term::Constant(expected) => {
                    if expected != constant {
                        return None;
                    }
                }
                Term::Variable(variable) => match extended.get(variable) {
                    Some(bound) => {
                        if bound != constant {
                            return None;
                        }
                    }
                    None => extended.set(variable.clone(), constant.clone()),
                },
            }
        }

        Some(extended)
    }
}

impl FactStore for MemoryFactStore {
    fn query_bindings(&self, query: &[Atom]) -> Vec<Bindings> {
        let mut rows = vec![Bindings::new()];

        for atom in query {
            let keys = match self.by_predicate.get(&atom.predicate()) {
                Some(keys) => keys,
                None => return vec![],
            };

            let mut next = vec![];
            for row in rows.iter() {
                for key in keys.iter() {
                    if let Some(extended) = Self::unify(atom, key, row) {
                        next.push(extended);
                    }
                }
            }

            if next.is_empty() {
                return vec![];
            }
            rows = next;
        }

        rows
    }

    fn value(&self, key: &GroundKey) -> f64 {
        self.facts.get(key).map(|fact| fact.value).unwrap_or(0.0)
    }

    fn is_observed(&self, key: &GroundKey) -> bool {
        self.facts.get(key).map(|fact| fact.observed).unwrap_or(true)
    }

    fn confidence(&self, key: &GroundKey) -> Option<f64> {
        self.facts.get(key).and_then(|fact| fact.confidence)
    }

    fn commit_value(&mut self, key: &GroundKey, value: f64) -> Result<(), Error> {
        match self.facts.get_mut(key) {
            Some(fact) if !fact.observed => {
                fact.value = value;
                Ok(())
            }
            Some(_) => Err(anyhow!("cannot commit value to observed atom {}", key)),
            None => Err(anyhow!("cannot commit value to unlisted atom {}", key)),
        }
    }
}
