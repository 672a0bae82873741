//! Concurrent store for ground rules.
use std::fmt;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use softlog_model::{Comparator, Model, Rule, RuleId};

use crate::atoms::{AtomStore, GroundAtomId, GroundLit};

/// The backing type used to represent ground rule references.
pub type GroundRuleIdx = u32;

/// Compact reference to a ground rule within a [`GroundRuleStore`].
///
/// References are never reused, even after the rule is retracted.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GroundRuleRef {
    index: GroundRuleIdx,
}

impl GroundRuleRef {
    #[inline]
    pub(crate) fn from_index(index: usize) -> GroundRuleRef {
        debug_assert!(index <= GroundRuleIdx::max_value() as usize);
        GroundRuleRef {
            index: index as GroundRuleIdx,
        }
    }

    /// The 0-based index representing this ground rule.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for GroundRuleRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "gr{}", self.index)
    }
}

/// The numeric potential of one rule instantiation.
#[derive(Clone, PartialEq, Debug)]
pub enum GroundPotential {
    /// A ground clause in negated form: violated to the degree all positive literals are
    /// true and all negated literals are false. Literals are sorted by code and deduplicated,
    /// making the vec the instance's identity.
    Clause { lits: Vec<GroundLit> },
    /// A ground linear expression `sum_i coeff_i * atom_i  cmp  constant` with coefficients
    /// merged per atom and sorted by atom index.
    Linear {
        summands: Vec<(GroundAtomId, f64)>,
        comparator: Comparator,
        constant: f64,
    },
}

/// One instantiation of a rule with all variables bound.
///
/// Owns no atoms; it references interned slots in the [`AtomStore`]. The violation measures
/// are computed from the atoms' current values on demand.
#[derive(Clone, PartialEq, Debug)]
pub struct GroundRule {
    rule: RuleId,
    potential: GroundPotential,
}

/// Canonical identity of a ground rule, used for duplicate suppression.
#[derive(PartialEq, Eq, Hash)]
pub struct GroundRuleKey {
    rule: RuleId,
    payload: Vec<u64>,
}

impl GroundRule {
    /// Creates a ground clause instance. The literal set is canonicalized here.
    pub fn clause(rule: RuleId, mut lits: Vec<GroundLit>) -> GroundRule {
        lits.sort_unstable();
        lits.dedup();
        GroundRule {
            rule,
            potential: GroundPotential::Clause { lits },
        }
    }

    /// Creates a ground linear instance. Summands must be merged per atom; they are sorted
    /// here.
    pub fn linear(
        rule: RuleId,
        mut summands: Vec<(GroundAtomId, f64)>,
        comparator: Comparator,
        constant: f64,
    ) -> GroundRule {
        summands.sort_unstable_by_key(|&(atom, _)| atom);
        GroundRule {
            rule,
            potential: GroundPotential::Linear {
                summands,
                comparator,
                constant,
            },
        }
    }

    /// The parent rule.
    pub fn rule(&self) -> RuleId {
        self.rule
    }

    /// The instance's potential data.
    pub fn potential(&self) -> &GroundPotential {
        &self.potential
    }

    /// The canonical identity of this instance.
    pub fn key(&self) -> GroundRuleKey {
        let payload = match &self.potential {
            GroundPotential::Clause { lits } => {
                lits.iter().map(|lit| lit.code() as u64).collect()
            }
            GroundPotential::Linear {
                summands,
                comparator,
                constant,
            } => {
                let mut payload = Vec::with_capacity(summands.len() * 2 + 2);
                for &(atom, coeff) in summands.iter() {
                    payload.push(atom.index() as u64);
                    payload.push(coeff.to_bits());
                }
                payload.push(*comparator as u64);
                payload.push(constant.to_bits());
                payload
            }
        };
        GroundRuleKey {
            rule: self.rule,
            payload,
        }
    }

    /// The unweighted violation of this instance under the current atom values.
    ///
    /// For clauses this is the distance to satisfaction of the original disjunction; for
    /// linear instances the magnitude of the comparator violation. Always `>= 0`.
    pub fn violation(&self, atoms: &AtomStore) -> f64 {
        match &self.potential {
            GroundPotential::Clause { lits } => {
                let mut total = 0.0;
                let mut pos_count = 0usize;
                for &lit in lits.iter() {
                    let value = atoms.value(lit.atom());
                    if lit.is_positive() {
                        total += value;
                        pos_count += 1;
                    } else {
                        total -= value;
                    }
                }
                (total - (pos_count as f64 - 1.0)).max(0.0)
            }
            GroundPotential::Linear {
                summands,
                comparator,
                constant,
            } => {
                let total: f64 = summands
                    .iter()
                    .map(|&(atom, coeff)| coeff * atoms.value(atom))
                    .sum();
                match comparator {
                    Comparator::LessEqual => (total - constant).max(0.0),
                    Comparator::GreaterEqual => (constant - total).max(0.0),
                    Comparator::Equal => (total - constant).abs(),
                }
            }
        }
    }

    /// The weighted incompatibility of this instance, if its parent rule is weighted.
    pub fn incompatibility(&self, rule: &Rule, atoms: &AtomStore) -> Option<f64> {
        let weight = rule.weight()?;
        let violation = self.violation(atoms);
        Some(if rule.squared() {
            weight * violation * violation
        } else {
            weight * violation
        })
    }

    /// The infeasibility of this instance, if its parent rule is a constraint.
    pub fn infeasibility(&self, rule: &Rule, atoms: &AtomStore) -> Option<f64> {
        if rule.is_weighted() {
            return None;
        }
        Some(self.violation(atoms))
    }
}

#[derive(Default)]
struct GroundStoreInner {
    rules: Vec<Option<GroundRule>>,
    by_rule: FxHashMap<RuleId, Vec<GroundRuleRef>>,
    keys: FxHashSet<GroundRuleKey>,
    len: usize,
}

/// Store of all ground rules, indexed by parent rule.
///
/// [`add`](GroundRuleStore::add) takes `&self` behind a lock so the parallel grounder can
/// insert from many tasks; every other operation runs single-threaded and takes `&mut self`
/// to bypass the lock. Retracting a rule here leaves its terms in the term store; the engine
/// forwards every retraction so consensus variables without remaining terms are pruned.
#[derive(Default)]
pub struct GroundRuleStore {
    inner: Mutex<GroundStoreInner>,
}

impl GroundRuleStore {
    /// Create an empty store.
    pub fn new() -> GroundRuleStore {
        GroundRuleStore::default()
    }

    /// Inserts a ground rule unless an instance with the same identity is already present.
    pub fn add(&self, ground: GroundRule) -> Option<GroundRuleRef> {
        let key = ground.key();
        let mut inner = self.inner.lock();

        if !inner.keys.insert(key) {
            return None;
        }

        let gref = GroundRuleRef::from_index(inner.rules.len());
        inner
            .by_rule
            .entry(ground.rule())
            .or_default()
            .push(gref);
        inner.rules.push(Some(ground));
        inner.len += 1;
        Some(gref)
    }

    /// Number of ground rules in the store.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of instances of the given rule.
    pub fn count(&self, rule: RuleId) -> usize {
        self.inner
            .lock()
            .by_rule
            .get(&rule)
            .map(|refs| refs.len())
            .unwrap_or(0)
    }

    /// References to every instance of the given rule.
    pub fn ground_rules(&self, rule: RuleId) -> Vec<GroundRuleRef> {
        self.inner
            .lock()
            .by_rule
            .get(&rule)
            .cloned()
            .unwrap_or_default()
    }

    /// Access a ground rule.
    pub fn get(&mut self, gref: GroundRuleRef) -> Option<&GroundRule> {
        self.inner.get_mut().rules.get(gref.index())?.as_ref()
    }

    /// Iterator over all ground rules.
    pub fn iter(&mut self) -> impl Iterator<Item = (GroundRuleRef, &GroundRule)> {
        self.inner
            .get_mut()
            .rules
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((GroundRuleRef::from_index(index), slot.as_ref()?)))
    }

    /// Retracts every instance of the given rule, returning the retracted references.
    ///
    /// The caller must forward the retraction to the term store (see
    /// [`TermStore::retract_rule`](crate::term::store::TermStore::retract_rule)); stale
    /// consensus variables would otherwise anchor terms to dangling values.
    pub fn remove_all(&mut self, rule: RuleId) -> Vec<GroundRuleRef> {
        let inner = self.inner.get_mut();
        let refs = inner.by_rule.remove(&rule).unwrap_or_default();

        for &gref in refs.iter() {
            if let Some(ground) = inner.rules[gref.index()].take() {
                inner.keys.remove(&ground.key());
                inner.len -= 1;
            }
        }

        refs
    }

    /// Total weighted incompatibility over all instances of weighted rules.
    pub fn total_weighted_incompatibility(&mut self, model: &Model, atoms: &AtomStore) -> f64 {
        let inner = self.inner.get_mut();
        inner
            .rules
            .iter()
            .flatten()
            .filter_map(|ground| {
                let rule = model.rule(ground.rule())?;
                ground.incompatibility(rule, atoms)
            })
            .sum()
    }

    /// Euclidean norm of the infeasibilities over all constraint instances.
    pub fn infeasibility_norm(&mut self, model: &Model, atoms: &AtomStore) -> f64 {
        let inner = self.inner.get_mut();
        inner
            .rules
            .iter()
            .flatten()
            .filter_map(|ground| {
                let rule = model.rule(ground.rule())?;
                ground.infeasibility(rule, atoms)
            })
            .map(|infeasibility| infeasibility * infeasibility)
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::atoms::GroundAtomId;

    fn lit(index: usize, polarity: bool) -> GroundLit {
        GroundAtomId::from_index(index).lit(polarity)
    }

    #[test]
    fn duplicate_instances_are_suppressed() {
        let store = GroundRuleStore::new();
        let rule = RuleId::from_index(0);

        let first = GroundRule::clause(rule, vec![lit(0, true), lit(1, false)]);
        // Same literal set in a different order.
        let second = GroundRule::clause(rule, vec![lit(1, false), lit(0, true)]);

        assert!(store.add(first).is_some());
        assert!(store.add(second).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.count(rule), 1);
    }

    #[test]
    fn same_literals_under_other_rule_are_distinct() {
        let store = GroundRuleStore::new();
        let rule_a = RuleId::from_index(0);
        let rule_b = RuleId::from_index(1);

        let lits = vec![lit(0, true), lit(1, false)];
        assert!(store.add(GroundRule::clause(rule_a, lits.clone())).is_some());
        assert!(store.add(GroundRule::clause(rule_b, lits)).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_all_retracts_only_the_given_rule() {
        let mut store = GroundRuleStore::new();
        let rule_a = RuleId::from_index(0);
        let rule_b = RuleId::from_index(1);

        store.add(GroundRule::clause(rule_a, vec![lit(0, true)]));
        store.add(GroundRule::clause(rule_a, vec![lit(1, true)]));
        store.add(GroundRule::clause(rule_b, vec![lit(2, true)]));

        let removed = store.remove_all(rule_a);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.count(rule_a), 0);
        assert_eq!(store.count(rule_b), 1);

        // Retraction frees the identity for re-grounding.
        assert!(store.add(GroundRule::clause(rule_a, vec![lit(0, true)])).is_some());
    }

    #[test]
    fn concurrent_adds_are_safe() {
        use rayon::prelude::*;

        let store = GroundRuleStore::new();
        let rule = RuleId::from_index(0);

        (0..256usize).into_par_iter().for_each(|index| {
            // Half of the instances collide on the same identity.
            let slot = index % 128;
            store.add(GroundRule::clause(rule, vec![lit(slot, true)]));
        });

        assert_eq!(store.len(), 128);
        assert_eq!(store.count(rule), 128);
    }
}
