//! Term storage and the consensus variable arena.
use rustc_hash::{FxHashMap, FxHashSet};
use vec_mut_scan::VecMutScan;

use softlog_model::RuleId;

use crate::atoms::GroundAtomId;
use crate::ground::store::GroundRuleRef;

use super::{GlobalVarId, Term};

/// Location of one local variable: a term index and an offset within that term.
///
/// Locations are only valid until the next retraction, which compacts the term vec and
/// rebuilds them.
#[derive(Copy, Clone, Debug)]
pub struct LocalVarLoc {
    term: u32,
    local: u32,
}

impl LocalVarLoc {
    /// The index of the term holding the local variable.
    #[inline]
    pub fn term(self) -> usize {
        self.term as usize
    }

    /// The offset of the local variable within its term.
    #[inline]
    pub fn local(self) -> usize {
        self.local as usize
    }
}

/// Arena of consensus variables.
///
/// One slot per distinct unknown ground atom with at least one term. Slots are reference
/// counted by the terms whose locals shadow them and explicitly released onto a free list
/// when the count reaches zero.
#[derive(Default)]
pub(crate) struct GlobalVars {
    /// Current consensus value per slot.
    pub(crate) consensus: Vec<f64>,
    /// The atom each slot stands for.
    pub(crate) atoms: Vec<GroundAtomId>,
    /// Number of local variables shadowing each slot.
    pub(crate) ref_counts: Vec<u32>,
    /// Locations of the shadowing locals, for the averaging step.
    pub(crate) locations: Vec<Vec<LocalVarLoc>>,
    /// Released slots available for reuse.
    free: Vec<GlobalVarId>,
    by_atom: FxHashMap<GroundAtomId, GlobalVarId>,
}

impl GlobalVars {
    /// Number of live consensus variables.
    pub(crate) fn live_count(&self) -> usize {
        self.consensus.len() - self.free.len()
    }

    /// Iterator over the live slots as `(atom, consensus value)` pairs.
    pub(crate) fn live(&self) -> impl Iterator<Item = (GroundAtomId, f64)> + '_ {
        self.by_atom
            .iter()
            .map(move |(&atom, &id)| (atom, self.consensus[id.index()]))
    }
}

/// Store of optimization terms plus the consensus variables they share.
///
/// The central invariant: the number of live consensus variables equals the number of
/// distinct unknown atoms referenced by at least one term, and each slot's reference count
/// equals the number of locals shadowing it.
#[derive(Default)]
pub struct TermStore {
    pub(crate) terms: Vec<Term>,
    pub(crate) globals: GlobalVars,
    generated: FxHashSet<GroundRuleRef>,
}

impl TermStore {
    /// Create an empty term store.
    pub fn new() -> TermStore {
        TermStore::default()
    }

    /// Whether terms were already generated for the given ground rule.
    pub fn is_generated(&self, gref: GroundRuleRef) -> bool {
        self.generated.contains(&gref)
    }

    /// Marks a ground rule as processed by the term generator.
    ///
    /// Also recorded for ground rules that produce no term (constant potentials), so a
    /// repeated generation pass skips them.
    pub(crate) fn mark_generated(&mut self, gref: GroundRuleRef) {
        self.generated.insert(gref);
    }

    /// Returns the consensus variable for an atom, allocating a slot on first use.
    ///
    /// A new slot starts at the given initial value; an existing slot keeps its current
    /// consensus value.
    pub(crate) fn global_for_atom(&mut self, atom: GroundAtomId, initial: f64) -> GlobalVarId {
        let globals = &mut self.globals;
        if let Some(&id) = globals.by_atom.get(&atom) {
            return id;
        }

        let id = match globals.free.pop() {
            Some(id) => {
                globals.consensus[id.index()] = initial;
                globals.atoms[id.index()] = atom;
                globals.ref_counts[id.index()] = 0;
                globals.locations[id.index()].clear();
                id
            }
            None => {
                let id = GlobalVarId::from_index(globals.consensus.len());
                globals.consensus.push(initial);
                globals.atoms.push(atom);
                globals.ref_counts.push(0);
                globals.locations.push(vec![]);
                id
            }
        };

        globals.by_atom.insert(atom, id);
        id
    }

    /// The current consensus value of a variable.
    pub fn consensus_value(&self, id: GlobalVarId) -> f64 {
        self.globals.consensus[id.index()]
    }

    /// Number of locals shadowing the given consensus variable.
    pub fn fan_in(&self, id: GlobalVarId) -> usize {
        self.globals.locations[id.index()].len()
    }

    /// The consensus variable of an atom, if one is live.
    pub fn global_of(&self, atom: GroundAtomId) -> Option<GlobalVarId> {
        self.globals.by_atom.get(&atom).copied()
    }

    /// Adds a term, bumping the reference counts of the consensus variables it shadows.
    ///
    /// Never removes or resets existing consensus variables.
    pub(crate) fn add_term(&mut self, term: Term) {
        let index = self.terms.len();
        debug_assert!(index <= u32::max_value() as usize);

        for (offset, local) in term.locals().iter().enumerate() {
            let slot = local.global().index();
            self.globals.ref_counts[slot] += 1;
            self.globals.locations[slot].push(LocalVarLoc {
                term: index as u32,
                local: offset as u32,
            });
        }

        self.generated.insert(term.ground());
        self.terms.push(term);
    }

    /// Removes every term generated from the given rule.
    ///
    /// Reference counts of the shadowed consensus variables are decremented; a variable
    /// whose count reaches zero is released. Variables still referenced by other rules keep
    /// their consensus value unchanged.
    pub fn retract_rule(&mut self, rule: RuleId) -> usize {
        let globals = &mut self.globals;
        let generated = &mut self.generated;
        let mut removed = 0;

        let mut scan = VecMutScan::new(&mut self.terms);
        while let Some(term) = scan.next() {
            if term.rule() != rule {
                continue;
            }

            for local in term.locals().iter() {
                let slot = local.global().index();
                globals.ref_counts[slot] -= 1;
                if globals.ref_counts[slot] == 0 {
                    globals.by_atom.remove(&globals.atoms[slot]);
                    globals.free.push(local.global());
                }
            }

            generated.remove(&term.ground());
            term.remove();
            removed += 1;
        }
        drop(scan);

        if removed > 0 {
            self.rebuild_locations();
        }
        removed
    }

    /// Recomputes every slot's location list after the term vec was compacted.
    fn rebuild_locations(&mut self) {
        for locations in self.globals.locations.iter_mut() {
            locations.clear();
        }

        for (index, term) in self.terms.iter().enumerate() {
            for (offset, local) in term.locals().iter().enumerate() {
                self.globals.locations[local.global().index()].push(LocalVarLoc {
                    term: index as u32,
                    local: offset as u32,
                });
            }
        }

        for (slot, locations) in self.globals.locations.iter().enumerate() {
            debug_assert_eq!(locations.len(), self.globals.ref_counts[slot] as usize);
        }
    }

    /// Number of terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Number of live consensus variables.
    pub fn global_count(&self) -> usize {
        self.globals.live_count()
    }

    /// Total number of local variables over all terms.
    pub fn local_count(&self) -> usize {
        self.terms.iter().map(|term| term.arity()).sum()
    }

    /// Whether the store holds no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::term::{LocalVariable, TermKind};

    fn atom(index: usize) -> GroundAtomId {
        GroundAtomId::from_index(index)
    }

    fn hinge_term(store: &mut TermStore, rule: usize, ground: usize, atoms: &[usize]) {
        let locals: Vec<LocalVariable> = atoms
            .iter()
            .map(|&a| {
                let global = store.global_for_atom(atom(a), 0.0);
                LocalVariable::new(global, store.consensus_value(global))
            })
            .collect();
        let coeffs = vec![1.0; locals.len()];
        let term = Term::new(
            RuleId::from_index(rule),
            GroundRuleRef::from_index(ground),
            TermKind::Hinge,
            1.0,
            0.0,
            coeffs,
            locals,
        );
        store.add_term(term);
    }

    #[test]
    fn fan_in_matches_shadowing_terms() {
        let mut store = TermStore::new();

        hinge_term(&mut store, 0, 0, &[0, 1]);
        hinge_term(&mut store, 0, 1, &[1, 2]);
        hinge_term(&mut store, 1, 2, &[1]);

        assert_eq!(store.term_count(), 3);
        assert_eq!(store.global_count(), 3);
        assert_eq!(store.local_count(), 5);

        let shared = store.global_of(atom(1)).unwrap();
        assert_eq!(store.fan_in(shared), 3);
        assert_eq!(store.fan_in(store.global_of(atom(0)).unwrap()), 1);
    }

    #[test]
    fn retraction_releases_unreferenced_globals() {
        let mut store = TermStore::new();

        hinge_term(&mut store, 0, 0, &[0, 1]);
        hinge_term(&mut store, 1, 1, &[1, 2]);

        // Give the shared variable a solved value to observe after retraction.
        let shared = store.global_of(atom(1)).unwrap();
        store.globals.consensus[shared.index()] = 0.625;

        let removed = store.retract_rule(RuleId::from_index(0));
        assert_eq!(removed, 1);
        assert_eq!(store.term_count(), 1);

        // Atom 0 lost its last reference, atoms 1 and 2 survive.
        assert!(store.global_of(atom(0)).is_none());
        assert_eq!(store.global_count(), 2);
        assert_eq!(store.consensus_value(shared), 0.625);
        assert_eq!(store.fan_in(shared), 1);
        assert!(!store.is_generated(GroundRuleRef::from_index(0)));
        assert!(store.is_generated(GroundRuleRef::from_index(1)));

        // The released slot is reused for the next new atom.
        let recycled = store.global_for_atom(atom(7), 0.25);
        assert_eq!(store.consensus_value(recycled), 0.25);
        assert_eq!(store.global_count(), 3);
    }
}
