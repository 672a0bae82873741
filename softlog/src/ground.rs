//! Query-driven rule grounding.
//!
//! Grounding turns a first-order rule into concrete [`GroundRule`] instances: the clause's
//! query form is executed against the fact store and each resulting variable-binding row is
//! instantiated in parallel. Rows are independent; the only shared structures are the atom
//! store and the ground-rule store, both of which take concurrent inserts. Instances that can
//! never be violated are dropped here, before they are ever stored; this worst-case pruning
//! is what keeps dense predicates from blowing up the problem size.
use log::debug;
use partial_ref::{partial, PartialRef};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use softlog_model::{
    Atom, ArithmeticExpression, Comparator, Model, NegatedClause, Rule, RuleId,
};

use crate::atoms::{AtomStore, GroundAtomId, GroundLit};
use crate::config::GrounderConfig;
use crate::context::{AtomsP, Context, GroundStoreP};
use crate::facts::FactStore;

pub mod store;

use store::{GroundRule, GroundRuleStore};

/// Grounds every rule of the model.
///
/// Returns the number of new ground rules produced.
pub(crate) fn ground_all(
    mut ctx: partial!(Context, AtomsP, GroundStoreP),
    config: &GrounderConfig,
    model: &Model,
    facts: &dyn FactStore,
) -> usize {
    let mut produced = 0;
    for (rule_id, rule) in model.rules() {
        produced += ground_rule(ctx.borrow(), config, rule_id, rule, facts);
    }
    produced
}

/// Grounds a single rule.
///
/// Re-grounding against an unchanged fact store is idempotent: instances are identified by
/// their literal set and duplicates are suppressed by the store.
pub(crate) fn ground_rule(
    ctx: partial!(Context, AtomsP, GroundStoreP),
    config: &GrounderConfig,
    rule_id: RuleId,
    rule: &Rule,
    facts: &dyn FactStore,
) -> usize {
    let atoms = ctx.part(AtomsP);
    let ground_store = ctx.part(GroundStoreP);

    let initial = ground_store.count(rule_id);

    if let Some(clause) = rule.logical_clause() {
        ground_clause(atoms, ground_store, config, rule_id, rule, clause, facts);
    } else if let Some(expression) = rule.arithmetic_expression() {
        ground_linear(atoms, ground_store, config, rule_id, rule, expression, facts);
    }

    let produced = ground_store.count(rule_id) - initial;
    debug!("grounded {} instances of rule {:?}", produced, rule_id);
    produced
}

/// Per-task scratch storage for clause instantiation.
#[derive(Default)]
struct ClauseScratch {
    lits: Vec<GroundLit>,
    worst: FxHashMap<GroundAtomId, f64>,
}

fn ground_clause(
    atoms: &AtomStore,
    ground_store: &GroundRuleStore,
    config: &GrounderConfig,
    rule_id: RuleId,
    rule: &Rule,
    clause: &NegatedClause,
    facts: &dyn FactStore,
) {
    let rows = facts.query_bindings(clause.query_atoms());
    let weighted = rule.is_weighted();

    rows.par_iter().for_each_init(ClauseScratch::default, |scratch, row| {
        scratch.lits.clear();
        scratch.worst.clear();
        let mut has_unknown = false;

        for atom in clause.pos_literals() {
            let interned = atoms.intern(atom.bind(row), facts);
            has_unknown |= !interned.observed;
            let worst = if interned.observed { interned.value } else { 1.0 };
            scratch.worst.insert(interned.id, worst);
            scratch.lits.push(GroundLit::positive(interned.id));
        }

        for atom in clause.neg_literals() {
            let interned = atoms.intern(atom.bind(row), facts);
            has_unknown |= !interned.observed;
            // An unknown appearing both positively and negatively ends up at its negative
            // worst case; the clause value is unaffected since the contributions cancel.
            let worst = if interned.observed { interned.value } else { 0.0 };
            scratch.worst.insert(interned.id, worst);
            scratch.lits.push(GroundLit::negative(interned.id));
        }

        let ground = GroundRule::clause(rule_id, scratch.lits.drain(..).collect());
        let worst_case = clause_worst_case(&ground, &scratch.worst);

        // An instance whose potential cannot exceed the strict epsilon can never be
        // violated and is dropped. A constant instance of a weighted rule only shifts the
        // objective and is dropped as well; a constant but violated constraint instance is
        // kept so its infeasibility stays visible.
        if worst_case > config.strict_epsilon && (has_unknown || !weighted) {
            ground_store.add(ground);
        }
    });
}

/// The clause potential evaluated at the worst-case atom values.
fn clause_worst_case(ground: &GroundRule, worst: &FxHashMap<GroundAtomId, f64>) -> f64 {
    match ground.potential() {
        store::GroundPotential::Clause { lits } => {
            let mut total = 0.0;
            let mut pos_count = 0usize;
            for &lit in lits.iter() {
                let value = worst[&lit.atom()];
                if lit.is_positive() {
                    total += value;
                    pos_count += 1;
                } else {
                    total -= value;
                }
            }
            (total - (pos_count as f64 - 1.0)).max(0.0)
        }
        store::GroundPotential::Linear { .. } => unreachable!("clause instance"),
    }
}

/// Per-task scratch storage for linear instantiation.
#[derive(Default)]
struct LinearScratch {
    merged: FxHashMap<GroundAtomId, MergedSummand>,
}

#[derive(Copy, Clone, Default)]
struct MergedSummand {
    coefficient: f64,
    value: f64,
    observed: bool,
}

fn ground_linear(
    atoms: &AtomStore,
    ground_store: &GroundRuleStore,
    config: &GrounderConfig,
    rule_id: RuleId,
    rule: &Rule,
    expression: &ArithmeticExpression,
    facts: &dyn FactStore,
) {
    let query: Vec<Atom> = expression.query_atoms().cloned().collect();
    let rows = facts.query_bindings(&query);
    let weighted = rule.is_weighted();
    let comparator = expression.comparator();
    let constant = expression.constant();

    rows.par_iter().for_each_init(LinearScratch::default, |scratch, row| {
        scratch.merged.clear();

        for summand in expression.summands() {
            let interned = atoms.intern(summand.atom.bind(row), facts);
            let entry = scratch.merged.entry(interned.id).or_default();
            entry.coefficient += summand.coefficient;
            entry.value = interned.value;
            entry.observed = interned.observed;
        }

        let mut summands = vec![];
        let mut has_unknown = false;
        // Bounds of the achievable sum: observed atoms are fixed, unknowns range over [0,1].
        let mut lo = 0.0;
        let mut hi = 0.0;
        for (&atom, entry) in scratch.merged.iter() {
            if entry.coefficient == 0.0 {
                continue;
            }
            summands.push((atom, entry.coefficient));
            if entry.observed {
                lo += entry.coefficient * entry.value;
                hi += entry.coefficient * entry.value;
            } else {
                has_unknown = true;
                if entry.coefficient > 0.0 {
                    hi += entry.coefficient;
                } else {
                    lo += entry.coefficient;
                }
            }
        }

        let worst_case = match comparator {
            Comparator::LessEqual => (hi - constant).max(0.0),
            Comparator::GreaterEqual => (constant - lo).max(0.0),
            Comparator::Equal => (hi - constant).max(0.0).max((constant - lo).max(0.0)),
        };

        if worst_case > config.strict_epsilon && (has_unknown || !weighted) {
            ground_store.add(GroundRule::linear(rule_id, summands, comparator, constant));
        }
    });
}
