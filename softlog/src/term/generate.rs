//! Lowering of ground rules into optimization terms.
use log::debug;
use partial_ref::{partial, PartialRef};
use rustc_hash::FxHashMap;

use softlog_model::{Comparator, Model, Rule, RuleId};

use crate::atoms::{AtomStore, GroundAtomId};
use crate::context::{AtomsP, Context, GroundStoreP, TermStoreP};
use crate::ground::store::{GroundPotential, GroundRuleRef};

use super::store::TermStore;
use super::{LocalVariable, Term, TermKind};

/// Generates terms for every ground rule not yet materialized.
///
/// Returns the number of new terms. Observed atoms are folded into the term constants here,
/// so only unknown atoms become local/consensus variables. A ground rule whose potential has
/// no unknowns left produces no term; its violation stays visible through the ground rule
/// store aggregates.
pub(crate) fn generate_terms(
    mut ctx: partial!(Context, mut TermStoreP, mut GroundStoreP, AtomsP),
    model: &Model,
) -> usize {
    let (term_store, mut ctx) = ctx.split_part_mut(TermStoreP);
    let (ground_store, ctx) = ctx.split_part_mut(GroundStoreP);
    let atoms = ctx.part(AtomsP);

    let mut generated = 0;

    for (gref, ground) in ground_store.iter() {
        if term_store.is_generated(gref) {
            continue;
        }

        let rule = match model.rule(ground.rule()) {
            Some(rule) => rule,
            // The parent rule left the model without a retraction; nothing to optimize.
            None => continue,
        };

        let (summands, constant) = match ground.potential() {
            GroundPotential::Clause { lits } => {
                let mut coeffs: FxHashMap<GroundAtomId, f64> = FxHashMap::default();
                let mut pos_count = 0usize;
                let mut constant = 0.0;
                for &lit in lits.iter() {
                    let coeff = if lit.is_positive() {
                        pos_count += 1;
                        1.0
                    } else {
                        -1.0
                    };
                    if atoms.is_observed(lit.atom()) {
                        constant -= coeff * atoms.value(lit.atom());
                    } else {
                        *coeffs.entry(lit.atom()).or_insert(0.0) += coeff;
                    }
                }
                constant += pos_count as f64 - 1.0;
                let summands: Vec<(GroundAtomId, f64)> = coeffs
                    .into_iter()
                    .filter(|&(_, coeff)| coeff != 0.0)
                    .collect();
                (summands, constant)
            }
            GroundPotential::Linear {
                summands,
                constant,
                ..
            } => {
                let mut folded = *constant;
                let mut unknowns = vec![];
                for &(atom, coeff) in summands.iter() {
                    if atoms.is_observed(atom) {
                        folded -= coeff * atoms.value(atom);
                    } else {
                        unknowns.push((atom, coeff));
                    }
                }
                (unknowns, folded)
            }
        };

        term_store.mark_generated(gref);

        if summands.is_empty() {
            continue;
        }

        generated += lower(term_store, atoms, ground.rule(), gref, rule, summands, constant);
    }

    debug!(
        "generated {} new terms, {} terms over {} consensus variables total",
        generated,
        term_store.term_count(),
        term_store.global_count()
    );

    generated
}

/// Builds the term(s) for one ground potential with folded constant.
fn lower(
    term_store: &mut TermStore,
    atoms: &AtomStore,
    rule_id: RuleId,
    gref: GroundRuleRef,
    rule: &Rule,
    summands: Vec<(GroundAtomId, f64)>,
    constant: f64,
) -> usize {
    match rule {
        Rule::WeightedLogical {
            weight, squared, ..
        } => {
            let kind = if *squared {
                TermKind::SquaredHinge
            } else {
                TermKind::Hinge
            };
            push_term(term_store, atoms, rule_id, gref, kind, *weight, &summands, constant);
            1
        }
        Rule::UnweightedLogical { .. } => {
            push_term(
                term_store,
                atoms,
                rule_id,
                gref,
                TermKind::Constraint(Comparator::LessEqual),
                0.0,
                &summands,
                constant,
            );
            1
        }
        Rule::WeightedArithmetic {
            expression,
            weight,
            squared,
        } => {
            let kind = if *squared {
                TermKind::SquaredHinge
            } else {
                TermKind::Hinge
            };
            match expression.comparator() {
                Comparator::LessEqual => {
                    push_term(term_store, atoms, rule_id, gref, kind, *weight, &summands, constant);
                    1
                }
                Comparator::GreaterEqual => {
                    let negated = negate(&summands);
                    push_term(term_store, atoms, rule_id, gref, kind, *weight, &negated, -constant);
                    1
                }
                // An equality potential penalizes both directions: one hinge piece per side.
                Comparator::Equal => {
                    push_term(term_store, atoms, rule_id, gref, kind, *weight, &summands, constant);
                    let negated = negate(&summands);
                    push_term(term_store, atoms, rule_id, gref, kind, *weight, &negated, -constant);
                    2
                }
            }
        }
        Rule::UnweightedArithmetic { expression } => {
            push_term(
                term_store,
                atoms,
                rule_id,
                gref,
                TermKind::Constraint(expression.comparator()),
                0.0,
                &summands,
                constant,
            );
            1
        }
    }
}

fn negate(summands: &[(GroundAtomId, f64)]) -> Vec<(GroundAtomId, f64)> {
    summands
        .iter()
        .map(|&(atom, coeff)| (atom, -coeff))
        .collect()
}

fn push_term(
    term_store: &mut TermStore,
    atoms: &AtomStore,
    rule_id: RuleId,
    gref: GroundRuleRef,
    kind: TermKind,
    weight: f64,
    summands: &[(GroundAtomId, f64)],
    constant: f64,
) {
    let mut coeffs = Vec::with_capacity(summands.len());
    let mut locals = Vec::with_capacity(summands.len());

    for &(atom, coeff) in summands.iter() {
        let global = term_store.global_for_atom(atom, atoms.value(atom));
        coeffs.push(coeff);
        locals.push(LocalVariable::new(global, term_store.consensus_value(global)));
    }

    term_store.add_term(Term::new(rule_id, gref, kind, weight, constant, coeffs, locals));
}
