//! First-order formula trees.
use std::fmt;

use crate::atom::Atom;

/// The defining formula of a logical rule.
///
/// Formulas are finite trees over atoms, negation, conjunction, disjunction and implication.
/// Rules do not evaluate formulas directly; formula analysis rewrites the negation of a rule's
/// formula into a single conjunctive clause (see [`crate::analysis`]).
#[derive(Clone, PartialEq, Debug)]
pub enum Formula {
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Shortcut for an atom formula.
    pub fn atom(atom: Atom) -> Formula {
        Formula::Atom(atom)
    }

    /// Negation of a formula.
    pub fn not(formula: Formula) -> Formula {
        Formula::Not(Box::new(formula))
    }

    /// Conjunction of formulas.
    pub fn and(formulas: Vec<Formula>) -> Formula {
        Formula::And(formulas)
    }

    /// Disjunction of formulas.
    pub fn or(formulas: Vec<Formula>) -> Formula {
        Formula::Or(formulas)
    }

    /// Implication between two formulas.
    pub fn implies(body: Formula, head: Formula) -> Formula {
        Formula::Implies(Box::new(body), Box::new(head))
    }
}

/// An atom occurrence with a polarity.
#[derive(Clone, PartialEq, Debug)]
pub struct SignedAtom {
    pub atom: Atom,
    pub negated: bool,
}

/// Rewrites a formula into disjunctive normal form, optionally negating it first.
///
/// Each inner vec is one conjunctive clause of signed atoms. The rewriting distributes
/// conjunction over disjunction, so the result can be exponentially larger than the input;
/// rule formulas are small and formula analysis rejects any result with more than one clause
/// anyway.
pub fn dnf(formula: &Formula, negate: bool) -> Vec<Vec<SignedAtom>> {
    match formula {
        Formula::Atom(atom) => vec![vec![SignedAtom {
            atom: atom.clone(),
            negated: negate,
        }]],
        Formula::Not(inner) => dnf(inner, !negate),
        Formula::And(parts) => {
            if negate {
                // De Morgan: the negation of a conjunction is the disjunction of negations.
                let mut clauses = vec![];
                for part in parts {
                    clauses.extend(dnf(part, true));
                }
                clauses
            } else {
                distribute(parts, false)
            }
        }
        Formula::Or(parts) => {
            if negate {
                distribute(parts, true)
            } else {
                let mut clauses = vec![];
                for part in parts {
                    clauses.extend(dnf(part, false));
                }
                clauses
            }
        }
        Formula::Implies(body, head) => {
            // body -> head is !body \/ head
            let rewritten = Formula::Or(vec![
                Formula::Not(body.clone()),
                head.as_ref().clone(),
            ]);
            dnf(&rewritten, negate)
        }
    }
}

/// Cartesian product of the sub-formulas' DNF clause lists.
fn distribute(parts: &[Formula], negate: bool) -> Vec<Vec<SignedAtom>> {
    let mut clauses: Vec<Vec<SignedAtom>> = vec![vec![]];

    for part in parts {
        let part_clauses = dnf(part, negate);
        let mut next = Vec::with_capacity(clauses.len() * part_clauses.len());

        for clause in clauses.iter() {
            for part_clause in part_clauses.iter() {
                let mut merged = clause.clone();
                merged.extend(part_clause.iter().cloned());
                next.push(merged);
            }
        }

        clauses = next;
    }

    clauses
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Formula::Atom(atom) => write!(f, "{}", atom),
            Formula::Not(inner) => write!(f, "!{}", inner),
            Formula::And(parts) => write_joined(f, parts, " & "),
            Formula::Or(parts) => write_joined(f, parts, " | "),
            Formula::Implies(body, head) => write!(f, "({} -> {})", body, head),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter, parts: &[Formula], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}
