//! Formula analysis for rule construction.
//!
//! A logical rule is grounded and turned into a hinge potential through the clause form of its
//! *negated* formula: the negation must rewrite to exactly one conjunctive clause. [`analyze`]
//! performs that rewriting and checks the invariants that make the clause groundable. All
//! failures here are permanent, rule-construction-time errors.
use std::fmt;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::atom::Atom;
use crate::formula::{dnf, Formula};
use crate::term::Variable;

/// Errors rejecting a formula at rule construction.
#[derive(Debug, Error)]
pub enum MalformedRuleError {
    #[error(
        "negated formula must be a single conjunctive clause, but rewrites to {clauses} clauses"
    )]
    MultipleClauses { clauses: usize },
    #[error(
        "any variable used in a negated literal must also occur in a positive literal; \
         unbound: [{}]",
        .variables.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ")
    )]
    UnboundVariables { variables: Vec<Variable> },
    #[error("formula has no variables and is not a template")]
    GroundFormula,
    #[error("clause has no positive literals and cannot be turned into a query")]
    NotQueryable,
    #[error("rule weight must be non-negative, got {weight}")]
    NegativeWeight { weight: f64 },
    #[error("rule has no weight")]
    NotWeighted,
}

/// The single conjunctive clause a rule's negated formula rewrites to.
///
/// An instance of the rule is violated to the degree that all positive literals are true and
/// all negated literals are false. The positive literals double as the grounding query.
#[derive(Clone, PartialEq, Debug)]
pub struct NegatedClause {
    pos: Vec<Atom>,
    neg: Vec<Atom>,
}

impl NegatedClause {
    /// The clause's positive literals.
    pub fn pos_literals(&self) -> &[Atom] {
        &self.pos
    }

    /// The clause's negated literals.
    pub fn neg_literals(&self) -> &[Atom] {
        &self.neg
    }

    /// The atoms whose conjunction forms the grounding query.
    pub fn query_atoms(&self) -> &[Atom] {
        &self.pos
    }

    /// The set of variables occurring anywhere in the clause.
    pub fn variables(&self) -> FxHashSet<&Variable> {
        self.pos
            .iter()
            .chain(self.neg.iter())
            .flat_map(|atom| atom.variables())
            .collect()
    }
}

impl fmt::Display for NegatedClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for atom in self.pos.iter() {
            if !first {
                write!(f, " & ")?;
            }
            first = false;
            write!(f, "{}", atom)?;
        }
        for atom in self.neg.iter() {
            if !first {
                write!(f, " & ")?;
            }
            first = false;
            write!(f, "!{}", atom)?;
        }
        Ok(())
    }
}

/// Analyzes a rule's defining formula into its negated clause form.
///
/// Rejects formulas that (a) negate to more than one clause, (b) use a variable only in
/// negated literals, (c) contain no variables, or (d) yield no executable query.
pub fn analyze(formula: &Formula) -> Result<NegatedClause, MalformedRuleError> {
    let mut clauses = dnf(formula, true);

    if clauses.len() != 1 {
        return Err(MalformedRuleError::MultipleClauses {
            clauses: clauses.len(),
        });
    }

    let mut pos = vec![];
    let mut neg = vec![];
    for literal in clauses.pop().unwrap_or_default() {
        let target = if literal.negated { &mut neg } else { &mut pos };
        // Repeated literals contribute nothing to the clause, drop them.
        if !target.contains(&literal.atom) {
            target.push(literal.atom);
        }
    }

    let bound: FxHashSet<&Variable> = pos.iter().flat_map(|atom| atom.variables()).collect();
    let mut unbound: Vec<Variable> = neg
        .iter()
        .flat_map(|atom| atom.variables())
        .filter(|variable| !bound.contains(variable))
        .cloned()
        .collect();

    if !unbound.is_empty() {
        unbound.sort();
        unbound.dedup();
        return Err(MalformedRuleError::UnboundVariables { variables: unbound });
    }

    let clause = NegatedClause { pos, neg };

    if clause.variables().is_empty() {
        return Err(MalformedRuleError::GroundFormula);
    }

    if clause.pos.is_empty() {
        return Err(MalformedRuleError::NotQueryable);
    }

    Ok(clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{PredicateId, PredicateStore};
    use crate::term::Term;

    fn binary(predicates: &mut PredicateStore, name: &str) -> PredicateId {
        predicates.register(name, 2)
    }

    fn atom(predicate: PredicateId, x: &str, y: &str) -> Atom {
        Atom::new(predicate, vec![Term::var(x), Term::var(y)])
    }

    #[test]
    fn implication_analyzes_to_body_and_negated_head() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");
        let likes = binary(&mut predicates, "likes");

        let formula = Formula::implies(
            Formula::atom(atom(knows, "X", "Y")),
            Formula::atom(atom(likes, "X", "Y")),
        );

        let clause = analyze(&formula).unwrap();
        assert_eq!(clause.pos_literals(), &[atom(knows, "X", "Y")]);
        assert_eq!(clause.neg_literals(), &[atom(likes, "X", "Y")]);
        assert_eq!(clause.variables().len(), 2);
    }

    #[test]
    fn conjunctive_body_is_accepted() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");
        let likes = binary(&mut predicates, "likes");

        // knows(X, Y) & knows(Y, Z) -> likes(X, Z)
        let formula = Formula::implies(
            Formula::and(vec![
                Formula::atom(atom(knows, "X", "Y")),
                Formula::atom(atom(knows, "Y", "Z")),
            ]),
            Formula::atom(atom(likes, "X", "Z")),
        );

        let clause = analyze(&formula).unwrap();
        assert_eq!(clause.pos_literals().len(), 2);
        assert_eq!(clause.neg_literals().len(), 1);
        assert_eq!(clause.query_atoms(), clause.pos_literals());
    }

    #[test]
    fn conjunctive_head_is_rejected() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");
        let likes = binary(&mut predicates, "likes");
        let trusts = binary(&mut predicates, "trusts");

        let formula = Formula::implies(
            Formula::atom(atom(knows, "X", "Y")),
            Formula::and(vec![
                Formula::atom(atom(likes, "X", "Y")),
                Formula::atom(atom(trusts, "X", "Y")),
            ]),
        );

        match analyze(&formula) {
            Err(MalformedRuleError::MultipleClauses { clauses: 2 }) => (),
            other => panic!("unexpected analysis result: {:?}", other),
        }
    }

    #[test]
    fn head_only_variable_is_rejected() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");
        let likes = binary(&mut predicates, "likes");

        // knows(X, X) -> likes(X, Z): Z never occurs positively in the negated clause.
        let formula = Formula::implies(
            Formula::atom(Atom::new(knows, vec![Term::var("X"), Term::var("X")])),
            Formula::atom(atom(likes, "X", "Z")),
        );

        match analyze(&formula) {
            Err(MalformedRuleError::UnboundVariables { variables }) => {
                assert_eq!(variables, vec![Variable::new("Z")]);
            }
            other => panic!("unexpected analysis result: {:?}", other),
        }
    }

    #[test]
    fn ground_formula_is_rejected() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");

        let formula = Formula::atom(Atom::new(knows, vec![Term::uid(1), Term::uid(2)]));

        match analyze(&Formula::not(formula)) {
            Err(MalformedRuleError::GroundFormula) => (),
            other => panic!("unexpected analysis result: {:?}", other),
        }
    }

    #[test]
    fn repeated_literals_collapse() {
        let mut predicates = PredicateStore::new();
        let knows = binary(&mut predicates, "knows");

        // !(knows(X, Y) & knows(X, Y)) negates to a clause with one literal.
        let formula = Formula::not(Formula::and(vec![
            Formula::atom(atom(knows, "X", "Y")),
            Formula::atom(atom(knows, "X", "Y")),
        ]));

        let clause = analyze(&formula).unwrap();
        assert_eq!(clause.pos_literals().len(), 1);
        assert!(clause.neg_literals().is_empty());
    }
}
