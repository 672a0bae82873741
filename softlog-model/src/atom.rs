//! Atom templates and ground atom identity keys.
use std::fmt;

use rustc_hash::FxHashMap;

use crate::predicate::PredicateId;
use crate::term::{Constant, Term, Variable};

/// A predicate applied to argument terms.
///
/// An atom is a template as long as any argument is a variable. Binding every variable to a
/// constant yields a [`GroundKey`], the identity of a ground atom.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Atom {
    predicate: PredicateId,
    args: Vec<Term>,
}

impl Atom {
    /// Creates an atom from a predicate and argument terms.
    pub fn new(predicate: PredicateId, args: Vec<Term>) -> Atom {
        Atom { predicate, args }
    }

    /// The atom's predicate.
    pub fn predicate(&self) -> PredicateId {
        self.predicate
    }

    /// The atom's argument terms.
    pub fn args(&self) -> &[Term] {
        &self.args
    }

    /// Iterator over the variable occurrences in this atom.
    ///
    /// A variable used in several argument positions is yielded once per position.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.args.iter().filter_map(|term| term.as_variable())
    }

    /// Whether all arguments are constants.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|term| term.is_ground())
    }

    /// Binds every variable using the given row, producing the ground identity key.
    ///
    /// The row must bind every variable of this atom. Formula analysis guarantees this for
    /// atoms of an accepted rule queried against the clause's positive literals.
    pub fn bind(&self, bindings: &Bindings) -> GroundKey {
        let args = self
            .args
            .iter()
            .map(|term| match term {
                Term::Constant(constant) => constant.clone(),
                Term::Variable(variable) => match bindings.get(variable) {
                    Some(constant) => constant.clone(),
                    None => panic!("grounding row does not bind variable {}", variable),
                },
            })
            .collect();

        GroundKey {
            predicate: self.predicate,
            args,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}(", self.predicate)?;
        for (i, term) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", term)?;
        }
        write!(f, ")")
    }
}

/// Identity of a ground atom: a predicate applied to constants only.
///
/// Two ground atoms with equal keys are the same atom. The engine's atom store relies on this
/// to intern a single shared slot per key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GroundKey {
    predicate: PredicateId,
    args: Vec<Constant>,
}

impl GroundKey {
    /// Creates a key from a predicate and constant arguments.
    pub fn new(predicate: PredicateId, args: Vec<Constant>) -> GroundKey {
        GroundKey { predicate, args }
    }

    /// The key's predicate.
    pub fn predicate(&self) -> PredicateId {
        self.predicate
    }

    /// The key's constant arguments.
    pub fn args(&self) -> &[Constant] {
        &self.args
    }
}

impl fmt::Display for GroundKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}(", self.predicate)?;
        for (i, constant) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", constant)?;
        }
        write!(f, ")")
    }
}

/// One variable-binding row of a grounding query result.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Bindings {
    values: FxHashMap<Variable, Constant>,
}

impl Bindings {
    /// Create an empty row.
    pub fn new() -> Bindings {
        Bindings::default()
    }

    /// Binds a variable, replacing any previous binding.
    pub fn set(&mut self, variable: Variable, constant: Constant) {
        self.values.insert(variable, constant);
    }

    /// The constant bound to a variable.
    pub fn get(&self, variable: &Variable) -> Option<&Constant> {
        self.values.get(variable)
    }

    /// Number of bound variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variables are bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
