//! Constants, variables and argument terms.
use std::fmt;

/// A constant argument value of a ground atom.
///
/// Constants are immutable and compared by value. The unique id variant is the cheap
/// interned-entity representation, the other variants carry attribute values directly.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Constant {
    /// An opaque entity identifier.
    UniqueId(u64),
    /// A string attribute.
    Text(String),
    /// An integer attribute.
    Integer(i64),
}

impl Constant {
    /// Creates a unique id constant.
    pub fn uid(id: u64) -> Constant {
        Constant::UniqueId(id)
    }

    /// Creates a string attribute constant.
    pub fn text(value: impl Into<String>) -> Constant {
        Constant::Text(value.into())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::UniqueId(id) => write!(f, "'{}'", id),
            Constant::Text(text) => write!(f, "\"{}\"", text),
            Constant::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// A first-order variable of a rule template.
///
/// Variables are compared by name. The scope of a variable is a single rule, there is no
/// cross-rule identity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Variable {
    name: String,
}

impl Variable {
    /// Creates a variable with the given name.
    pub fn new(name: impl Into<String>) -> Variable {
        Variable { name: name.into() }
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An argument of an atom template: a variable or a constant.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    Variable(Variable),
    Constant(Constant),
}

impl Term {
    /// Shortcut for a variable term.
    pub fn var(name: impl Into<String>) -> Term {
        Term::Variable(Variable::new(name))
    }

    /// Shortcut for a unique id constant term.
    pub fn uid(id: u64) -> Term {
        Term::Constant(Constant::UniqueId(id))
    }

    /// Shortcut for a string attribute constant term.
    pub fn text(value: impl Into<String>) -> Term {
        Term::Constant(Constant::text(value))
    }

    /// The variable of this term, if it is one.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Term::Variable(variable) => Some(variable),
            Term::Constant(_) => None,
        }
    }

    /// Whether this term is a constant.
    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }
}

impl From<Variable> for Term {
    fn from(variable: Variable) -> Term {
        Term::Variable(variable)
    }
}

impl From<Constant> for Term {
    fn from(constant: Constant) -> Term {
        Term::Constant(constant)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Variable(variable) => fmt::Display::fmt(variable, f),
            Term::Constant(constant) => fmt::Display::fmt(constant, f),
        }
    }
}

#[cfg(any(test, feature = "proptest-strategies"))]
#[doc(hidden)]
pub mod strategy {
    use super::*;
    use proptest::prelude::*;

    pub fn constant(universe: impl Strategy<Value = u64>) -> impl Strategy<Value = Constant> {
        universe.prop_map(Constant::UniqueId)
    }
}
