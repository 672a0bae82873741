//! Rules and the model container.
use std::fmt;

use crate::analysis::{analyze, MalformedRuleError, NegatedClause};
use crate::atom::Atom;
use crate::formula::Formula;
use crate::term::Variable;

use rustc_hash::FxHashSet;

/// The backing type used to represent rule ids.
pub type RuleIdx = u32;

/// Compact reference to a rule within a [`Model`].
///
/// Rule ids are stable across removals of other rules and are never reused.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RuleId {
    index: RuleIdx,
}

impl RuleId {
    /// Creates a rule id from a 0-based index.
    #[inline]
    pub fn from_index(index: usize) -> RuleId {
        debug_assert!(index <= RuleIdx::max_value() as usize);
        RuleId {
            index: index as RuleIdx,
        }
    }

    /// The 0-based index representing this rule.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}", self.index)
    }
}

/// Comparison operator of an arithmetic rule.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Comparator {
    LessEqual,
    Equal,
    GreaterEqual,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Comparator::LessEqual => write!(f, "<="),
            Comparator::Equal => write!(f, "="),
            Comparator::GreaterEqual => write!(f, ">="),
        }
    }
}

/// One coefficient-scaled atom of an arithmetic expression.
#[derive(Clone, PartialEq, Debug)]
pub struct Summand {
    pub coefficient: f64,
    pub atom: Atom,
}

/// A linear expression over atom templates compared against a constant.
///
/// Represents `sum_i coefficient_i * atom_i  cmp  constant`. Every atom takes part in the
/// grounding query, so all variables are bound by construction.
#[derive(Clone, PartialEq, Debug)]
pub struct ArithmeticExpression {
    summands: Vec<Summand>,
    comparator: Comparator,
    constant: f64,
}

impl ArithmeticExpression {
    /// Creates an arithmetic expression.
    ///
    /// Rejects expressions without variables, which are not templates.
    pub fn new(
        summands: Vec<Summand>,
        comparator: Comparator,
        constant: f64,
    ) -> Result<ArithmeticExpression, MalformedRuleError> {
        let has_variables = summands
            .iter()
            .any(|summand| summand.atom.variables().next().is_some());
        if !has_variables {
            return Err(MalformedRuleError::GroundFormula);
        }

        Ok(ArithmeticExpression {
            summands,
            comparator,
            constant,
        })
    }

    /// The expression's summands.
    pub fn summands(&self) -> &[Summand] {
        &self.summands
    }

    /// The expression's comparator.
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// The constant the linear sum is compared against.
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// The atoms whose conjunction forms the grounding query.
    pub fn query_atoms(&self) -> impl Iterator<Item = &Atom> {
        self.summands.iter().map(|summand| &summand.atom)
    }

    /// The set of variables occurring in the expression.
    pub fn variables(&self) -> FxHashSet<&Variable> {
        self.summands
            .iter()
            .flat_map(|summand| summand.atom.variables())
            .collect()
    }
}

/// A first-order rule template.
///
/// A closed union over the logical/arithmetic and weighted/unweighted axes. Weighted rules
/// contribute a hinge-loss potential scaled by their weight; unweighted rules are hard
/// constraints.
#[derive(Clone, PartialEq, Debug)]
pub enum Rule {
    WeightedLogical {
        formula: Formula,
        clause: NegatedClause,
        weight: f64,
        squared: bool,
    },
    UnweightedLogical {
        formula: Formula,
        clause: NegatedClause,
    },
    WeightedArithmetic {
        expression: ArithmeticExpression,
        weight: f64,
        squared: bool,
    },
    UnweightedArithmetic {
        expression: ArithmeticExpression,
    },
}

fn check_weight(weight: f64) -> Result<(), MalformedRuleError> {
    if weight < 0.0 || !weight.is_finite() {
        return Err(MalformedRuleError::NegativeWeight { weight });
    }
    Ok(())
}

impl Rule {
    /// Creates a weighted logical rule, analyzing its formula.
    pub fn weighted_logical(
        formula: Formula,
        weight: f64,
        squared: bool,
    ) -> Result<Rule, MalformedRuleError> {
        check_weight(weight)?;
        let clause = analyze(&formula)?;
        Ok(Rule::WeightedLogical {
            formula,
            clause,
            weight,
            squared,
        })
    }

    /// Creates an unweighted (hard constraint) logical rule, analyzing its formula.
    pub fn unweighted_logical(formula: Formula) -> Result<Rule, MalformedRuleError> {
        let clause = analyze(&formula)?;
        Ok(Rule::UnweightedLogical { formula, clause })
    }

    /// Creates a weighted arithmetic rule.
    pub fn weighted_arithmetic(
        expression: ArithmeticExpression,
        weight: f64,
        squared: bool,
    ) -> Result<Rule, MalformedRuleError> {
        check_weight(weight)?;
        Ok(Rule::WeightedArithmetic {
            expression,
            weight,
            squared,
        })
    }

    /// Creates an unweighted (hard constraint) arithmetic rule.
    pub fn unweighted_arithmetic(expression: ArithmeticExpression) -> Rule {
        Rule::UnweightedArithmetic { expression }
    }

    /// Whether the rule carries a weight.
    pub fn is_weighted(&self) -> bool {
        matches!(
            self,
            Rule::WeightedLogical { .. } | Rule::WeightedArithmetic { .. }
        )
    }

    /// The rule's weight, if it is weighted.
    pub fn weight(&self) -> Option<f64> {
        match self {
            Rule::WeightedLogical { weight, .. } | Rule::WeightedArithmetic { weight, .. } => {
                Some(*weight)
            }
            _ => None,
        }
    }

    /// Updates the weight of a weighted rule.
    pub fn set_weight(&mut self, new_weight: f64) -> Result<(), MalformedRuleError> {
        check_weight(new_weight)?;
        match self {
            Rule::WeightedLogical { weight, .. } | Rule::WeightedArithmetic { weight, .. } => {
                *weight = new_weight;
                Ok(())
            }
            _ => Err(MalformedRuleError::NotWeighted),
        }
    }

    /// Whether the rule's potential is squared.
    pub fn squared(&self) -> bool {
        match self {
            Rule::WeightedLogical { squared, .. } | Rule::WeightedArithmetic { squared, .. } => {
                *squared
            }
            _ => false,
        }
    }

    /// The negated clause of a logical rule.
    pub fn logical_clause(&self) -> Option<&NegatedClause> {
        match self {
            Rule::WeightedLogical { clause, .. } | Rule::UnweightedLogical { clause, .. } => {
                Some(clause)
            }
            _ => None,
        }
    }

    /// The expression of an arithmetic rule.
    pub fn arithmetic_expression(&self) -> Option<&ArithmeticExpression> {
        match self {
            Rule::WeightedArithmetic { expression, .. }
            | Rule::UnweightedArithmetic { expression } => Some(expression),
            _ => None,
        }
    }
}

/// An unordered collection of rules.
///
/// Insertion order carries no semantics, but rule additions and removals are observable by
/// incremental callers, so ids stay stable and removed slots are never reused.
#[derive(Default)]
pub struct Model {
    slots: Vec<Option<Rule>>,
    len: usize,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Model {
        Model::default()
    }

    /// Adds a rule, returning its id.
    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        let id = RuleId::from_index(self.slots.len());
        self.slots.push(Some(rule));
        self.len += 1;
        id
    }

    /// Removes a rule, returning it if it was present.
    pub fn remove_rule(&mut self, id: RuleId) -> Option<Rule> {
        let rule = self.slots.get_mut(id.index())?.take();
        if rule.is_some() {
            self.len -= 1;
        }
        rule
    }

    /// Access a rule by id.
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Mutable access to a rule by id.
    pub fn rule_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Iterator over all rules in the model.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((RuleId::from_index(index), slot.as_ref()?)))
    }

    /// Number of rules in the model.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the model has no rules.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
