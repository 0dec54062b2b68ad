//! Evaluates a parsed condition against one item.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynarepo_model::{AttributeValue, Item};

use super::ast::{Comparator, Condition, Function, Operand};
use super::number::compare_numbers;
use super::parser::ExpressionError;

/// An item plus the parameter values its condition refers to.
#[derive(Debug)]
pub struct EvalContext<'a> {
    pub item: &'a Item,
    pub values: &'a HashMap<String, AttributeValue>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(item: &'a Item, values: &'a HashMap<String, AttributeValue>) -> Self {
        Self { item, values }
    }

    /// Evaluate `condition`. Missing attributes make comparisons false; a
    /// missing parameter is an error.
    pub fn evaluate(&self, condition: &Condition) -> Result<bool, ExpressionError> {
        match condition {
            Condition::Compare { left, op, right } => {
                match (self.resolve(left)?, self.resolve(right)?) {
                    (Some(l), Some(r)) => Ok(compare_values(l, r, *op)),
                    _ => Ok(false),
                }
            }
            Condition::Between { value, low, high } => {
                let (Some(v), Some(lo), Some(hi)) =
                    (self.resolve(value)?, self.resolve(low)?, self.resolve(high)?)
                else {
                    return Ok(false);
                };
                Ok(compare_values(v, lo, Comparator::Ge) && compare_values(v, hi, Comparator::Le))
            }
            Condition::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Condition::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Condition::Not(inner) => self.evaluate(inner).map(|b| !b),
            Condition::Call { function, args } => self.call(*function, args),
        }
    }

    fn call(&self, function: Function, args: &[Operand]) -> Result<bool, ExpressionError> {
        let target = match args.first() {
            Some(Operand::Path(segments)) => self.lookup(segments),
            _ => {
                return Err(ExpressionError::InvalidOperand {
                    operation: function.to_string(),
                    message: "first argument must be an attribute path".to_owned(),
                });
            }
        };

        match function {
            Function::AttributeExists => Ok(target.is_some()),
            Function::AttributeNotExists => Ok(target.is_none()),
            Function::BeginsWith => {
                let prefix = self.argument(function, args)?;
                Ok(match (target, prefix) {
                    (Some(AttributeValue::S(s)), AttributeValue::S(p)) => s.starts_with(p.as_str()),
                    (Some(AttributeValue::B(b)), AttributeValue::B(p)) => b.starts_with(p),
                    _ => false,
                })
            }
            Function::Contains => {
                let needle = self.argument(function, args)?;
                Ok(match (target, needle) {
                    (Some(AttributeValue::S(s)), AttributeValue::S(sub)) => s.contains(sub.as_str()),
                    (Some(AttributeValue::Ss(set)), AttributeValue::S(v))
                    | (Some(AttributeValue::Ns(set)), AttributeValue::N(v)) => set.contains(v),
                    (Some(AttributeValue::Bs(set)), AttributeValue::B(v)) => set.contains(v),
                    (Some(AttributeValue::L(list)), v) => list.contains(v),
                    _ => false,
                })
            }
        }
    }

    fn argument(&self, function: Function, args: &[Operand]) -> Result<&'a AttributeValue, ExpressionError> {
        let Some(operand) = args.get(1) else {
            return Err(ExpressionError::Arity {
                function,
                expected: function.arity(),
                actual: args.len(),
            });
        };
        self.resolve(operand)?
            .ok_or_else(|| ExpressionError::InvalidOperand {
                operation: function.to_string(),
                message: format!("{operand} does not resolve to a value"),
            })
    }

    fn resolve(&self, operand: &Operand) -> Result<Option<&'a AttributeValue>, ExpressionError> {
        match operand {
            Operand::Path(segments) => Ok(self.lookup(segments)),
            Operand::Param(name) => self
                .values
                .get(name)
                .map(Some)
                .ok_or_else(|| ExpressionError::UnresolvedValue { name: name.clone() }),
        }
    }

    fn lookup(&self, segments: &[String]) -> Option<&'a AttributeValue> {
        let (first, rest) = segments.split_first()?;
        rest.iter()
            .try_fold(self.item.get(first)?, |current, segment| current.as_m()?.get(segment))
    }
}

/// Compare two values with store semantics: only like types order, strings
/// by bytes, numbers numerically, binaries by bytes. Values of different
/// types are only ever unequal.
#[must_use]
pub fn compare_values(left: &AttributeValue, right: &AttributeValue, op: Comparator) -> bool {
    let ordering = match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::N(a), AttributeValue::N(b)) => compare_numbers(a, b),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    };

    match (op, ordering) {
        (Comparator::Eq, Some(o)) => o == Ordering::Equal,
        (Comparator::Ne, Some(o)) => o != Ordering::Equal,
        (Comparator::Eq, None) => left == right,
        (Comparator::Ne, None) => left != right,
        (Comparator::Lt, Some(o)) => o == Ordering::Less,
        (Comparator::Le, Some(o)) => o != Ordering::Greater,
        (Comparator::Gt, Some(o)) => o == Ordering::Greater,
        (Comparator::Ge, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}
