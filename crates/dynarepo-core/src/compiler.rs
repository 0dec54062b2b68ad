//! Key and filter condition compiler.
//!
//! A [`KeyConditions`] map pairs attribute names with an
//! [`AttributeExpression`]. Compiling it produces one clause per entry, in
//! insertion order, joined with `" and "`, plus the parameter bindings those
//! clauses reference:
//!
//! ```text
//! pk = "post2", sk = begins_with("comment")
//!   => "pk = :pk and begins_with(sk, :sk)"
//!      { ":pk": "post2", ":sk": "comment" }
//! ```
//!
//! Attribute names are emitted as given. Values are never inspected; a
//! malformed condition is reported by the store when the request runs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;

use dynarepo_model::AttributeValue;

use crate::error::CompileError;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Ordering comparisons. Equality is [`AttributeExpression::Equals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOperator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOperator {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(CompileError::UnknownOperator {
                operator: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// AttributeExpression
// ---------------------------------------------------------------------------

/// The condition placed on a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeExpression {
    /// `name = :name`. Bare values convert into this variant.
    Equals(AttributeValue),
    /// `name <op> :name`.
    Compare(CompareOperator, AttributeValue),
    /// `begins_with(name, :name)`.
    BeginsWith(AttributeValue),
    /// `name between :namemin and :namemax`, inclusive.
    Between(AttributeValue, AttributeValue),
}

impl AttributeExpression {
    #[must_use]
    pub fn equals(value: impl Into<AttributeValue>) -> Self {
        Self::Equals(value.into())
    }

    #[must_use]
    pub fn begins_with(prefix: impl Into<AttributeValue>) -> Self {
        Self::BeginsWith(prefix.into())
    }

    #[must_use]
    pub fn between(min: impl Into<AttributeValue>, max: impl Into<AttributeValue>) -> Self {
        Self::Between(min.into(), max.into())
    }

    #[must_use]
    pub fn lt(value: impl Into<AttributeValue>) -> Self {
        Self::Compare(CompareOperator::Lt, value.into())
    }

    #[must_use]
    pub fn le(value: impl Into<AttributeValue>) -> Self {
        Self::Compare(CompareOperator::Le, value.into())
    }

    #[must_use]
    pub fn gt(value: impl Into<AttributeValue>) -> Self {
        Self::Compare(CompareOperator::Gt, value.into())
    }

    #[must_use]
    pub fn ge(value: impl Into<AttributeValue>) -> Self {
        Self::Compare(CompareOperator::Ge, value.into())
    }

    /// Build a comparison from an operator tag.
    ///
    /// `"="` yields [`Self::Equals`]. Any tag that is not a comparison
    /// operator, including function names such as `"begins_with"`, is
    /// rejected.
    pub fn compare(operator: &str, value: impl Into<AttributeValue>) -> Result<Self, CompileError> {
        if operator == "=" {
            return Ok(Self::Equals(value.into()));
        }
        Ok(Self::Compare(operator.parse()?, value.into()))
    }

    fn clause(&self, name: &str) -> String {
        match self {
            Self::Equals(_) => format!("{name} = :{name}"),
            Self::Compare(op, _) => format!("{name} {op} :{name}"),
            Self::BeginsWith(_) => format!("begins_with({name}, :{name})"),
            Self::Between(..) => format!("{name} between :{name}min and :{name}max"),
        }
    }

    fn bindings(&self, name: &str) -> Vec<(String, AttributeValue)> {
        match self {
            Self::Equals(v) | Self::Compare(_, v) | Self::BeginsWith(v) => {
                vec![(format!(":{name}"), v.clone())]
            }
            Self::Between(min, max) => vec![
                (format!(":{name}min"), min.clone()),
                (format!(":{name}max"), max.clone()),
            ],
        }
    }
}

impl From<AttributeValue> for AttributeExpression {
    fn from(value: AttributeValue) -> Self {
        Self::Equals(value)
    }
}

macro_rules! equals_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeExpression {
                fn from(value: $ty) -> Self {
                    Self::Equals(AttributeValue::from(value))
                }
            }
        )*
    };
}

equals_from!(&str, String, bool, i32, i64, u32, u64, f64);

// ---------------------------------------------------------------------------
// KeyConditions
// ---------------------------------------------------------------------------

/// Ordered map of attribute name to condition.
///
/// Iteration follows insertion order. Setting a name that is already present
/// replaces its expression without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyConditions {
    entries: Vec<(String, AttributeExpression)>,
}

impl KeyConditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`KeyConditions::set`].
    #[must_use]
    pub fn and(mut self, name: impl Into<String>, expr: impl Into<AttributeExpression>) -> Self {
        self.set(name, expr);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, expr: impl Into<AttributeExpression>) {
        let name = name.into();
        let expr = expr.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = expr,
            None => self.entries.push((name, expr)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeExpression> {
        self.entries
            .iter()
            .find_map(|(n, e)| (n == name).then_some(e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeExpression)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }
}

impl<K: Into<String>, V: Into<AttributeExpression>> FromIterator<(K, V)> for KeyConditions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut conditions = Self::new();
        for (name, expr) in iter {
            conditions.set(name, expr);
        }
        conditions
    }
}

// ---------------------------------------------------------------------------
// CompiledCondition
// ---------------------------------------------------------------------------

/// A condition expression and the parameter values it references.
///
/// An empty expression means "no condition".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledCondition {
    pub expression: String,
    pub values: HashMap<String, AttributeValue>,
}

impl CompiledCondition {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    /// The expression, or `None` when there is no condition.
    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        (!self.is_empty()).then_some(self.expression.as_str())
    }

    /// Add `other`'s bindings to this one's.
    ///
    /// A name bound in both with equal values is kept once; with different
    /// values it is a [`CompileError::ConflictingBinding`] and `self` is left
    /// unchanged.
    pub fn merge_values(&mut self, other: &Self) -> Result<(), CompileError> {
        if let Some(name) = other
            .values
            .iter()
            .find(|(name, value)| self.values.get(*name).is_some_and(|v| v != *value))
            .map(|(name, _)| name.clone())
        {
            return Err(CompileError::ConflictingBinding { name });
        }
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile key conditions into a condition expression.
///
/// Fails only when two entries generate the same parameter name with
/// different values, e.g. `a` as a range (binding `:amin`) next to an
/// attribute literally named `amin`.
pub fn compile_key_condition(conditions: &KeyConditions) -> Result<CompiledCondition, CompileError> {
    let mut clauses = Vec::with_capacity(conditions.len());
    let mut values = HashMap::with_capacity(conditions.len());

    for (name, expr) in conditions.iter() {
        clauses.push(expr.clause(name));
        for (param, value) in expr.bindings(name) {
            match values.entry(param) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(slot) if *slot.get() == value => {}
                Entry::Occupied(slot) => {
                    return Err(CompileError::ConflictingBinding {
                        name: slot.key().clone(),
                    });
                }
            }
        }
    }

    Ok(CompiledCondition {
        expression: clauses.join(" and "),
        values,
    })
}

/// Compile optional filter conditions. `None` compiles to the empty
/// condition.
pub fn compile_filter_condition(
    conditions: Option<&KeyConditions>,
) -> Result<CompiledCondition, CompileError> {
    conditions.map_or_else(|| Ok(CompiledCondition::default()), compile_key_condition)
}
