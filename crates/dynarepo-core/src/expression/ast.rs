//! Parsed condition tree.

use std::fmt;

/// A boolean condition over one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left <op> right`
    Compare {
        left: Operand,
        op: Comparator,
        right: Operand,
    },
    /// `value BETWEEN low AND high`, inclusive on both ends.
    Between {
        value: Operand,
        low: Operand,
        high: Operand,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    /// `name(args...)`
    Call { function: Function, args: Vec<Operand> },
}

impl Condition {
    /// Flatten a tree of `AND`s into its conjuncts, left to right.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Condition> {
        match self {
            Self::And(left, right) => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// The operator seen from the other side: `a < b` is `b > a`.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            same => same,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    BeginsWith,
    Contains,
    AttributeExists,
    AttributeNotExists,
}

impl Function {
    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "begins_with" => Some(Self::BeginsWith),
            "contains" => Some(Self::Contains),
            "attribute_exists" => Some(Self::AttributeExists),
            "attribute_not_exists" => Some(Self::AttributeNotExists),
            _ => None,
        }
    }

    /// Number of arguments the function takes.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::BeginsWith | Self::Contains => 2,
            Self::AttributeExists | Self::AttributeNotExists => 1,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
        })
    }
}

/// A value reference inside a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Attribute path, one segment per map level.
    Path(Vec<String>),
    /// Bound parameter, stored with its leading colon (`:pk`).
    Param(String),
}

impl Operand {
    /// The attribute name when this is a single-segment path.
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::Path(segments) if segments.len() == 1 => Some(&segments[0]),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(segments) => f.write_str(&segments.join(".")),
            Self::Param(name) => f.write_str(name),
        }
    }
}
