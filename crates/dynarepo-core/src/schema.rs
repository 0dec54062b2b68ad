//! Schema contract and validation diagnostics.
//!
//! A [`Schema`] owns everything entity-specific: which fields are required,
//! how defaults such as generated ids are filled in, how a validated value is
//! laid out as a stored item, and which attributes form its primary key. The
//! repository calls it and never looks inside.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use dynarepo_model::{AttributeValue, Item};

use crate::codec::CodecError;

// ---------------------------------------------------------------------------
// Schema trait
// ---------------------------------------------------------------------------

/// Validator and transformer for one entity type.
pub trait Schema: Send + Sync + 'static {
    /// The unvalidated candidate accepted by `put`.
    type Input: Send;
    /// The validated form, returned from every repository operation.
    type Output: Send + 'static;

    /// Validate a write candidate, filling in defaults.
    fn validate(&self, input: Self::Input) -> Result<Self::Output, SchemaViolation>;

    /// Validate a raw stored item.
    fn parse(&self, item: Item) -> Result<Self::Output, SchemaViolation>;

    /// Lay out a validated value as a stored item, key attributes included.
    fn to_item(&self, output: &Self::Output) -> Result<Item, SchemaViolation>;

    /// The primary key of a validated value.
    fn key(&self, output: &Self::Output) -> Key;
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// A primary key: the partition key and, for composite tables, the sort key.
///
/// Attributes are kept sorted by name so the display form is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key(BTreeMap<String, AttributeValue>);

impl Key {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Pick the named attributes out of an item. Missing names are skipped.
    #[must_use]
    pub fn from_item(item: &Item, names: &[&str]) -> Self {
        Self(
            names
                .iter()
                .filter_map(|name| item.get(*name).map(|v| ((*name).to_owned(), v.clone())))
                .collect(),
        )
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    #[must_use]
    pub fn into_item(self) -> Item {
        self.0.into_iter().collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl From<Key> for Item {
    fn from(key: Key) -> Self {
        key.into_item()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Key {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Dotted path of the offending field; empty for whole-value problems.
    pub field: String,
    /// Short rule identifier, e.g. `required` or `max_length`.
    pub rule: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{} ({})", self.message, self.rule)
        } else {
            write!(f, "{}: {} ({})", self.field, self.message, self.rule)
        }
    }
}

/// Structured result of a failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema validation failed: {}", join_issues(.issues))]
pub struct SchemaViolation {
    pub issues: Vec<Issue>,
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaViolation {
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::invalid(field, "required", "field is required")
    }

    #[must_use]
    pub fn invalid(
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issues: vec![Issue {
                field: field.into(),
                rule: rule.into(),
                message: message.into(),
            }],
        }
    }

    /// Whether any issue concerns the given field.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

impl From<CodecError> for SchemaViolation {
    fn from(err: CodecError) -> Self {
        let message = err.to_string();
        // serde reports absent struct fields as "missing field `name`".
        if let Some(field) = message
            .split_once("missing field `")
            .and_then(|(_, rest)| rest.split_once('`'))
            .map(|(field, _)| field.to_owned())
        {
            return Self::missing_field(field);
        }
        Self::invalid("", "decode", message)
    }
}

/// Collects issues across several checks before failing once.
#[derive(Debug, Default)]
pub struct Issues(Vec<Issue>);

impl Issues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalid(
        &mut self,
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.0.push(Issue {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        });
    }

    pub fn missing(&mut self, field: impl Into<String>) {
        self.invalid(field, "required", "field is required");
    }

    /// Record a missing-field issue when `value` is `None`.
    pub fn require<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.missing(field);
        }
        value
    }

    /// Record an issue when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, rule: &str, message: impl Into<String>) {
        if !ok {
            self.invalid(field, rule, message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(value)` if nothing was recorded, otherwise every issue at once.
    pub fn finish<T>(self, value: T) -> Result<T, SchemaViolation> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(SchemaViolation { issues: self.0 })
        }
    }
}
