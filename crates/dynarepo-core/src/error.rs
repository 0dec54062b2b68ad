//! Error types surfaced by the compiler and the repository.

use thiserror::Error;

use crate::schema::{Key, SchemaViolation};

/// Errors raised while turning key or filter conditions into a request.
///
/// Both variants are reported before any request reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A comparison was tagged with an operator outside `=`, `<`, `<=`, `>`,
    /// `>=`.
    #[error("unknown comparison operator: {operator}")]
    UnknownOperator {
        /// The rejected tag.
        operator: String,
    },
    /// The same parameter name was bound to two different values, either
    /// between key and filter conditions or through a generated `min`/`max`
    /// suffix.
    #[error("parameter {name} is bound to conflicting values")]
    ConflictingBinding {
        /// The parameter name, including the leading colon.
        name: String,
    },
}

/// Errors returned by [`Repository`](crate::Repository) operations.
///
/// `E` is the storage client's own error type. Storage failures are passed
/// through unchanged in [`RepositoryError::Storage`].
#[derive(Debug, Error)]
pub enum RepositoryError<E> {
    /// `get` found no item for the key.
    #[error("no item in table {table} for key {key}")]
    NotFound {
        /// Table that was read.
        table: String,
        /// The key that was looked up.
        key: Key,
    },
    /// A value failed its schema on write or a stored item failed it on read.
    #[error(transparent)]
    SchemaValidation(#[from] SchemaViolation),
    /// Key or filter conditions could not be compiled.
    #[error(transparent)]
    Condition(#[from] CompileError),
    /// The storage client failed.
    #[error(transparent)]
    Storage(E),
}

impl<E> RepositoryError<E> {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The schema diagnostic, if this is a validation failure.
    #[must_use]
    pub fn violation(&self) -> Option<&SchemaViolation> {
        match self {
            Self::SchemaValidation(v) => Some(v),
            _ => None,
        }
    }

    /// The storage client's error, if the store failed.
    #[must_use]
    pub fn storage(&self) -> Option<&E> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}
