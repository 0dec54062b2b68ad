//! Store-side error type.
//!
//! Storage clients that speak the model types (the in-memory store, test
//! doubles) report failures as a [`StoreError`] carrying a well-known
//! [`StoreErrorCode`] and a human-readable message.

use std::fmt;

/// Well-known store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum StoreErrorCode {
    /// The table or index does not exist.
    ResourceNotFoundException,
    /// The table already exists.
    ResourceInUseException,
    /// The request is malformed: bad key, bad expression, missing binding.
    #[default]
    ValidationException,
    /// A request payload could not be decoded.
    SerializationException,
    /// Unexpected store failure.
    InternalServerError,
}

impl StoreErrorCode {
    /// Returns the short error code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ResourceInUseException => "ResourceInUseException",
            Self::ValidationException => "ValidationException",
            Self::SerializationException => "SerializationException",
            Self::InternalServerError => "InternalServerError",
        }
    }

    /// Whether a caller may reasonably retry a request that failed with this
    /// code. Only server-side faults qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InternalServerError)
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by a storage client.
#[derive(Debug)]
pub struct StoreError {
    /// The error code.
    pub code: StoreErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl StoreError {
    /// Create an error carrying the code's own name as message.
    #[must_use]
    pub fn new(code: StoreErrorCode) -> Self {
        Self::with_message(code, code.as_str())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ResourceNotFoundException, message)
    }

    #[must_use]
    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ResourceInUseException, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ValidationException, message)
    }

    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::SerializationException, message)
    }

    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::InternalServerError, message)
    }
}

/// Create a [`StoreError`] from a code name and optional message.
///
/// # Examples
///
/// ```
/// use dynarepo_model::store_error;
/// use dynarepo_model::error::StoreErrorCode;
///
/// let err = store_error!(ValidationException);
/// assert_eq!(err.code, StoreErrorCode::ValidationException);
///
/// let err = store_error!(ResourceNotFoundException, "Table posts not found");
/// assert_eq!(err.message, "Table posts not found");
/// ```
#[macro_export]
macro_rules! store_error {
    ($code:ident) => {
        $crate::error::StoreError::new($crate::error::StoreErrorCode::$code)
    };
    ($code:ident, $msg:expr) => {
        $crate::error::StoreError::with_message($crate::error::StoreErrorCode::$code, $msg)
    };
}
