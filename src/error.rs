//! Error types for KyroFlow.
//!
//! All errors in KyroFlow are strongly typed using thiserror.
//! Configuration problems surface as [`ValidationError`] at listener activation,
//! runtime failures as [`ExecutionError`].

use thiserror::Error;

use crate::expression::ExpressionId;

/// Validation errors raised while resolving configuration.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required attribute '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Attributes '{first}' and '{second}' are mutually exclusive")]
    AmbiguousField {
        first: String,
        second: String,
    },

    #[error("Listen target resolved to an empty string")]
    EmptyTarget,

    #[error("Attribute '{field}' is invalid: {reason}")]
    InvalidAttribute {
        field: String,
        reason: String,
    },

    #[error("Unknown 'upon' value '{value}' (expected apply, reply, entering or leaving)")]
    UnknownUpon {
        value: String,
    },

    #[error("Unknown merge policy '{value}' (expected true, override or false)")]
    UnknownMergePolicy {
        value: String,
    },

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors that occur while listeners run.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Listener already active: {id}")]
    DuplicateListener {
        id: ExpressionId,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Launch of {child} failed: {message}")]
    Launch {
        child: ExpressionId,
        message: String,
    },

    #[error("Field '{field}' is not present in the workitem")]
    UnknownField {
        field: String,
    },

    #[error("Delivery queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for KyroFlow.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl FlowError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false, // Configuration won't change on retry
            Self::Execution(e) => matches!(
                e,
                ExecutionError::QueueFull { .. } | ExecutionError::Storage { .. }
            ),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for KyroFlow operations.
pub type FlowResult<T> = Result<T, FlowError>;
