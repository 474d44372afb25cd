//! Abstract storage traits for KyroFlow.
//!
//! Listener state must survive engine restarts. Backends implement
//! [`ExpressionStore`]; the engine writes a record before a listener's tracker
//! is registered and deletes it once the listener is done.

use thiserror::Error;

use crate::error::{ExecutionError, FlowError};
use crate::expression::ExpressionId;
use crate::listen::ListenRecord;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// I/O failure in a durable backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for FlowError {
    fn from(err: StorageError) -> Self {
        FlowError::Execution(ExecutionError::Storage {
            message: err.to_string(),
        })
    }
}

/// Storage for persisted listener state.
///
/// # Safety Considerations
/// - `put` is an upsert; writing the same record twice is not an error
/// - `delete` is idempotent and reports whether a record existed
/// - Implementations should handle concurrent access safely
pub trait ExpressionStore: Send + Sync {
    /// Insert or replace the record for `record.id`.
    fn put(&self, record: &ListenRecord) -> Result<(), StorageError>;

    /// Get a record by expression id.
    fn get(&self, id: &ExpressionId) -> Result<Option<ListenRecord>, StorageError>;

    /// Delete a record. Returns false if none existed.
    fn delete(&self, id: &ExpressionId) -> Result<bool, StorageError>;

    /// All stored records.
    fn list(&self) -> Result<Vec<ListenRecord>, StorageError>;
}
