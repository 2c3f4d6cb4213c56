//! Common error types for character stores

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a character store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected or failed the operation
    #[error("Database error: {0}")]
    Database(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped to a record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
