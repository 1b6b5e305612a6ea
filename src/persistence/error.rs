//! This module contains the error types for the shared store.

use thiserror::Error;

/// Errors that can occur while talking to the shared coordination store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the operation failed in transit.
    #[error("Shared store unavailable: {0}")]
    Unavailable(String),

    /// A store operation was rejected.
    #[error("A store operation failed: {0}")]
    OperationFailed(String),

    /// An error occurred during a schema migration.
    #[error("A store migration failed: {0}")]
    MigrationError(String),

    /// An invalid configuration or input was provided.
    #[error("An invalid configuration or input was provided: {0}")]
    InvalidInput(String),
}
