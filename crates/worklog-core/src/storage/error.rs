//! Storage error handling
//!
//! Provides typed errors for item store operations. Validation and
//! conflict errors are raised before anything is written, so every error
//! leaves the store exactly as it was.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::models::Column;

/// Errors that can occur during item store operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Referenced item does not exist
    #[error("Unknown board item: {id}")]
    UnknownItem { id: Uuid },

    /// Referenced note does not exist on the item
    #[error("Unknown note {note_id} on item {item_id}")]
    UnknownNote { item_id: Uuid, note_id: Uuid },

    /// Referenced document does not exist on the item
    #[error("Unknown document {document_id} on item {item_id}")]
    UnknownDocument { item_id: Uuid, document_id: Uuid },

    /// An item appears more than once in a reorder batch
    #[error("Item {id} appears more than once in the reorder batch")]
    DuplicatePlacement { id: Uuid },

    /// A batch would leave a column with gaps or duplicate positions
    #[error("Reorder would leave column '{column}' out of order: {details}")]
    InvalidOrdering { column: Column, details: String },

    /// Rejected input (empty title, bad column value, ...)
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The client planned against an outdated column revision
    #[error(
        "Column '{column}' changed since it was loaded (expected revision {expected}, found {actual}). Reload the board and retry."
    )]
    RevisionConflict {
        column: Column,
        expected: u64,
        actual: u64,
    },

    /// The batch omits items that now share its columns (added since the
    /// client loaded the board)
    #[error("Column '{column}' has items the reorder did not account for. Reload the board and retry.")]
    StaleColumn { column: Column },

    /// Stored data could not be decoded
    #[error("Corrupt row in '{table}': {details}")]
    CorruptRow { table: &'static str, details: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ => StorageError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Whether this error was caused by the caller's input
    ///
    /// Validation errors are rejected before any write and are not retryable
    /// without changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::UnknownItem { .. }
                | StorageError::UnknownNote { .. }
                | StorageError::UnknownDocument { .. }
                | StorageError::DuplicatePlacement { .. }
                | StorageError::InvalidOrdering { .. }
                | StorageError::Invalid(_)
        )
    }

    /// Whether this error means the caller's view of the board is stale
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::RevisionConflict { .. } | StorageError::StaleColumn { .. }
        )
    }

    /// Whether this error names something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::UnknownItem { .. }
                | StorageError::UnknownNote { .. }
                | StorageError::UnknownDocument { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::RevisionConflict { .. } | StorageError::StaleColumn { .. } => {
                Some("Reload the board to pick up the latest order, then repeat the move.")
            }
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions of the data directory.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::CorruptRow { .. } => {
                Some("The database contains rows this version cannot read. Restore from a backup.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
