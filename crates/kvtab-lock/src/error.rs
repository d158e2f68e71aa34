//! Error types for lock coordination.

use kvtab_common::TableName;
use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Lock coordination error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A conflicting holder did not release in time.
    #[error("lock wait timeout on {table} after {waited_ms}ms")]
    Timeout {
        /// Table whose lock could not be granted.
        table: TableName,
        /// How long the request waited.
        waited_ms: u64,
    },

    /// A non-blocking request found a conflicting holder.
    #[error("lock on {table} is held in a conflicting mode")]
    Conflict {
        /// Table whose lock could not be granted.
        table: TableName,
    },
}

impl LockError {
    /// Returns the table the error refers to.
    pub fn table(&self) -> &TableName {
        match self {
            LockError::Timeout { table, .. } | LockError::Conflict { table } => table,
        }
    }
}
