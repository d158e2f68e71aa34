//! Handler error types.

use kvtab_client::ClientError;
use kvtab_common::types::ParseTableNameError;
use kvtab_common::{ConfigError, HandlerId, StatusCode, TableName};
use kvtab_lock::LockError;
use thiserror::Error;

/// Result type for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Table handler error.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The store could not be reached, or the connection was lost.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] ClientError),

    /// The store answered with an error or an unexpected reply.
    #[error("store protocol error: {0}")]
    Protocol(#[source] ClientError),

    /// The store has no way to perform this operation.
    #[error("operation not supported: {operation}")]
    UnsupportedOperation {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// The share for a table could not be created.
    #[error("cannot allocate share for {table}: {reason}")]
    ShareAllocationFailed {
        /// Table being opened.
        table: TableName,
        /// Why allocation failed.
        reason: String,
    },

    /// The table definition does not bind to a key and a value column.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A row to insert has no value in the key or value column.
    #[error("column '{column}' is null")]
    NullColumn {
        /// Column name.
        column: String,
    },

    /// The table name could not be parsed.
    #[error(transparent)]
    InvalidTableName(#[from] ParseTableNameError),

    /// The handler is not open.
    #[error("handler is not open")]
    NotOpen,

    /// The cursor was created by a different handler.
    #[error("scan cursor belongs to {owner}, not {handler}")]
    ForeignCursor {
        /// Handler that created the cursor.
        owner: HandlerId,
        /// Handler the cursor was passed to.
        handler: HandlerId,
    },

    /// The cursor's scan has ended or reached its end.
    #[error("scan cursor is no longer valid")]
    CursorInvalidated,

    /// Table lock coordination failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The adapter configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HandlerError {
    /// Creates an unsupported operation error.
    pub fn unsupported(operation: &'static str) -> Self {
        HandlerError::UnsupportedOperation { operation }
    }

    /// Returns the host status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::StoreUnavailable(_) => StatusCode::NoConnection,
            HandlerError::UnsupportedOperation { .. } => StatusCode::WrongCommand,
            HandlerError::ShareAllocationFailed { .. } => StatusCode::OutOfMemory,
            HandlerError::SchemaMismatch(_) => StatusCode::TableDefChanged,
            HandlerError::Lock(_) => StatusCode::LockWaitTimeout,
            HandlerError::Protocol(_)
            | HandlerError::NullColumn { .. }
            | HandlerError::InvalidTableName(_)
            | HandlerError::NotOpen
            | HandlerError::ForeignCursor { .. }
            | HandlerError::CursorInvalidated
            | HandlerError::Config(_) => StatusCode::InternalError,
        }
    }

    /// Returns true for store transport failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, HandlerError::StoreUnavailable(_))
    }
}

impl From<ClientError> for HandlerError {
    fn from(e: ClientError) -> Self {
        // Rejected credentials leave the store as unreachable as a refused connect.
        if e.is_transport() || matches!(e, ClientError::AuthenticationFailed(_)) {
            HandlerError::StoreUnavailable(e)
        } else {
            HandlerError::Protocol(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_client_error_classification() {
        let refused = ClientError::ConnectionRefused {
            addr: "127.0.0.1:6379".to_string(),
            reason: "refused".to_string(),
        };
        assert!(HandlerError::from(refused).is_unavailable());

        let reset = ClientError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(HandlerError::from(reset).is_unavailable());

        let auth = ClientError::AuthenticationFailed("WRONGPASS".to_string());
        assert!(HandlerError::from(auth).is_unavailable());

        let server = ClientError::Server("WRONGTYPE".to_string());
        assert!(matches!(HandlerError::from(server), HandlerError::Protocol(_)));

        let malformed = ClientError::protocol("bad frame");
        assert!(matches!(HandlerError::from(malformed), HandlerError::Protocol(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            HandlerError::unsupported("update_row").status(),
            StatusCode::WrongCommand
        );
        assert_eq!(
            HandlerError::from(ClientError::ConnectionClosed).status(),
            StatusCode::NoConnection
        );
        assert_eq!(
            HandlerError::SchemaMismatch("x".into()).status(),
            StatusCode::TableDefChanged
        );
        assert_eq!(
            HandlerError::ShareAllocationFailed {
                table: TableName::new("db", "t"),
                reason: "full".into(),
            }
            .status(),
            StatusCode::OutOfMemory
        );
        assert_eq!(
            HandlerError::from(LockError::Conflict {
                table: TableName::new("db", "t"),
            })
            .status(),
            StatusCode::LockWaitTimeout
        );
        assert_eq!(HandlerError::NotOpen.status(), StatusCode::InternalError);
    }
}
