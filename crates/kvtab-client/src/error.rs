//! Error types for the client library.

use std::fmt;
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The store refused or could not accept a connection.
    #[error("connection to {addr} refused: {reason}")]
    ConnectionRefused {
        /// Target address.
        addr: String,
        /// Underlying reason.
        reason: String,
    },

    /// I/O failure on an established connection.
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The reply was malformed or not of the expected type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply.
    #[error("store error: {0}")]
    Server(String),

    /// Authentication with the store failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No pooled connection became free in time.
    #[error("pool acquisition timeout after {0}ms")]
    PoolTimeout(u64),

    /// The pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    /// Returns true if the store could not be reached or the connection
    /// was lost, as opposed to the store answering badly.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::ConnectionRefused { .. }
                | ClientError::Io(_)
                | ClientError::ConnectionClosed
                | ClientError::PoolTimeout(_)
                | ClientError::PoolClosed
        )
    }

    /// Returns true if the connection that produced this error can no
    /// longer be used.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::Protocol(_)
        )
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready.
    Connected,
    /// A transport or framing failure left the stream unusable.
    Broken,
    /// Connection closed.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Broken => write!(f, "broken"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let refused = ClientError::ConnectionRefused {
            addr: "127.0.0.1:6379".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(refused.is_transport());
        assert!(ClientError::ConnectionClosed.is_transport());
        assert!(ClientError::PoolTimeout(10).is_transport());

        assert!(!ClientError::protocol("bad tag").is_transport());
        assert!(!ClientError::Server("ERR".to_string()).is_transport());
    }

    #[test]
    fn test_breaks_connection() {
        assert!(ClientError::protocol("desync").breaks_connection());
        assert!(ClientError::ConnectionClosed.breaks_connection());
        assert!(!ClientError::Server("WRONGTYPE".to_string()).breaks_connection());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::ConnectionRefused {
            addr: "h:1".to_string(),
            reason: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "connection to h:1 refused: nope");
        assert_eq!(ConnectionState::Broken.to_string(), "broken");
    }
}
