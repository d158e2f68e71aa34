//! # kvtab-client
//!
//! Client side of the key-value store protocol.
//!
//! This crate provides everything needed to run one remote operation against
//! the store:
//!
//! - **Protocol**: `Command` and `Reply` with a binary-safe request/reply codec
//! - **Connections**: the `StoreConnection` and `Connector` seams, with a TCP
//!   implementation and an in-process `MemoryStore` for tests
//! - **Gateway**: scoped connection leases, either transient (one connection
//!   per operation) or borrowed from a `ConnectionPool`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use kvtab_client::{Gateway, MemoryConnector, MemoryStore, StoreConnection};
//!
//! let store = MemoryStore::shared();
//! let gateway = Gateway::transient(Arc::new(MemoryConnector::new(store)));
//!
//! {
//!     // The connection is released when the lease is dropped.
//!     let mut conn = gateway.lease().unwrap();
//!     conn.set(b"greeting", b"hello").unwrap();
//! }
//!
//! let mut conn = gateway.lease().unwrap();
//! assert_eq!(conn.get(b"greeting").unwrap(), Some(Bytes::from("hello")));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;

/// Wire protocol.
pub mod protocol;

/// Store connections and connectors.
pub mod connection;

/// Connection pool.
pub mod pool;

/// Connection gateway.
pub mod gateway;

// Re-exports
pub use connection::{
    Connector, MemoryConnection, MemoryConnector, MemoryStore, StoreConnection, TcpConnection,
    TcpConnector,
};
pub use error::{ClientError, ClientResult, ConnectionState};
pub use gateway::{Gateway, Lease};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use protocol::{Command, Reply, ReplyDecoder};
