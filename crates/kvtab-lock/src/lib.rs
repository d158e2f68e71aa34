//! # kvtab-lock
//!
//! Statement-level table locking for kvtab handlers.
//!
//! A handler declares the lock it wants by setting its [`LockData`] token
//! and adding it to a [`LockRequestSet`]. The [`LockCoordinator`] then grants
//! the whole set or none of it, waiting for conflicting holders up to a
//! configured timeout.
//!
//! # Lock Compatibility Matrix
//!
//! ```text
//!                 │ SharedRead │ ExclusiveWrite │
//! ────────────────┼────────────┼────────────────┤
//!  SharedRead     │     ✓      │       ✗        │
//!  ExclusiveWrite │     ✗      │       ✗        │
//! ```
//!
//! Requests from the current holder never conflict with themselves: a sole
//! holder may upgrade from `SharedRead` to `ExclusiveWrite`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kvtab_common::{HandlerId, TableName};
//! use kvtab_lock::{LockCoordinator, LockData, LockRequestSet, LockType, TableLock};
//!
//! let table = Arc::new(TableLock::new(TableName::new("db", "t")));
//! let token = LockData::new(HandlerId::new(1), Arc::clone(&table));
//! token.request(LockType::SharedRead);
//!
//! let coordinator = LockCoordinator::default();
//! let mut set = LockRequestSet::new();
//! set.push(token.clone());
//! coordinator.acquire(&set).unwrap();
//! assert_eq!(table.mode_of(HandlerId::new(1)), Some(LockType::SharedRead));
//!
//! coordinator.release(&set);
//! assert_eq!(token.lock_type(), LockType::Unlock);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lock errors.
pub mod error;

/// Per-table lock descriptor.
pub mod table_lock;

/// Handler lock tokens and request sets.
pub mod token;

/// All-or-nothing lock granting.
pub mod coordinator;

pub use coordinator::{LockCoordinator, LockStats};
pub use error::{LockError, LockResult};
pub use table_lock::{Grant, LockType, TableLock};
pub use token::{LockData, LockRequestSet};
