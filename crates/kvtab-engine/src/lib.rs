//! # kvtab-engine
//!
//! Exposes a remote key-value store as a two-column relational table.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Host engine                           │
//! │        open / scan_init / scan_next / insert_row / close     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TableHandler                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  RowCodec   │  │ ScanCursor  │  │  Share (per table)  │  │
//! │  │ (row<->kv)  │  │ (per scan)  │  │  TableLock + stats  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Gateway (transient / pooled)                │
//! │                  SET key value · GET key · KEYS *            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kvtab_client::{MemoryConnector, MemoryStore};
//! use kvtab_common::AdapterConfig;
//! use kvtab_engine::{Engine, LockHint, OpenMode, Row, ScanStep, TableSchema};
//!
//! let store = MemoryStore::shared();
//! let engine =
//!     Engine::with_connector(Arc::new(MemoryConnector::new(store)), &AdapterConfig::default())
//!         .unwrap();
//!
//! let mut handler = engine.handler();
//! handler
//!     .open("./test/kv", &TableSchema::key_value(), OpenMode::ReadWrite, LockHint::Wait)
//!     .unwrap();
//! handler.insert_row(&Row::key_value("a", "1")).unwrap();
//!
//! let mut cursor = handler.scan_init().unwrap();
//! let mut row = Row::new(2);
//! assert_eq!(handler.scan_next(&mut cursor, &mut row).unwrap(), ScanStep::Row);
//! assert_eq!(row.get(0).map(|k| &k[..]), Some(&b"a"[..]));
//! assert_eq!(handler.scan_next(&mut cursor, &mut row).unwrap(), ScanStep::EndOfScan);
//! handler.scan_end(cursor);
//! handler.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod cursor;
mod engine;
mod error;
mod handler;
mod row;
mod schema;
mod share;

pub use codec::RowCodec;
pub use cursor::{CursorState, ScanCursor, ScanStep};
pub use engine::{Capabilities, Engine, CAPABILITIES};
pub use error::{HandlerError, HandlerResult};
pub use handler::{
    ExtraHint, HandlerState, LockHint, OpenMode, TableHandler, TableInfo, RANGE_ESTIMATE,
};
pub use row::Row;
pub use schema::{bind, ColumnDef, ColumnKind, SchemaDescriptor, TableSchema};
pub use share::{Share, ShareRegistry, ShareStats};
