//! # kvtab-common
//!
//! Common types, configuration, and status codes for kvtab.
//!
//! This crate provides the foundational pieces shared by every kvtab
//! component:
//!
//! - **Types**: table identity (`TableName`) and handler identity (`HandlerId`)
//! - **Config**: the adapter configuration (`AdapterConfig`) loaded from TOML
//! - **Status**: stable numeric status codes reported to the host engine
//!
//! ## Example
//!
//! ```rust
//! use kvtab_common::config::AdapterConfig;
//! use kvtab_common::types::TableName;
//!
//! let config = AdapterConfig::default();
//! assert_eq!(config.store.port, 6379);
//!
//! let table = TableName::parse("./shop/carts").unwrap();
//! assert_eq!(table.database(), "shop");
//! assert_eq!(table.table(), "carts");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod status;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{AdapterConfig, ConfigError};
pub use status::StatusCode;
pub use types::{HandlerId, TableName};
