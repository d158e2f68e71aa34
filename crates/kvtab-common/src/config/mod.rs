//! Configuration for kvtab.
//!
//! The connection target, pooling, column binding and lock timeouts are all
//! external configuration, loaded from TOML.

mod adapter;

pub use adapter::{
    AdapterConfig, ConfigError, GatewayConfig, GatewayMode, LockConfig, RegistryConfig,
    SchemaPolicy, SnapshotPolicy, StoreConfig, TableConfig,
};
