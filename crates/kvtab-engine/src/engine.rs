//! Engine context shared by all handlers.
//!
//! An [`Engine`] bundles what every handler of the process uses: the
//! connection gateway, the share registry, the lock coordinator and the
//! table configuration. It is cheap to clone.

use std::fmt;
use std::sync::Arc;

use kvtab_client::{Connector, Gateway, TcpConnector};
use kvtab_common::config::{AdapterConfig, TableConfig};
use kvtab_lock::{LockCoordinator, LockRequestSet};
use tracing::info;

use crate::error::HandlerResult;
use crate::handler::{LockHint, TableHandler};
use crate::share::ShareRegistry;

/// Static description of what the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Engine name as registered with the host.
    pub name: &'static str,
    /// Tables can be dropped and created again without losing data.
    pub can_recreate: bool,
    /// Maximum number of indexes per table.
    pub max_keys: u32,
    /// Maximum number of parts per index.
    pub max_key_parts: u32,
    /// Maximum index key length in bytes.
    pub max_key_length: u32,
    /// Whether statements can be rolled back.
    pub transactions: bool,
}

/// Capabilities of the key-value engine.
pub const CAPABILITIES: Capabilities = Capabilities {
    name: "redis",
    can_recreate: true,
    max_keys: 0,
    max_key_parts: 0,
    max_key_length: 0,
    transactions: false,
};

struct EngineInner {
    gateway: Gateway,
    registry: ShareRegistry,
    coordinator: LockCoordinator,
    table: TableConfig,
}

/// Process-wide engine state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine that talks to the configured store over TCP.
    pub fn new(config: &AdapterConfig) -> HandlerResult<Self> {
        let connector = Arc::new(TcpConnector::new(config.store.clone()));
        Self::with_connector(connector, config)
    }

    /// Creates an engine over any connector.
    pub fn with_connector(
        connector: Arc<dyn Connector>,
        config: &AdapterConfig,
    ) -> HandlerResult<Self> {
        config.validate()?;
        let gateway = Gateway::new(connector, &config.gateway)?;
        info!(
            "engine ready: store={} gateway={:?} snapshot={:?}",
            gateway.target(),
            gateway.mode(),
            config.table.snapshot
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                gateway,
                registry: ShareRegistry::new(&config.registry),
                coordinator: LockCoordinator::new(&config.lock),
                table: config.table.clone(),
            }),
        })
    }

    /// Creates a closed handler.
    pub fn handler(&self) -> TableHandler {
        TableHandler::new(self.clone())
    }

    /// Returns the connection gateway.
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    /// Returns the share registry.
    pub fn registry(&self) -> &ShareRegistry {
        &self.inner.registry
    }

    /// Returns the lock coordinator.
    pub fn coordinator(&self) -> &LockCoordinator {
        &self.inner.coordinator
    }

    /// Returns the table configuration.
    pub fn table_config(&self) -> &TableConfig {
        &self.inner.table
    }

    /// Returns the engine capabilities.
    pub fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    /// Grants the locks collected from handlers' `store_lock` calls.
    pub fn acquire_locks(&self, set: &LockRequestSet, hint: LockHint) -> HandlerResult<()> {
        match hint {
            LockHint::Wait => self.inner.coordinator.acquire(set)?,
            LockHint::NoWait => self.inner.coordinator.try_acquire(set)?,
        }
        Ok(())
    }

    /// Releases the locks of a statement.
    pub fn release_locks(&self, set: &LockRequestSet) {
        self.inner.coordinator.release(set);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("gateway", &self.inner.gateway)
            .field("shares", &self.inner.registry.len())
            .field("table", &self.inner.table)
            .finish()
    }
}
