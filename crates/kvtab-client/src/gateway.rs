//! Connection gateway.
//!
//! Every remote operation runs inside a [`Lease`]: a connection that is
//! handed back when the lease is dropped, on success and on error alike.
//! In transient mode each lease opens and closes its own connection; in
//! pooled mode leases borrow from a [`ConnectionPool`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use kvtab_common::config::{GatewayConfig, GatewayMode};
use tracing::trace;

use crate::connection::{Connector, StoreConnection};
use crate::error::ClientResult;
use crate::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::protocol::{Command, Reply};

/// Hands out scoped store connections.
pub struct Gateway {
    connector: Arc<dyn Connector>,
    pool: Option<ConnectionPool>,
}

impl Gateway {
    /// Creates a gateway in the mode the configuration selects.
    pub fn new(connector: Arc<dyn Connector>, config: &GatewayConfig) -> ClientResult<Self> {
        match config.mode {
            GatewayMode::Transient => Ok(Self::transient(connector)),
            GatewayMode::Pooled => Self::pooled(connector, config),
        }
    }

    /// Creates a gateway that opens a fresh connection for every lease.
    pub fn transient(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool: None,
        }
    }

    /// Creates a gateway backed by a connection pool.
    pub fn pooled(connector: Arc<dyn Connector>, config: &GatewayConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(Arc::clone(&connector), config)?;
        Ok(Self {
            connector,
            pool: Some(pool),
        })
    }

    /// Leases a connection for one operation.
    pub fn lease(&self) -> ClientResult<Lease<'_>> {
        match &self.pool {
            Some(pool) => Ok(Lease::Pooled(pool.acquire()?)),
            None => {
                let conn = self.connector.connect()?;
                trace!("opened transient connection {}", conn.peer());
                Ok(Lease::Transient(conn))
            }
        }
    }

    /// Runs `f` against a leased connection.
    pub fn run<T, F>(&self, f: F) -> ClientResult<T>
    where
        F: FnOnce(&mut dyn StoreConnection) -> ClientResult<T>,
    {
        let mut lease = self.lease()?;
        f(&mut *lease)
    }

    /// Sends one command on a leased connection.
    pub fn execute(&self, command: &Command) -> ClientResult<Reply> {
        self.run(|conn| conn.execute(command))
    }

    /// Returns the gateway mode.
    pub fn mode(&self) -> GatewayMode {
        if self.pool.is_some() {
            GatewayMode::Pooled
        } else {
            GatewayMode::Transient
        }
    }

    /// Returns pool statistics in pooled mode.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(ConnectionPool::stats)
    }

    /// Returns a description of the store, for logging.
    pub fn target(&self) -> String {
        self.connector.target()
    }

    /// Closes the pool, if any. Later leases fail in pooled mode.
    pub fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close();
        }
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("target", &self.connector.target())
            .field("mode", &self.mode())
            .field("pool", &self.pool)
            .finish()
    }
}

/// A connection held for the duration of one operation.
pub enum Lease<'a> {
    /// A connection opened for this lease alone; closed on drop.
    Transient(Box<dyn StoreConnection>),
    /// A connection borrowed from the pool; returned on drop.
    Pooled(PooledConnection<'a>),
}

impl Deref for Lease<'_> {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Lease::Transient(conn) => conn.as_ref(),
            Lease::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for Lease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Lease::Transient(conn) => conn.as_mut(),
            Lease::Pooled(conn) => &mut **conn,
        }
    }
}

impl fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lease::Transient(conn) => f.debug_tuple("Transient").field(&conn.peer()).finish(),
            Lease::Pooled(conn) => f.debug_tuple("Pooled").field(conn).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::connection::{MemoryConnector, MemoryStore};
    use crate::error::ClientError;

    fn connector(store: &Arc<MemoryStore>) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector::new(Arc::clone(store)))
    }

    #[test]
    fn test_transient_opens_per_lease() {
        let store = MemoryStore::shared();
        let gateway = Gateway::transient(connector(&store));
        assert_eq!(gateway.mode(), GatewayMode::Transient);
        assert!(gateway.pool_stats().is_none());

        gateway.run(|conn| conn.set(b"a", b"1")).unwrap();
        gateway.run(|conn| conn.set(b"b", b"2")).unwrap();
        assert_eq!(store.connections_opened(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_pooled_reuses_connection() {
        let store = MemoryStore::shared();
        let gateway = Gateway::new(connector(&store), &GatewayConfig::new()).unwrap();
        assert_eq!(gateway.mode(), GatewayMode::Pooled);

        for i in 0..5u8 {
            gateway.run(|conn| conn.set(&[i], b"x")).unwrap();
        }
        assert_eq!(store.connections_opened(), 1);
        assert_eq!(gateway.pool_stats().unwrap().acquisitions, 5);
    }

    #[test]
    fn test_mode_from_config() {
        let store = MemoryStore::shared();
        let config = GatewayConfig::new().mode(GatewayMode::Transient);
        let gateway = Gateway::new(connector(&store), &config).unwrap();
        assert_eq!(gateway.mode(), GatewayMode::Transient);
    }

    #[test]
    fn test_execute() {
        let store = MemoryStore::shared();
        store.insert("k", "v");
        let gateway = Gateway::transient(connector(&store));

        let reply = gateway.execute(&Command::get("k")).unwrap();
        assert_eq!(reply.into_bulk().unwrap(), Some(Bytes::from("v")));
    }

    #[test]
    fn test_lease_released_on_error() {
        let store = MemoryStore::shared();
        let config = GatewayConfig::new().max_connections(1);
        let gateway = Gateway::pooled(connector(&store), &config).unwrap();

        let result: ClientResult<()> =
            gateway.run(|_| Err(ClientError::protocol("caller failed")));
        assert!(result.is_err());

        // The single slot is free again.
        assert!(gateway.lease().is_ok());
        assert_eq!(gateway.pool_stats().unwrap().releases, 2);
    }

    #[test]
    fn test_store_unavailable() {
        let store = MemoryStore::shared();
        store.set_unavailable(true);

        for gateway in [
            Gateway::transient(connector(&store)),
            Gateway::pooled(connector(&store), &GatewayConfig::new()).unwrap(),
        ] {
            let err = gateway.lease().unwrap_err();
            assert!(err.is_transport());
        }
    }

    #[test]
    fn test_close() {
        let store = MemoryStore::shared();
        let gateway = Gateway::pooled(connector(&store), &GatewayConfig::new()).unwrap();
        gateway.close();
        assert!(matches!(gateway.lease(), Err(ClientError::PoolClosed)));
    }
}
