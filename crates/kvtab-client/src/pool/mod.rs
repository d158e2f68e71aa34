//! Connection pool.
//!
//! Keeps a bounded set of open store connections for reuse. Connections are
//! recycled when they outlive `max_lifetime` or sit idle past
//! `idle_timeout`, and are pinged on borrow once they have been idle for
//! `health_check_interval`.
//!
//! ```text
//!   acquire() ──► idle queue ──► stale? ──► discard, try next
//!                     │
//!                     ├── empty, size < max ──► Connector::connect()
//!                     │
//!                     └── empty, size == max ──► wait (≤ acquire_timeout)
//!
//!   drop(PooledConnection) ──► broken/expired? ──► close
//!                                     │
//!                                     └──► idle queue, wake one waiter
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvtab_common::config::GatewayConfig;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::connection::{Connector, StoreConnection};
use crate::error::{ClientError, ClientResult};

/// Pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total connections created.
    pub connections_created: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Total acquisitions.
    pub acquisitions: u64,
    /// Total releases.
    pub releases: u64,
    /// Acquisition timeouts.
    pub timeouts: u64,
    /// Connections dropped because a borrow-time ping failed.
    pub health_check_failures: u64,
    /// Current pool size.
    pub current_size: usize,
    /// Current idle connections.
    pub idle_connections: usize,
    /// Current active connections.
    pub active_connections: usize,
}

/// An open connection with its bookkeeping.
struct IdleConnection {
    conn: Box<dyn StoreConnection>,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
}

impl IdleConnection {
    fn new(conn: Box<dyn StoreConnection>) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
            use_count: 0,
        }
    }

    fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    fn mark_used(&mut self) {
        self.last_used = Instant::now();
        self.use_count += 1;
    }
}

struct PoolState {
    /// Connections ready to be borrowed, oldest use first.
    idle: VecDeque<IdleConnection>,
    /// Open connections, idle or borrowed, plus slots reserved for
    /// connections being opened.
    size: usize,
    closed: bool,
}

/// Outcome of reserving capacity under the state lock.
enum Checkout {
    Idle(IdleConnection),
    Open,
}

/// A bounded pool of store connections.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    max_connections: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    max_lifetime: Duration,
    health_check_interval: Duration,
    state: Mutex<PoolState>,
    /// Signalled whenever a connection or a slot is returned.
    returned: Condvar,
    stats: Mutex<PoolStats>,
}

impl ConnectionPool {
    /// Creates an empty pool. Connections are opened on demand.
    pub fn new(connector: Arc<dyn Connector>, config: &GatewayConfig) -> ClientResult<Self> {
        if config.max_connections == 0 {
            return Err(ClientError::InvalidConfig(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            connector,
            max_connections: config.max_connections,
            acquire_timeout: config.acquire_timeout_duration(),
            idle_timeout: config.idle_timeout_duration(),
            max_lifetime: config.max_lifetime_duration(),
            health_check_interval: config.health_check_interval_duration(),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                size: 0,
                closed: false,
            }),
            returned: Condvar::new(),
            stats: Mutex::new(PoolStats::default()),
        })
    }

    /// Borrows a connection, opening one if the pool has room, or waiting up
    /// to the acquire timeout for one to be returned.
    pub fn acquire(&self) -> ClientResult<PooledConnection<'_>> {
        let deadline = Instant::now() + self.acquire_timeout;

        loop {
            match self.checkout(deadline)? {
                Checkout::Idle(mut idle) => {
                    if idle.last_used.elapsed() >= self.health_check_interval {
                        if let Err(e) = idle.conn.ping() {
                            warn!(
                                "pooled connection {} failed health check: {}",
                                idle.conn.peer(),
                                e
                            );
                            self.stats.lock().health_check_failures += 1;
                            self.close_slot();
                            continue;
                        }
                    }
                    return Ok(self.lend(idle));
                }
                Checkout::Open => match self.connector.connect() {
                    Ok(conn) => {
                        debug!("pool opened connection to {}", conn.peer());
                        self.stats.lock().connections_created += 1;
                        return Ok(self.lend(IdleConnection::new(conn)));
                    }
                    Err(e) => {
                        self.free_slot();
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        let (size, idle) = {
            let state = self.state.lock();
            (state.size, state.idle.len())
        };
        let mut stats = self.stats.lock().clone();
        stats.current_size = size;
        stats.idle_connections = idle;
        stats.active_connections = size.saturating_sub(idle);
        stats
    }

    /// Returns the number of open connections.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Returns the number of idle connections.
    pub fn available(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Returns the configured capacity.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Closes the pool. Idle connections are dropped now; borrowed ones are
    /// dropped when returned. Waiters fail with `PoolClosed`.
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            let drained = std::mem::take(&mut state.idle);
            state.size -= drained.len();
            drained
        };
        self.stats.lock().connections_closed += drained.len() as u64;
        self.returned.notify_all();
        debug!("pool closed, dropped {} idle connections", drained.len());
    }

    /// Returns true if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    /// Takes a usable idle connection or reserves a slot for a new one,
    /// waiting until `deadline` when the pool is at capacity.
    fn checkout(&self, deadline: Instant) -> ClientResult<Checkout> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(ClientError::PoolClosed);
            }

            while let Some(idle) = state.idle.pop_front() {
                if idle.is_expired(self.max_lifetime)
                    || idle.is_idle(self.idle_timeout)
                    || idle.conn.is_broken()
                {
                    debug!("recycling stale connection {}", idle.conn.peer());
                    state.size -= 1;
                    self.stats.lock().connections_closed += 1;
                    continue;
                }
                return Ok(Checkout::Idle(idle));
            }

            if state.size < self.max_connections {
                state.size += 1;
                return Ok(Checkout::Open);
            }

            if self.returned.wait_until(&mut state, deadline).timed_out() {
                self.stats.lock().timeouts += 1;
                return Err(ClientError::PoolTimeout(
                    self.acquire_timeout.as_millis() as u64
                ));
            }
        }
    }

    fn lend(&self, idle: IdleConnection) -> PooledConnection<'_> {
        self.stats.lock().acquisitions += 1;
        PooledConnection {
            pool: self,
            inner: Some(idle),
        }
    }

    /// Returns a borrowed connection to the pool.
    fn release(&self, mut idle: IdleConnection) {
        idle.mark_used();

        let keep = {
            let mut state = self.state.lock();
            let keep = !state.closed
                && !idle.conn.is_broken()
                && !idle.is_expired(self.max_lifetime);
            if keep {
                state.idle.push_back(idle);
            } else {
                state.size -= 1;
            }
            keep
        };

        {
            let mut stats = self.stats.lock();
            stats.releases += 1;
            if !keep {
                stats.connections_closed += 1;
            }
        }
        self.returned.notify_one();
    }

    /// Gives back the slot of a connection that has been dropped.
    fn close_slot(&self) {
        self.stats.lock().connections_closed += 1;
        self.free_slot();
    }

    /// Gives back a reserved slot.
    fn free_slot(&self) {
        self.state.lock().size -= 1;
        self.returned.notify_one();
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.connector.target())
            .field("max_connections", &self.max_connections)
            .field("current_size", &self.size())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// When dropped, the connection is returned to the pool, or closed if it
/// broke while borrowed.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    /// Present until drop.
    inner: Option<IdleConnection>,
}

impl PooledConnection<'_> {
    fn idle(&self) -> &IdleConnection {
        self.inner.as_ref().expect("pooled connection used after release")
    }

    /// Returns how long the connection has been open.
    pub fn connection_age(&self) -> Duration {
        self.idle().created_at.elapsed()
    }

    /// Returns how many times the connection has been borrowed before.
    pub fn use_count(&self) -> u64 {
        self.idle().use_count
    }
}

impl Deref for PooledConnection<'_> {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        self.idle().conn.as_ref()
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
            .as_mut()
            .expect("pooled connection used after release")
            .conn
            .as_mut()
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(idle) = self.inner.take() {
            self.pool.release(idle);
        }
    }
}

impl fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("peer", &self.peer())
            .field("connection_age", &self.connection_age())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::connection::{MemoryConnector, MemoryStore};

    fn pool_with(store: &Arc<MemoryStore>, config: GatewayConfig) -> ConnectionPool {
        ConnectionPool::new(Arc::new(MemoryConnector::new(Arc::clone(store))), &config).unwrap()
    }

    #[test]
    fn test_pool_rejects_zero_capacity() {
        let store = MemoryStore::shared();
        let result = ConnectionPool::new(
            Arc::new(MemoryConnector::new(store)),
            &GatewayConfig::new().max_connections(0),
        );
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn test_pool_acquire_and_reuse() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new());
        assert_eq!(pool.size(), 0);

        {
            let mut conn = pool.acquire().unwrap();
            conn.set(b"k", b"v").unwrap();
            assert_eq!(pool.stats().active_connections, 1);
        }
        assert_eq!(pool.available(), 1);

        {
            let mut conn = pool.acquire().unwrap();
            assert_eq!(conn.use_count(), 1);
            assert_eq!(conn.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        }

        assert_eq!(store.connections_opened(), 1);
        let stats = pool.stats();
        assert_eq!(stats.connections_created, 1);
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.releases, 2);
    }

    #[test]
    fn test_pool_multiple_acquire() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new().max_connections(3));

        let c1 = pool.acquire().unwrap();
        let c2 = pool.acquire().unwrap();
        let c3 = pool.acquire().unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.stats().active_connections, 3);

        drop(c1);
        drop(c2);
        drop(c3);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_pool_timeout_when_exhausted() {
        let store = MemoryStore::shared();
        let pool = pool_with(
            &store,
            GatewayConfig::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(20)),
        );

        let _held = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, ClientError::PoolTimeout(20)));
        assert_eq!(pool.stats().timeouts, 1);
    }

    #[test]
    fn test_pool_waiter_wakes_on_release() {
        let store = MemoryStore::shared();
        let pool = pool_with(
            &store,
            GatewayConfig::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(5)),
        );

        let held = pool.acquire().unwrap();
        thread::scope(|s| {
            let waiter = s.spawn(|| pool.acquire().map(|c| c.use_count()));
            thread::sleep(Duration::from_millis(20));
            drop(held);
            assert_eq!(waiter.join().unwrap().unwrap(), 1);
        });
        assert_eq!(store.connections_opened(), 1);
    }

    #[test]
    fn test_broken_connection_not_returned() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new());

        {
            let mut conn = pool.acquire().unwrap();
            store.fail_next(1);
            assert!(conn.get(b"k").is_err());
        }
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.size(), 0);

        let mut conn = pool.acquire().unwrap();
        assert!(conn.ping().is_ok());
        assert_eq!(store.connections_opened(), 2);
    }

    #[test]
    fn test_health_check_on_borrow() {
        let store = MemoryStore::shared();
        let pool = pool_with(
            &store,
            GatewayConfig::new().health_check_interval(Duration::ZERO),
        );

        drop(pool.acquire().unwrap());
        drop(pool.acquire().unwrap());
        assert_eq!(store.command_count("PING"), 1);

        // The idle connection fails its ping and is replaced.
        store.fail_next(1);
        let mut conn = pool.acquire().unwrap();
        assert!(conn.ping().is_ok());
        assert_eq!(pool.stats().health_check_failures, 1);
        assert_eq!(store.connections_opened(), 2);
    }

    #[test]
    fn test_expired_connections_recycled() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new().max_lifetime(Duration::ZERO));

        for _ in 0..2 {
            let conn = pool.acquire().unwrap();
            thread::sleep(Duration::from_millis(2));
            drop(conn);
        }
        assert_eq!(store.connections_opened(), 2);
        assert_eq!(pool.stats().connections_closed, 2);
    }

    #[test]
    fn test_connect_failure_frees_slot() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new().max_connections(1));

        store.set_unavailable(true);
        assert!(matches!(
            pool.acquire(),
            Err(ClientError::ConnectionRefused { .. })
        ));
        assert_eq!(pool.size(), 0);

        store.set_unavailable(false);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_pool_close() {
        let store = MemoryStore::shared();
        let pool = pool_with(&store, GatewayConfig::new());
        drop(pool.acquire().unwrap());

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.size(), 0);
        assert!(matches!(pool.acquire(), Err(ClientError::PoolClosed)));
    }
}
