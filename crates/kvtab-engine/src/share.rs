//! Per-table shared state.
//!
//! Every handler open against a table holds an `Arc` to the same [`Share`].
//! The [`ShareRegistry`] creates a share on first open and keeps it until the
//! host evicts it; closing handlers never destroys a share.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use kvtab_common::config::RegistryConfig;
use kvtab_common::TableName;
use kvtab_lock::TableLock;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{HandlerError, HandlerResult};

/// Counters recorded by the handlers of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareStats {
    /// Rows written through `insert_row`.
    pub rows_inserted: u64,
    /// Rows returned by scans.
    pub rows_read: u64,
    /// Scans started.
    pub scans_started: u64,
}

/// Shared state for one table.
pub struct Share {
    table: TableName,
    stats: Mutex<ShareStats>,
    lock: Arc<TableLock>,
    open_handlers: AtomicUsize,
    created_at: Instant,
}

impl Share {
    fn new(table: TableName) -> Self {
        Self {
            lock: Arc::new(TableLock::new(table.clone())),
            table,
            stats: Mutex::new(ShareStats::default()),
            open_handlers: AtomicUsize::new(0),
            created_at: Instant::now(),
        }
    }

    /// Returns the table this share belongs to.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Returns the table lock descriptor.
    pub fn lock(&self) -> &Arc<TableLock> {
        &self.lock
    }

    /// Returns the number of handlers currently open against the table.
    pub fn open_handlers(&self) -> usize {
        self.open_handlers.load(Ordering::Acquire)
    }

    /// Returns when the share was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns a snapshot of the table counters.
    pub fn stats(&self) -> ShareStats {
        self.stats.lock().clone()
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut ShareStats)) {
        f(&mut self.stats.lock());
    }

    pub(crate) fn attach(&self) {
        self.open_handlers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn detach(&self) {
        self.open_handlers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("table", &self.table)
            .field("open_handlers", &self.open_handlers())
            .field("lock", &self.lock)
            .finish()
    }
}

/// Process-wide map from table to share.
#[derive(Debug)]
pub struct ShareRegistry {
    shares: Mutex<HashMap<TableName, Arc<Share>>>,
    max_shares: usize,
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl ShareRegistry {
    /// Creates an empty registry.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            shares: Mutex::new(HashMap::new()),
            max_shares: config.max_shares,
        }
    }

    /// Returns the share for `table`, creating it on first use.
    ///
    /// Fails with `ShareAllocationFailed` when a new share is needed and the
    /// registry is at capacity.
    pub fn get_or_create(&self, table: &TableName) -> HandlerResult<Arc<Share>> {
        let mut shares = self.shares.lock();
        if let Some(share) = shares.get(table) {
            return Ok(Arc::clone(share));
        }

        if shares.len() >= self.max_shares {
            return Err(HandlerError::ShareAllocationFailed {
                table: table.clone(),
                reason: format!("registry holds the maximum of {} shares", self.max_shares),
            });
        }

        let share = Arc::new(Share::new(table.clone()));
        shares.insert(table.clone(), Arc::clone(&share));
        info!("created share for {}", table);
        Ok(share)
    }

    /// Returns the share for `table` if one exists.
    pub fn get(&self, table: &TableName) -> Option<Arc<Share>> {
        self.shares.lock().get(table).cloned()
    }

    /// Removes the share for `table`. Handlers still holding it keep a
    /// working reference; the next open creates a fresh share.
    pub fn evict(&self, table: &TableName) -> Option<Arc<Share>> {
        let evicted = self.shares.lock().remove(table);
        if let Some(share) = &evicted {
            info!(
                "evicted share for {} ({} handlers still open)",
                table,
                share.open_handlers()
            );
        } else {
            debug!("no share to evict for {}", table);
        }
        evicted
    }

    /// Returns the number of shares.
    pub fn len(&self) -> usize {
        self.shares.lock().len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.shares.lock().is_empty()
    }

    /// Returns the registered tables.
    pub fn tables(&self) -> Vec<TableName> {
        self.shares.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = ShareRegistry::default();
        let table = TableName::new("db", "t");

        let first = registry.get_or_create(&table).unwrap();
        let second = registry.get_or_create(&table).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(first.lock(), second.lock()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_tables() {
        let registry = ShareRegistry::default();
        let a = registry.get_or_create(&TableName::new("db", "a")).unwrap();
        let b = registry.get_or_create(&TableName::new("db", "b")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capacity_exhausted() {
        let registry = ShareRegistry::new(&RegistryConfig { max_shares: 1 });
        registry.get_or_create(&TableName::new("db", "a")).unwrap();

        // Existing shares are still returned at capacity.
        assert!(registry.get_or_create(&TableName::new("db", "a")).is_ok());

        let err = registry
            .get_or_create(&TableName::new("db", "b"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::ShareAllocationFailed { .. }));
    }

    #[test]
    fn test_evict() {
        let registry = ShareRegistry::default();
        let table = TableName::new("db", "t");
        let old = registry.get_or_create(&table).unwrap();

        assert!(registry.evict(&table).is_some());
        assert!(registry.get(&table).is_none());
        assert!(registry.evict(&table).is_none());

        let fresh = registry.get_or_create(&table).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
    }

    #[test]
    fn test_concurrent_opens_share_one_instance() {
        let registry = ShareRegistry::default();
        let table = TableName::new("db", "t");

        let shares: Vec<Arc<Share>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| registry.get_or_create(&table).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(shares.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
