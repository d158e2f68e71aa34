//! Lock coordinator.
//!
//! Grants a [`LockRequestSet`] all at once. If any token conflicts, the
//! tokens granted so far in the attempt are rolled back and the caller waits
//! for a release before trying again, until the timeout expires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use kvtab_common::config::LockConfig;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};
use crate::table_lock::Grant;
use crate::token::{LockData, LockRequestSet};

/// Statistics about the coordinator.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total grants, including upgrades.
    pub acquisitions: AtomicU64,
    /// Total releases.
    pub releases: AtomicU64,
    /// Times a request had to wait.
    pub waits: AtomicU64,
    /// Total upgrades.
    pub upgrades: AtomicU64,
    /// Total timeouts.
    pub timeouts: AtomicU64,
}

impl LockStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Grants and releases table locks for handlers.
#[derive(Debug)]
pub struct LockCoordinator {
    timeout: Duration,
    /// Serializes grant decisions so an all-or-nothing attempt is atomic.
    gate: Mutex<()>,
    /// Signalled on every release.
    released: Condvar,
    stats: LockStats,
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

impl LockCoordinator {
    /// Creates a coordinator.
    pub fn new(config: &LockConfig) -> Self {
        Self::with_timeout(config.timeout())
    }

    /// Creates a coordinator with an explicit wait timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            gate: Mutex::new(()),
            released: Condvar::new(),
            stats: LockStats::default(),
        }
    }

    /// Returns the wait timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns coordinator statistics.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    /// Grants every token in the set, waiting for conflicting holders up to
    /// the timeout. On error nothing in the set is newly held.
    ///
    /// Tokens of type `Unlock` or `Ignore` are skipped.
    pub fn acquire(&self, set: &LockRequestSet) -> LockResult<()> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut gate = self.gate.lock();

        loop {
            let blocked = match self.try_grant_all(set) {
                Ok(()) => return Ok(()),
                Err(blocked) => blocked,
            };

            LockStats::bump(&self.stats.waits);
            debug!(
                "{} waits for {} lock on {}",
                blocked.owner(),
                blocked.lock_type(),
                blocked.table_lock().table()
            );

            if self.released.wait_until(&mut gate, deadline).timed_out() {
                // A release may have raced the timeout.
                if self.try_grant_all(set).is_ok() {
                    return Ok(());
                }
                LockStats::bump(&self.stats.timeouts);
                let table = blocked.table_lock().table().clone();
                warn!("lock wait timeout on {} for {}", table, blocked.owner());
                return Err(LockError::Timeout {
                    table,
                    waited_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }

    /// Grants every token in the set or fails immediately with `Conflict`.
    pub fn try_acquire(&self, set: &LockRequestSet) -> LockResult<()> {
        let _gate = self.gate.lock();
        self.try_grant_all(set).map_err(|blocked| LockError::Conflict {
            table: blocked.table_lock().table().clone(),
        })
    }

    /// Releases every token's hold and resets the tokens to `Unlock`.
    pub fn release(&self, set: &LockRequestSet) {
        {
            let _gate = self.gate.lock();
            for token in set.tokens() {
                self.release_locked(token);
            }
        }
        self.released.notify_all();
    }

    /// Releases a single token, as a closing handler does.
    pub fn release_token(&self, token: &LockData) {
        {
            let _gate = self.gate.lock();
            self.release_locked(token);
        }
        self.released.notify_all();
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn release_locked(&self, token: &LockData) {
        if token.table_lock().release(token.owner()) {
            LockStats::bump(&self.stats.releases);
            debug!(
                "{} released lock on {}",
                token.owner(),
                token.table_lock().table()
            );
        }
        token.reset();
    }

    /// One all-or-nothing attempt. Must be called with the gate held.
    /// Returns the first blocked token on conflict.
    fn try_grant_all<'a>(&self, set: &'a LockRequestSet) -> Result<(), &'a LockData> {
        let mut undo = Vec::new();

        for token in set.tokens() {
            let mode = token.lock_type();
            if !mode.needs_grant() {
                continue;
            }

            let lock = token.table_lock();
            let prior = lock.mode_of(token.owner());
            match lock.try_grant(token.owner(), mode) {
                Some(Grant::AlreadyHeld) => {}
                Some(grant) => {
                    undo.push((token, prior));
                    if grant == Grant::Upgraded {
                        LockStats::bump(&self.stats.upgrades);
                    }
                }
                None => {
                    for (granted, prior) in undo.into_iter().rev() {
                        granted.table_lock().restore(granted.owner(), prior);
                    }
                    return Err(token);
                }
            }
        }

        for (token, _) in &undo {
            LockStats::bump(&self.stats.acquisitions);
            debug!(
                "{} granted {} lock on {}",
                token.owner(),
                token.lock_type(),
                token.table_lock().table()
            );
        }
        Ok(())
    }
}
