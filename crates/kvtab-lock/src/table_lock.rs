//! Table lock descriptor.
//!
//! One `TableLock` lives in each table's share and records which handlers
//! hold the table and in which mode. Granting decisions are made by the
//! [`LockCoordinator`](crate::LockCoordinator); this type only answers
//! whether a grant is compatible and records it.

use std::collections::HashMap;
use std::fmt;

use kvtab_common::{HandlerId, TableName};
use parking_lot::Mutex;

/// Lock type carried by a handler's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockType {
    /// No lock requested. The initial and released state of a token.
    #[default]
    Unlock,
    /// The statement needs no table lock.
    Ignore,
    /// Readers share the table.
    SharedRead,
    /// A writer holds the table alone.
    ExclusiveWrite,
}

impl LockType {
    /// Returns true for types that must be granted by the coordinator.
    pub fn needs_grant(self) -> bool {
        matches!(self, LockType::SharedRead | LockType::ExclusiveWrite)
    }

    /// Checks if this mode may be held alongside `other` by a different owner.
    pub fn is_compatible_with(self, other: LockType) -> bool {
        matches!((self, other), (LockType::SharedRead, LockType::SharedRead))
    }

    /// Returns true if holding `self` already covers a request for `other`.
    pub fn covers(self, other: LockType) -> bool {
        self == other || (self == LockType::ExclusiveWrite && other == LockType::SharedRead)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Unlock => write!(f, "UNLOCK"),
            LockType::Ignore => write!(f, "IGNORE"),
            LockType::SharedRead => write!(f, "READ"),
            LockType::ExclusiveWrite => write!(f, "WRITE"),
        }
    }
}

/// Outcome of a successful grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// The owner did not hold the table before.
    Granted,
    /// The owner already held an equal or stronger mode.
    AlreadyHeld,
    /// The owner was the sole `SharedRead` holder and now writes.
    Upgraded,
}

/// Per-table lock descriptor.
pub struct TableLock {
    table: TableName,
    holders: Mutex<HashMap<HandlerId, LockType>>,
}

impl TableLock {
    /// Creates an unheld lock for a table.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            holders: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the table this lock protects.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Checks if `owner` could be granted `mode` now.
    pub fn can_grant(&self, owner: HandlerId, mode: LockType) -> bool {
        let holders = self.holders.lock();
        Self::compatible(&holders, owner, mode)
    }

    fn compatible(
        holders: &HashMap<HandlerId, LockType>,
        owner: HandlerId,
        mode: LockType,
    ) -> bool {
        holders
            .iter()
            .filter(|(holder, _)| **holder != owner)
            .all(|(_, held)| mode.is_compatible_with(*held))
    }

    /// Grants `mode` to `owner` if no other holder conflicts. Returns `None`
    /// on conflict, leaving the lock unchanged.
    pub fn try_grant(&self, owner: HandlerId, mode: LockType) -> Option<Grant> {
        debug_assert!(mode.needs_grant(), "{mode} is not a grantable mode");

        let mut holders = self.holders.lock();
        match holders.get(&owner).copied() {
            Some(held) if held.covers(mode) => Some(Grant::AlreadyHeld),
            prior => {
                if !Self::compatible(&holders, owner, mode) {
                    return None;
                }
                holders.insert(owner, mode);
                Some(if prior.is_some() {
                    Grant::Upgraded
                } else {
                    Grant::Granted
                })
            }
        }
    }

    /// Puts `owner` back to a previously observed mode.
    pub(crate) fn restore(&self, owner: HandlerId, prior: Option<LockType>) {
        let mut holders = self.holders.lock();
        match prior {
            Some(mode) => holders.insert(owner, mode),
            None => holders.remove(&owner),
        };
    }

    /// Releases `owner`'s hold. Returns false if it held nothing.
    pub fn release(&self, owner: HandlerId) -> bool {
        self.holders.lock().remove(&owner).is_some()
    }

    /// Returns the mode `owner` holds, if any.
    pub fn mode_of(&self, owner: HandlerId) -> Option<LockType> {
        self.holders.lock().get(&owner).copied()
    }

    /// Returns the number of holders.
    pub fn holder_count(&self) -> usize {
        self.holders.lock().len()
    }

    /// Returns true if nobody holds the table.
    pub fn is_free(&self) -> bool {
        self.holders.lock().is_empty()
    }
}

impl fmt::Debug for TableLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLock")
            .field("table", &self.table)
            .field("holders", &*self.holders.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> TableLock {
        TableLock::new(TableName::new("db", "t"))
    }

    #[test]
    fn test_lock_type_compatibility() {
        use LockType::*;
        assert!(SharedRead.is_compatible_with(SharedRead));
        assert!(!SharedRead.is_compatible_with(ExclusiveWrite));
        assert!(!ExclusiveWrite.is_compatible_with(SharedRead));
        assert!(!ExclusiveWrite.is_compatible_with(ExclusiveWrite));

        assert!(!Unlock.needs_grant());
        assert!(!Ignore.needs_grant());
        assert!(ExclusiveWrite.covers(SharedRead));
        assert!(!SharedRead.covers(ExclusiveWrite));
    }

    #[test]
    fn test_shared_readers() {
        let lock = lock();
        let (a, b) = (HandlerId::new(1), HandlerId::new(2));

        assert_eq!(lock.try_grant(a, LockType::SharedRead), Some(Grant::Granted));
        assert_eq!(lock.try_grant(b, LockType::SharedRead), Some(Grant::Granted));
        assert_eq!(lock.holder_count(), 2);

        assert!(!lock.can_grant(a, LockType::ExclusiveWrite));
        assert_eq!(lock.try_grant(a, LockType::ExclusiveWrite), None);
        assert_eq!(lock.mode_of(a), Some(LockType::SharedRead));
    }

    #[test]
    fn test_writer_excludes() {
        let lock = lock();
        let (a, b) = (HandlerId::new(1), HandlerId::new(2));

        assert_eq!(lock.try_grant(a, LockType::ExclusiveWrite), Some(Grant::Granted));
        assert_eq!(lock.try_grant(b, LockType::SharedRead), None);
        assert_eq!(lock.try_grant(b, LockType::ExclusiveWrite), None);

        assert!(lock.release(a));
        assert!(!lock.release(a));
        assert_eq!(lock.try_grant(b, LockType::ExclusiveWrite), Some(Grant::Granted));
    }

    #[test]
    fn test_regrant_and_upgrade() {
        let lock = lock();
        let a = HandlerId::new(1);

        assert_eq!(lock.try_grant(a, LockType::SharedRead), Some(Grant::Granted));
        assert_eq!(lock.try_grant(a, LockType::SharedRead), Some(Grant::AlreadyHeld));
        assert_eq!(lock.try_grant(a, LockType::ExclusiveWrite), Some(Grant::Upgraded));
        assert_eq!(lock.try_grant(a, LockType::SharedRead), Some(Grant::AlreadyHeld));
        assert_eq!(lock.mode_of(a), Some(LockType::ExclusiveWrite));
        assert_eq!(lock.holder_count(), 1);
    }

    #[test]
    fn test_restore() {
        let lock = lock();
        let a = HandlerId::new(1);

        lock.try_grant(a, LockType::SharedRead);
        lock.try_grant(a, LockType::ExclusiveWrite);
        lock.restore(a, Some(LockType::SharedRead));
        assert_eq!(lock.mode_of(a), Some(LockType::SharedRead));

        lock.restore(a, None);
        assert!(lock.is_free());
    }
}
