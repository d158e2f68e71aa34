//! Handler lock tokens.

use std::fmt;
use std::sync::Arc;

use kvtab_common::HandlerId;
use parking_lot::Mutex;

use crate::table_lock::{LockType, TableLock};

struct TokenState {
    owner: HandlerId,
    lock: Arc<TableLock>,
    lock_type: Mutex<LockType>,
}

/// A handler's lock token, bound to its table's [`TableLock`].
///
/// Clones share the same state, so a token placed in a [`LockRequestSet`]
/// is the handler's token: resetting it on release is visible to the
/// handler.
#[derive(Clone)]
pub struct LockData {
    state: Arc<TokenState>,
}

impl LockData {
    /// Creates an `Unlock` token for `owner`.
    pub fn new(owner: HandlerId, lock: Arc<TableLock>) -> Self {
        Self {
            state: Arc::new(TokenState {
                owner,
                lock,
                lock_type: Mutex::new(LockType::Unlock),
            }),
        }
    }

    /// Returns the owning handler.
    pub fn owner(&self) -> HandlerId {
        self.state.owner
    }

    /// Returns the table lock the token is bound to.
    pub fn table_lock(&self) -> &Arc<TableLock> {
        &self.state.lock
    }

    /// Returns the requested lock type.
    pub fn lock_type(&self) -> LockType {
        *self.state.lock_type.lock()
    }

    /// Records a request for `lock_type` if the token is unset and the
    /// request is not `Ignore`. Returns the type now on the token.
    pub fn request(&self, lock_type: LockType) -> LockType {
        let mut current = self.state.lock_type.lock();
        if *current == LockType::Unlock && lock_type != LockType::Ignore {
            *current = lock_type;
        }
        *current
    }

    /// Resets the token to `Unlock`.
    pub fn reset(&self) {
        *self.state.lock_type.lock() = LockType::Unlock;
    }

    /// Returns true if the table lock holds the requested type for the owner.
    pub fn is_granted(&self) -> bool {
        let requested = self.lock_type();
        requested.needs_grant()
            && self
                .state
                .lock
                .mode_of(self.state.owner)
                .is_some_and(|held| held.covers(requested))
    }

    /// Returns true if both handles refer to the same token.
    pub fn same_token(&self, other: &LockData) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for LockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockData")
            .field("owner", &self.state.owner)
            .field("table", self.state.lock.table())
            .field("lock_type", &self.lock_type())
            .finish()
    }
}

/// Ordered tokens submitted to the coordinator for one statement.
#[derive(Debug, Clone, Default)]
pub struct LockRequestSet {
    tokens: Vec<LockData>,
}

impl LockRequestSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a token.
    pub fn push(&mut self, token: LockData) {
        self.tokens.push(token);
    }

    /// Returns the tokens in request order.
    pub fn tokens(&self) -> &[LockData] {
        &self.tokens
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use kvtab_common::TableName;

    use super::*;

    fn token() -> LockData {
        LockData::new(
            HandlerId::new(7),
            Arc::new(TableLock::new(TableName::new("db", "t"))),
        )
    }

    #[test]
    fn test_request_sets_only_when_unlocked() {
        let token = token();
        assert_eq!(token.lock_type(), LockType::Unlock);

        assert_eq!(token.request(LockType::Ignore), LockType::Unlock);
        assert_eq!(token.request(LockType::SharedRead), LockType::SharedRead);
        // A set token keeps its type until reset.
        assert_eq!(token.request(LockType::ExclusiveWrite), LockType::SharedRead);

        token.reset();
        assert_eq!(token.request(LockType::ExclusiveWrite), LockType::ExclusiveWrite);
    }

    #[test]
    fn test_clones_share_state() {
        let token = token();
        let mut set = LockRequestSet::new();
        set.push(token.clone());

        set.tokens()[0].request(LockType::SharedRead);
        assert_eq!(token.lock_type(), LockType::SharedRead);
        assert!(token.same_token(&set.tokens()[0]));
        assert!(!token.same_token(&self::token()));
        assert_eq!(set.len(), 1);
    }
}
