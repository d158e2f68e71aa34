//! Scan cursors.
//!
//! A cursor is the whole state of one scan. It is created by
//! `TableHandler::scan_init`, threaded through every `scan_next`, and
//! consumed by `scan_end`. Two scans never share a position.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use kvtab_common::HandlerId;

static NEXT_SCAN_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of one `scan_next` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// A row was written into the caller's buffer.
    Row,
    /// Every key has been returned. Reported once per scan.
    EndOfScan,
}

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Rows may remain.
    Active,
    /// `EndOfScan` has been reported.
    Exhausted,
}

/// Position of one scan over a key enumeration.
#[derive(Debug)]
pub struct ScanCursor {
    owner: HandlerId,
    scan_id: u64,
    position: usize,
    /// Keys from the enumeration this scan iterates, once fetched.
    snapshot: Option<Vec<Bytes>>,
    state: CursorState,
}

impl ScanCursor {
    pub(crate) fn new(owner: HandlerId) -> Self {
        Self {
            owner,
            scan_id: NEXT_SCAN_ID.fetch_add(1, Ordering::Relaxed),
            position: 0,
            snapshot: None,
            state: CursorState::Active,
        }
    }

    /// Returns the handler that created the cursor.
    pub fn owner(&self) -> HandlerId {
        self.owner
    }

    /// Returns the process-unique scan id.
    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    /// Returns the index of the next key to fetch.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the cursor state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns the number of enumerated keys, once known.
    pub fn snapshot_len(&self) -> Option<usize> {
        self.snapshot.as_ref().map(Vec::len)
    }

    pub(crate) fn snapshot(&self) -> Option<&[Bytes]> {
        self.snapshot.as_deref()
    }

    pub(crate) fn set_snapshot(&mut self, keys: Vec<Bytes>) {
        self.snapshot = Some(keys);
    }

    pub(crate) fn advance(&mut self) {
        self.position += 1;
    }

    pub(crate) fn exhaust(&mut self) {
        self.state = CursorState::Exhausted;
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cursor() {
        let owner = HandlerId::new(3);
        let a = ScanCursor::new(owner);
        let b = ScanCursor::new(owner);

        assert_eq!(a.owner(), owner);
        assert_eq!(a.position(), 0);
        assert_eq!(a.state(), CursorState::Active);
        assert_eq!(a.snapshot_len(), None);
        assert_ne!(a.scan_id(), b.scan_id());
    }

    #[test]
    fn test_advance_and_exhaust() {
        let mut cursor = ScanCursor::new(HandlerId::new(1));
        cursor.set_snapshot(vec![Bytes::from("a"), Bytes::from("b")]);
        cursor.advance();
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.snapshot_len(), Some(2));

        cursor.exhaust();
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(cursor.snapshot_len(), None);
    }
}
