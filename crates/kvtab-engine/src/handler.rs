//! Table handler.
//!
//! A `TableHandler` maps the relational table lifecycle onto store commands.
//!
//! ```text
//!            open()                 scan_init()
//!  Closed ──────────► Idle ◄──────────────────► Scanning
//!    ▲                 │      scan_end() of the       │
//!    │     close()     │      last active scan        │
//!    └─────────────────┴──────────────────────────────┘
//! ```
//!
//! Rows are written with `SET` and read by enumerating keys with `KEYS` and
//! fetching each value with `GET`. Every remote call runs on a connection
//! leased from the engine's gateway for the duration of the operation.
//! Operations the store cannot express fail with `UnsupportedOperation`.

use std::collections::HashSet;
use std::sync::Arc;

use kvtab_common::config::SnapshotPolicy;
use kvtab_common::{HandlerId, TableName};
use kvtab_lock::{LockData, LockRequestSet, LockType};
use tracing::{debug, trace, warn};

use crate::codec::RowCodec;
use crate::cursor::{CursorState, ScanCursor, ScanStep};
use crate::engine::{Capabilities, Engine};
use crate::error::{HandlerError, HandlerResult};
use crate::row::Row;
use crate::schema::{bind, TableSchema};
use crate::share::{Share, ShareStats};

/// Row estimate reported for every range, low enough that planners pick
/// this table's access path.
pub const RANGE_ESTIMATE: u64 = 10;

/// Handler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Not open against any table.
    Closed,
    /// Open with no active scan.
    Idle,
    /// Open with at least one active scan.
    Scanning,
}

/// How the host opened the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Reads only. `insert_row` is rejected.
    ReadOnly,
    /// Reads and writes.
    #[default]
    ReadWrite,
}

/// How the statement wants lock conflicts handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockHint {
    /// Wait for conflicting holders up to the lock timeout.
    #[default]
    Wait,
    /// Fail immediately on conflict.
    NoWait,
}

/// Hints passed through `extra`. None change behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraHint {
    /// Reset to normal operation.
    Normal,
    /// Only key columns will be read.
    KeyRead,
    /// All columns will be read.
    NoKeyRead,
    /// Writes may be cached until the statement ends.
    WriteCache,
    /// Drop any per-statement state.
    ResetState,
}

/// Table information reported by `info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub table: TableName,
    /// Number of rows, when known. The store cannot count cheaply.
    pub records: Option<u64>,
    /// Handlers open against the table.
    pub open_handlers: usize,
    /// Counters kept by the table's handlers.
    pub stats: ShareStats,
}

/// State held while the handler is open.
struct OpenTable {
    name: TableName,
    share: Arc<Share>,
    codec: RowCodec,
    token: LockData,
    mode: OpenMode,
    lock_hint: LockHint,
}

/// A per-statement handle on one table.
pub struct TableHandler {
    id: HandlerId,
    engine: Engine,
    state: HandlerState,
    open: Option<OpenTable>,
    /// Scans started by this handler and not yet ended.
    active_scans: HashSet<u64>,
}

impl TableHandler {
    /// Creates a closed handler.
    pub fn new(engine: Engine) -> Self {
        Self {
            id: HandlerId::next(),
            engine,
            state: HandlerState::Closed,
            open: None,
            active_scans: HashSet::new(),
        }
    }

    /// Returns the handler id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Returns the open table's name.
    pub fn table(&self) -> Option<&TableName> {
        self.open.as_ref().map(|open| &open.name)
    }

    /// Returns the open table's share.
    pub fn share(&self) -> Option<&Arc<Share>> {
        self.open.as_ref().map(|open| &open.share)
    }

    /// Returns the handler's lock token.
    pub fn lock_data(&self) -> Option<&LockData> {
        self.open.as_ref().map(|open| &open.token)
    }

    /// Returns the open mode.
    pub fn open_mode(&self) -> Option<OpenMode> {
        self.open.as_ref().map(|open| open.mode)
    }

    /// Returns the lock hint given at open.
    pub fn lock_hint(&self) -> Option<LockHint> {
        self.open.as_ref().map(|open| open.lock_hint)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens the handler against a table.
    ///
    /// `name` is the host's table path (`./db/table`) or `db.table`. The
    /// schema is bound to the configured key and value columns here, once.
    /// An open handler is closed first.
    pub fn open(
        &mut self,
        name: &str,
        schema: &TableSchema,
        mode: OpenMode,
        lock_hint: LockHint,
    ) -> HandlerResult<()> {
        if self.open.is_some() {
            self.close();
        }

        let table = TableName::parse(name)?;
        let descriptor = bind(schema, self.engine.table_config())?;
        let share = self.engine.registry().get_or_create(&table)?;

        share.attach();
        let token = LockData::new(self.id, Arc::clone(share.lock()));
        debug!("{} opened {} ({:?})", self.id, table, mode);

        self.open = Some(OpenTable {
            name: table,
            share,
            codec: RowCodec::new(descriptor),
            token,
            mode,
            lock_hint,
        });
        self.state = HandlerState::Idle;
        Ok(())
    }

    /// Releases the share, any granted lock and all active scans. Calling it
    /// on a closed handler does nothing.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            self.engine.coordinator().release_token(&open.token);
            open.share.detach();
            debug!("{} closed {}", self.id, open.name);
        }
        self.active_scans.clear();
        self.state = HandlerState::Closed;
    }

    fn open_table(&self) -> HandlerResult<&OpenTable> {
        self.open.as_ref().ok_or(HandlerError::NotOpen)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes a row with `SET key value`. An existing key is overwritten.
    /// The store does not confirm durability.
    pub fn insert_row(&mut self, row: &Row) -> HandlerResult<()> {
        let open = self.open_table()?;
        if open.mode == OpenMode::ReadOnly {
            return Err(HandlerError::unsupported("insert_row on a read-only handler"));
        }

        let (key, value) = open.codec.encode(row)?;
        self.engine.gateway().run(|conn| conn.set(&key, &value))?;

        open.share.record(|stats| stats.rows_inserted += 1);
        debug!("{} SET {} ({} value bytes)", self.id, open.name, value.len());
        Ok(())
    }

    /// Not supported: the store has no compare-and-swap.
    pub fn update_row(&mut self, _old: &Row, _new: &Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("update_row"))
    }

    /// Not supported.
    pub fn delete_row(&mut self, _row: &Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("delete_row"))
    }

    /// Not supported.
    pub fn truncate(&mut self) -> HandlerResult<()> {
        Err(HandlerError::unsupported("truncate"))
    }

    /// Not supported.
    pub fn delete_all_rows(&mut self) -> HandlerResult<()> {
        Err(HandlerError::unsupported("delete_all_rows"))
    }

    /// Not supported: tables are views over an existing key space.
    pub fn create_table(&mut self, _name: &str, _schema: &TableSchema) -> HandlerResult<()> {
        Err(HandlerError::unsupported("create_table"))
    }

    /// Not supported.
    pub fn rename_table(&mut self, _from: &str, _to: &str) -> HandlerResult<()> {
        Err(HandlerError::unsupported("rename_table"))
    }

    /// Drops the table definition. The store is not touched, so the keys
    /// remain visible to a table created again under any name.
    pub fn drop_table(&mut self, name: &str) -> HandlerResult<()> {
        let table = TableName::parse(name)?;
        debug!("{} dropped {} (store untouched)", self.id, table);
        Ok(())
    }

    // =========================================================================
    // Index and positioned reads
    // =========================================================================

    /// Not supported: no indexes.
    pub fn index_read(
        &mut self,
        _index: usize,
        _key: &[u8],
        _row: &mut Row,
    ) -> HandlerResult<()> {
        Err(HandlerError::unsupported("index_read"))
    }

    /// Not supported: no indexes.
    pub fn index_next(&mut self, _row: &mut Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("index_next"))
    }

    /// Not supported: no indexes.
    pub fn index_prev(&mut self, _row: &mut Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("index_prev"))
    }

    /// Not supported: no indexes.
    pub fn index_first(&mut self, _row: &mut Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("index_first"))
    }

    /// Not supported: no indexes.
    pub fn index_last(&mut self, _row: &mut Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("index_last"))
    }

    /// Not supported: rows have no stable position.
    pub fn read_at_position(&mut self, _position: &[u8], _row: &mut Row) -> HandlerResult<()> {
        Err(HandlerError::unsupported("read_at_position"))
    }

    /// Records the position of the current row. Rows have no stable
    /// position, so nothing is recorded.
    pub fn position(&mut self, _row: &Row) {}

    // =========================================================================
    // Scans
    // =========================================================================

    /// Starts a scan and returns its cursor.
    pub fn scan_init(&mut self) -> HandlerResult<ScanCursor> {
        let open = self.open_table()?;
        let cursor = ScanCursor::new(self.id);
        open.share.record(|stats| stats.scans_started += 1);
        trace!("{} scan {} started on {}", self.id, cursor.scan_id(), open.name);

        self.active_scans.insert(cursor.scan_id());
        self.state = HandlerState::Scanning;
        Ok(cursor)
    }

    /// Fetches the next row of a scan into `row`.
    ///
    /// Returns `ScanStep::Row` with the key and value slots filled,
    /// `ScanStep::EndOfScan` once after the last key, or
    /// `StoreUnavailable` if the store cannot be reached. A store failure
    /// leaves the cursor where it was.
    ///
    /// A key removed between enumeration and fetch is skipped.
    pub fn scan_next(
        &mut self,
        cursor: &mut ScanCursor,
        row: &mut Row,
    ) -> HandlerResult<ScanStep> {
        let open = self.open_table()?;
        self.check_cursor(cursor)?;

        let table_config = self.engine.table_config();
        let pattern = table_config.key_pattern.as_bytes();
        let per_row = table_config.snapshot == SnapshotPolicy::PerRow;
        let mut conn = self.engine.gateway().lease()?;

        loop {
            if per_row || cursor.snapshot().is_none() {
                let keys = conn.keys(pattern)?;
                debug!("{} KEYS {} -> {} keys", self.id, open.name, keys.len());
                cursor.set_snapshot(keys);
            }

            let next = cursor
                .snapshot()
                .and_then(|keys| keys.get(cursor.position()))
                .cloned();
            let Some(key) = next else {
                debug!(
                    "{} scan {} on {} ended at position {}",
                    self.id,
                    cursor.scan_id(),
                    open.name,
                    cursor.position()
                );
                cursor.exhaust();
                return Ok(ScanStep::EndOfScan);
            };

            match conn.get(&key)? {
                Some(value) => {
                    open.codec.decode(key, value, row);
                    cursor.advance();
                    open.share.record(|stats| stats.rows_read += 1);
                    return Ok(ScanStep::Row);
                }
                None => {
                    warn!(
                        "{} skipping key {:?} removed during scan of {}",
                        self.id, key, open.name
                    );
                    cursor.advance();
                }
            }
        }
    }

    /// Ends a scan. Always succeeds; the cursor is consumed.
    pub fn scan_end(&mut self, cursor: ScanCursor) {
        if cursor.owner() == self.id && self.active_scans.remove(&cursor.scan_id()) {
            trace!("{} scan {} ended", self.id, cursor.scan_id());
        }
        if self.state == HandlerState::Scanning && self.active_scans.is_empty() {
            self.state = HandlerState::Idle;
        }
    }

    fn check_cursor(&self, cursor: &ScanCursor) -> HandlerResult<()> {
        if cursor.owner() != self.id {
            return Err(HandlerError::ForeignCursor {
                owner: cursor.owner(),
                handler: self.id,
            });
        }
        if cursor.state() == CursorState::Exhausted
            || !self.active_scans.contains(&cursor.scan_id())
        {
            return Err(HandlerError::CursorInvalidated);
        }
        Ok(())
    }

    // =========================================================================
    // Planner and locking callbacks
    // =========================================================================

    /// Estimates rows between two index bounds. Always [`RANGE_ESTIMATE`].
    pub fn estimate_rows_in_range(
        &self,
        _index: usize,
        _min: Option<&[u8]>,
        _max: Option<&[u8]>,
    ) -> u64 {
        RANGE_ESTIMATE
    }

    /// Statement start or end notification. Locking is negotiated through
    /// `store_lock`, so this does nothing.
    pub fn external_lock(&mut self, _lock_type: LockType) -> HandlerResult<()> {
        Ok(())
    }

    /// Declares the lock this statement needs and adds the handler's token
    /// to `set`. The token keeps an earlier request until it is released;
    /// `Ignore` never sets it. Does not block.
    pub fn store_lock(
        &mut self,
        lock_type: LockType,
        set: &mut LockRequestSet,
    ) -> HandlerResult<()> {
        let open = self.open_table()?;
        let requested = open.token.request(lock_type);
        trace!("{} store_lock {} -> {}", self.id, lock_type, requested);
        set.push(open.token.clone());
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Reports table information. The row count is unknown.
    pub fn info(&self) -> HandlerResult<TableInfo> {
        let open = self.open_table()?;
        Ok(TableInfo {
            table: open.name.clone(),
            records: None,
            open_handlers: open.share.open_handlers(),
            stats: open.share.stats(),
        })
    }

    /// Accepts a host hint. No hint changes behavior.
    pub fn extra(&mut self, hint: ExtraHint) -> HandlerResult<()> {
        trace!("{} extra {:?}", self.id, hint);
        Ok(())
    }

    /// Returns the file extensions the engine keeps per table. The store
    /// holds all data, so there are none.
    pub fn file_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Returns the engine capabilities.
    pub fn capabilities(&self) -> Capabilities {
        self.engine.capabilities()
    }
}

impl Drop for TableHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TableHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandler")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("table", &self.table())
            .field("active_scans", &self.active_scans.len())
            .finish()
    }
}
