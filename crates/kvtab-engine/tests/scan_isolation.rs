//! Scan isolation.
//!
//! `GlobalPositionScan` reproduces a scan whose position lives in one
//! process-wide counter, the way a naive handler might keep it. Interleaving
//! two such scans makes each skip rows the other consumed. The same
//! interleaving over `TableHandler` cursors returns every row to both scans.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use kvtab_client::{Gateway, MemoryConnector, MemoryStore, StoreConnection};
use kvtab_common::AdapterConfig;
use kvtab_engine::{Engine, LockHint, OpenMode, Row, ScanStep, TableHandler, TableSchema};

static GLOBAL_POSITION: AtomicUsize = AtomicUsize::new(0);

/// A scan whose position is shared by every scan in the process.
struct GlobalPositionScan<'a> {
    gateway: &'a Gateway,
}

impl<'a> GlobalPositionScan<'a> {
    fn init(gateway: &'a Gateway) -> Self {
        GLOBAL_POSITION.store(0, Ordering::SeqCst);
        Self { gateway }
    }

    fn next(&self) -> Option<Bytes> {
        let mut conn = self.gateway.lease().unwrap();
        let keys = conn.keys(b"*").unwrap();
        let position = GLOBAL_POSITION.fetch_add(1, Ordering::SeqCst);
        let key = keys.get(position)?;
        conn.get(key).unwrap().map(|_| key.clone())
    }
}

fn seeded_store(n: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::shared();
    for i in 0..n {
        store.insert(format!("key{i}"), format!("value{i}"));
    }
    store
}

fn engine(store: &Arc<MemoryStore>) -> Engine {
    Engine::with_connector(
        Arc::new(MemoryConnector::new(Arc::clone(store))),
        &AdapterConfig::default(),
    )
    .unwrap()
}

fn open(engine: &Engine, name: &str) -> TableHandler {
    let mut handler = engine.handler();
    handler
        .open(name, &TableSchema::key_value(), OpenMode::ReadOnly, LockHint::Wait)
        .unwrap();
    handler
}

#[test]
fn test_shared_position_corrupts_interleaved_scans() {
    let store = seeded_store(4);
    let gateway = Gateway::transient(Arc::new(MemoryConnector::new(Arc::clone(&store))));

    let a = GlobalPositionScan::init(&gateway);
    let b = GlobalPositionScan::init(&gateway);

    let (mut seen_a, mut seen_b) = (Vec::new(), Vec::new());
    loop {
        let row_a = a.next();
        let row_b = b.next();
        if row_a.is_none() && row_b.is_none() {
            break;
        }
        seen_a.extend(row_a);
        seen_b.extend(row_b);
    }

    // Each scan saw only part of the table, and together they saw it once.
    assert_eq!(seen_a.len(), 2);
    assert_eq!(seen_b.len(), 2);
    let union: HashSet<Bytes> = seen_a.into_iter().chain(seen_b).collect();
    assert_eq!(union.len(), 4);
}

#[test]
fn test_per_scan_cursors_survive_the_same_interleaving() {
    let store = seeded_store(4);
    let engine = engine(&store);
    // Different tables over the same key space, as two unrelated statements.
    let mut first = open(&engine, "db.left");
    let mut second = open(&engine, "db.right");

    let mut cursor_a = first.scan_init().unwrap();
    let mut cursor_b = second.scan_init().unwrap();
    let (mut seen_a, mut seen_b) = (HashSet::new(), HashSet::new());
    let (mut done_a, mut done_b) = (false, false);
    let mut row = Row::new(2);

    while !(done_a && done_b) {
        if !done_a {
            match first.scan_next(&mut cursor_a, &mut row).unwrap() {
                ScanStep::Row => {
                    seen_a.insert(row.get(0).unwrap().clone());
                }
                ScanStep::EndOfScan => done_a = true,
            }
        }
        if !done_b {
            match second.scan_next(&mut cursor_b, &mut row).unwrap() {
                ScanStep::Row => {
                    seen_b.insert(row.get(0).unwrap().clone());
                }
                ScanStep::EndOfScan => done_b = true,
            }
        }
    }
    first.scan_end(cursor_a);
    second.scan_end(cursor_b);

    assert_eq!(seen_a.len(), 4);
    assert_eq!(seen_a, seen_b);
}

#[test]
fn test_concurrent_scans_on_threads() {
    let store = seeded_store(50);
    let engine = engine(&store);

    let results: Vec<HashSet<Bytes>> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                s.spawn(move || {
                    let mut handler = open(&engine, &format!("db.t{}", i % 2));
                    let mut cursor = handler.scan_init().unwrap();
                    let mut row = Row::new(2);
                    let mut seen = HashSet::new();
                    while handler.scan_next(&mut cursor, &mut row).unwrap() == ScanStep::Row {
                        assert!(seen.insert(row.get(0).unwrap().clone()), "row returned twice");
                    }
                    handler.scan_end(cursor);
                    seen
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for seen in results {
        assert_eq!(seen.len(), 50);
    }
}
