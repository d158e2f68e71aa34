//! Subcommand implementations.
//!
//! Each command builds an [`Engine`] from the effective configuration and
//! goes through a [`TableHandler`](kvtab_engine::TableHandler) the way a host
//! statement would: open, lock, operate, unlock, close.

use std::io::Write;

use anyhow::{Context, Result};
use kvtab_common::AdapterConfig;
use kvtab_engine::{
    bind, Engine, LockHint, OpenMode, Row, ScanStep, SchemaDescriptor, TableHandler, TableSchema,
};
use kvtab_lock::{LockRequestSet, LockType};
use tracing::debug;

/// Inserts one row into `table`.
pub fn insert(config: &AdapterConfig, table: &str, key: &str, value: &str) -> Result<()> {
    let engine = Engine::new(config)?;
    insert_with(&engine, table, key, value)
}

/// Writes every row of `table` to `out`, returning the row count.
pub fn scan(config: &AdapterConfig, table: &str, out: &mut impl Write) -> Result<usize> {
    let engine = Engine::new(config)?;
    scan_with(&engine, table, out)
}

/// Sends `PING` and prints `PONG` on success.
pub fn ping(config: &AdapterConfig, out: &mut impl Write) -> Result<()> {
    let engine = Engine::new(config)?;
    ping_with(&engine, out)
}

/// Prints the effective configuration as TOML.
pub fn print_config(config: &AdapterConfig, out: &mut impl Write) -> Result<()> {
    out.write_all(config.to_toml()?.as_bytes())?;
    Ok(())
}

/// The table as the host would declare it: the configured key and value
/// columns, with their bound slots.
fn table_schema(engine: &Engine) -> Result<(TableSchema, SchemaDescriptor)> {
    let schema = TableSchema::for_config(engine.table_config());
    let descriptor = bind(&schema, engine.table_config())?;
    Ok((schema, descriptor))
}

fn insert_with(engine: &Engine, table: &str, key: &str, value: &str) -> Result<()> {
    let (schema, descriptor) = table_schema(engine)?;
    let mut handler = engine.handler();
    handler.open(table, &schema, OpenMode::ReadWrite, LockHint::Wait)?;

    let mut locks = LockRequestSet::new();
    handler.store_lock(LockType::ExclusiveWrite, &mut locks)?;
    engine.acquire_locks(&locks, LockHint::Wait)?;

    let mut row = Row::new(descriptor.width);
    row.set(descriptor.key_index, Some(key.to_owned().into()));
    row.set(descriptor.value_index, Some(value.to_owned().into()));
    let result = handler.insert_row(&row);
    engine.release_locks(&locks);
    handler.close();

    result.with_context(|| format!("insert into {table} failed"))?;
    debug!("inserted {} into {}", key, table);
    Ok(())
}

fn scan_with(engine: &Engine, table: &str, out: &mut impl Write) -> Result<usize> {
    let (schema, descriptor) = table_schema(engine)?;
    let mut handler = engine.handler();
    handler.open(table, &schema, OpenMode::ReadOnly, LockHint::Wait)?;

    let mut locks = LockRequestSet::new();
    handler.store_lock(LockType::SharedRead, &mut locks)?;
    engine.acquire_locks(&locks, LockHint::Wait)?;

    let result = write_rows(&mut handler, &descriptor, out);
    engine.release_locks(&locks);
    handler.close();

    result.with_context(|| format!("scan of {table} failed"))
}

fn write_rows(
    handler: &mut TableHandler,
    descriptor: &SchemaDescriptor,
    out: &mut impl Write,
) -> Result<usize> {
    let mut cursor = handler.scan_init()?;
    let mut row = Row::new(descriptor.width);
    let mut count = 0;

    while handler.scan_next(&mut cursor, &mut row)? == ScanStep::Row {
        let key = row
            .get(descriptor.key_index)
            .map(|b| String::from_utf8_lossy(b))
            .unwrap_or_default();
        let value = row
            .get(descriptor.value_index)
            .map(|b| String::from_utf8_lossy(b))
            .unwrap_or_default();
        writeln!(out, "{key}\t{value}")?;
        count += 1;
    }
    handler.scan_end(cursor);
    Ok(count)
}

fn ping_with(engine: &Engine, out: &mut impl Write) -> Result<()> {
    engine
        .gateway()
        .run(|conn| conn.ping())
        .with_context(|| format!("store at {} did not answer", engine.gateway().target()))?;
    writeln!(out, "PONG")?;
    Ok(())
}
