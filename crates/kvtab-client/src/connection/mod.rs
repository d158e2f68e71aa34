//! Store connections.
//!
//! This module provides the seam between the gateway and the network:
//!
//! - `StoreConnection`: one open conversation with the store
//! - `Connector`: opens new connections to a fixed target
//! - `TcpConnection` / `TcpConnector`: the real network path
//! - `MemoryStore` / `MemoryConnector`: an in-process store for tests, with
//!   fault injection

mod memory;
mod tcp;

pub use memory::{glob_match, MemoryConnection, MemoryConnector, MemoryStore, Session};
pub use tcp::{TcpConnection, TcpConnector};

use std::fmt;

use bytes::Bytes;
use kvtab_common::config::StoreConfig;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::protocol::{Command, Reply};

/// One open connection to the store.
///
/// Error replies from the store surface as [`ClientError::Server`]; every
/// other `Ok` is a well-formed reply.
pub trait StoreConnection: Send {
    /// Sends one command and waits for its reply.
    fn execute(&mut self, command: &Command) -> ClientResult<Reply>;

    /// Returns true once a transport or framing failure has made the
    /// connection unusable.
    fn is_broken(&self) -> bool;

    /// Returns a description of the peer, for logging.
    fn peer(&self) -> String;

    /// Checks that the store answers.
    fn ping(&mut self) -> ClientResult<()> {
        match self.execute(&Command::Ping)? {
            Reply::Status(status) if status.eq_ignore_ascii_case("PONG") => Ok(()),
            Reply::Bulk(Some(_)) => Ok(()),
            other => Err(ClientError::protocol(format!(
                "unexpected PING reply: {}",
                other.kind()
            ))),
        }
    }

    /// `SET key value`. The status reply is discarded.
    fn set(&mut self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.execute(&Command::set(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        ))?;
        Ok(())
    }

    /// `GET key`.
    fn get(&mut self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.execute(&Command::get(Bytes::copy_from_slice(key)))?
            .into_bulk()
    }

    /// `KEYS pattern`.
    fn keys(&mut self, pattern: &[u8]) -> ClientResult<Vec<Bytes>> {
        self.execute(&Command::keys(Bytes::copy_from_slice(pattern)))?
            .into_bulk_array()
    }
}

/// Opens connections to one store.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Opens a new connection, ready for commands.
    fn connect(&self) -> ClientResult<Box<dyn StoreConnection>>;

    /// Returns a description of the target, for logging.
    fn target(&self) -> String;
}

/// Runs the post-connect handshake: `AUTH` if a password is configured,
/// then `SELECT` if a database is configured.
pub(crate) fn handshake(conn: &mut dyn StoreConnection, config: &StoreConfig) -> ClientResult<()> {
    if let Some(password) = &config.password {
        let command = Command::Auth {
            username: config.username.as_ref().map(|u| Bytes::from(u.clone())),
            password: Bytes::from(password.clone()),
        };
        match conn.execute(&command) {
            Ok(_) => debug!("authenticated to {}", conn.peer()),
            Err(ClientError::Server(msg)) => return Err(ClientError::AuthenticationFailed(msg)),
            Err(e) => return Err(e),
        }
    }

    if let Some(db) = config.database {
        conn.execute(&Command::Select { db })?;
        debug!("selected database {} on {}", db, conn.peer());
    }

    Ok(())
}
