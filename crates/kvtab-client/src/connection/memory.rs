//! In-process store for testing.
//!
//! `MemoryStore` implements the command set the adapter uses against a
//! hash map, so handlers and pools can be tested without a network. It can
//! simulate an outage (refused connections, failing commands) and counts
//! the commands it sees.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use kvtab_common::config::StoreConfig;
use parking_lot::{Mutex, RwLock};

use super::{handshake, Connector, StoreConnection};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{Command, Reply};

/// Number of logical databases.
const DATABASES: u32 = 16;

/// Per-connection protocol state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Whether `AUTH` has succeeded (or is not required).
    authenticated: bool,
    /// Selected logical database.
    db: u32,
}

impl Session {
    /// Returns the selected database.
    pub fn db(&self) -> u32 {
        self.db
    }

    /// Returns true once the session may issue data commands.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Refuse connections and fail every command.
    unavailable: bool,
    /// Fail this many upcoming commands.
    fail_next: usize,
}

#[derive(Debug, Clone)]
struct Credentials {
    username: Option<String>,
    password: String,
}

/// An in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Keyspace per logical database.
    databases: RwLock<HashMap<u32, HashMap<Bytes, Bytes>>>,
    /// Required credentials, if any.
    credentials: Option<Credentials>,
    /// Injected faults.
    faults: Mutex<Faults>,
    /// Commands seen, by name.
    command_counts: Mutex<HashMap<&'static str, u64>>,
    /// Connections opened through a `MemoryConnector`.
    connections_opened: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store wrapped in `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates a store that requires `AUTH password`.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials {
                username: None,
                password: password.into(),
            }),
            ..Self::default()
        }
    }

    /// Creates a store that requires `AUTH username password`.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials {
                username: Some(username.into()),
                password: password.into(),
            }),
            ..Self::default()
        }
    }

    /// Starts a new protocol session.
    pub fn new_session(&self) -> Session {
        Session {
            authenticated: self.credentials.is_none(),
            db: 0,
        }
    }

    /// Applies one command and returns the reply the store would send.
    pub fn apply(&self, session: &mut Session, command: &Command) -> Reply {
        *self.command_counts.lock().entry(command.name()).or_insert(0) += 1;

        if let Command::Auth { username, password } = command {
            return self.authenticate(session, username.as_ref(), password);
        }
        if !session.authenticated {
            return Reply::error("NOAUTH Authentication required.");
        }

        match command {
            Command::Ping => Reply::Status("PONG".to_string()),
            Command::Select { db } => {
                if *db < DATABASES {
                    session.db = *db;
                    Reply::ok()
                } else {
                    Reply::error("ERR DB index is out of range")
                }
            }
            Command::Set { key, value } => {
                self.databases
                    .write()
                    .entry(session.db)
                    .or_default()
                    .insert(key.clone(), value.clone());
                Reply::ok()
            }
            Command::Get { key } => Reply::Bulk(
                self.databases
                    .read()
                    .get(&session.db)
                    .and_then(|keyspace| keyspace.get(key).cloned()),
            ),
            Command::Keys { pattern } => {
                let keys = self
                    .databases
                    .read()
                    .get(&session.db)
                    .map(|keyspace| {
                        keyspace
                            .keys()
                            .filter(|key| glob_match(pattern, key))
                            .map(|key| Reply::Bulk(Some(key.clone())))
                            .collect()
                    })
                    .unwrap_or_default();
                Reply::Array(Some(keys))
            }
            Command::Auth { .. } => unreachable!("handled above"),
        }
    }

    fn authenticate(
        &self,
        session: &mut Session,
        username: Option<&Bytes>,
        password: &Bytes,
    ) -> Reply {
        let Some(expected) = &self.credentials else {
            return Reply::error("ERR AUTH called without any password configured");
        };

        let user_ok = match (&expected.username, username) {
            (Some(want), Some(got)) => want.as_bytes() == &got[..],
            (None, None) => true,
            (None, Some(got)) => &got[..] == b"default",
            (Some(_), None) => false,
        };

        if user_ok && expected.password.as_bytes() == &password[..] {
            session.authenticated = true;
            Reply::ok()
        } else {
            Reply::error("WRONGPASS invalid username-password pair")
        }
    }

    /// Simulates an outage: while set, connections are refused and every
    /// command fails with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Returns true while an outage is simulated.
    pub fn is_unavailable(&self) -> bool {
        self.faults.lock().unavailable
    }

    /// Makes the next `n` commands fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.faults.lock().fail_next = n;
    }

    /// Consumes one injected fault, if any applies.
    fn take_fault(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.unavailable {
            return true;
        }
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return true;
        }
        false
    }

    /// Writes a key directly into database 0, bypassing the protocol.
    pub fn insert(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.databases
            .write()
            .entry(0)
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Removes a key from database 0, bypassing the protocol.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.databases
            .write()
            .get_mut(&0)
            .map_or(false, |keyspace| keyspace.remove(key).is_some())
    }

    /// Reads a key from a database, bypassing the protocol.
    pub fn value(&self, db: u32, key: &[u8]) -> Option<Bytes> {
        self.databases
            .read()
            .get(&db)
            .and_then(|keyspace| keyspace.get(key).cloned())
    }

    /// Returns the number of keys in database 0.
    pub fn len(&self) -> usize {
        self.databases.read().get(&0).map_or(0, HashMap::len)
    }

    /// Returns true if database 0 is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key from every database.
    pub fn clear(&self) {
        self.databases.write().clear();
    }

    /// Returns how many times a command has been applied.
    pub fn command_count(&self, name: &str) -> u64 {
        self.command_counts
            .lock()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map_or(0, |(_, v)| *v)
    }

    /// Returns how many connections have been opened.
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }
}

/// A connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    session: Session,
    id: u64,
    broken: bool,
}

impl MemoryConnection {
    /// Opens a connection to the store.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let id = store.connections_opened.fetch_add(1, Ordering::Relaxed) + 1;
        let session = store.new_session();
        Self {
            store,
            session,
            id,
            broken: false,
        }
    }

    /// Returns the session state.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl StoreConnection for MemoryConnection {
    fn execute(&mut self, command: &Command) -> ClientResult<Reply> {
        if self.broken {
            return Err(ClientError::ConnectionClosed);
        }
        if self.store.take_fault() {
            self.broken = true;
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "memory store unavailable",
            )));
        }

        match self.store.apply(&mut self.session, command) {
            Reply::Error(msg) => Err(ClientError::Server(msg)),
            reply => Ok(reply),
        }
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn peer(&self) -> String {
        format!("memory#{}", self.id)
    }
}

/// Opens connections to a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    config: Option<StoreConfig>,
}

impl MemoryConnector {
    /// Creates a connector for the store.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            config: None,
        }
    }

    /// Runs the configured `AUTH`/`SELECT` handshake on every connection.
    pub fn with_config(store: Arc<MemoryStore>, config: StoreConfig) -> Self {
        Self {
            store,
            config: Some(config),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> ClientResult<Box<dyn StoreConnection>> {
        if self.store.is_unavailable() {
            return Err(ClientError::ConnectionRefused {
                addr: self.target(),
                reason: "store unavailable".to_string(),
            });
        }

        let mut conn = MemoryConnection::new(Arc::clone(&self.store));
        if let Some(config) = &self.config {
            handshake(&mut conn, config)?;
        }
        Ok(Box::new(conn))
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

/// Glob matching as used by `KEYS`: `*`, `?`, `[abc]`, `[a-z]`, `[^x]`
/// and `\` escapes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(p + 1),
            Some(b'[') => match_class(pattern, p, text[t]),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&c) => (c == text[t]).then_some(p + 1),
            None => None,
        };

        if let Some(next) = step {
            p = next;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p.min(pattern.len())..].iter().all(|&c| c == b'*')
}

/// Matches `c` against the class opening at `pattern[start]`. Returns the
/// index after the class on a match.
fn match_class(pattern: &[u8], start: usize, c: u8) -> Option<usize> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }

    if i >= pattern.len() {
        // Unterminated class: `[` is a literal.
        return (c == b'[').then_some(start + 1);
    }
    (matched != negate).then_some(i + 1)
}
