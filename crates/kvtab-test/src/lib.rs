//! # kvtab-test
//!
//! Test support for kvtab.
//!
//! This crate contains:
//! - [`FakeStoreServer`], a RESP server on a loopback port backed by a
//!   [`MemoryStore`]
//! - End-to-end tests under `tests/` that drive the table handler over real
//!   TCP connections

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Buf, BytesMut};
use kvtab_client::protocol::{Command, Reply, ReplyDecoder};
use kvtab_client::MemoryStore;
use kvtab_common::config::StoreConfig;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// A RESP server speaking to a [`MemoryStore`].
///
/// Every accepted connection gets its own thread and protocol session.
/// While the store reports itself unavailable, new connections are closed
/// right after accept and open ones are closed on their next request.
pub struct FakeStoreServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    shared: Arc<ServerShared>,
    acceptor: Option<JoinHandle<()>>,
}

/// State shared with the accept loop and connection threads.
#[derive(Default)]
struct ServerShared {
    stopping: AtomicBool,
    accepted: AtomicU64,
    streams: Mutex<Vec<TcpStream>>,
}

impl FakeStoreServer {
    /// Starts a server on an ephemeral loopback port.
    pub fn start(store: Arc<MemoryStore>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(ServerShared::default());

        let acceptor = {
            let store = Arc::clone(&store);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("fake-store-{}", addr.port()))
                .spawn(move || accept_loop(listener, store, shared))?
        };

        debug!("fake store listening on {}", addr);
        Ok(Self {
            addr,
            store,
            shared,
            acceptor: Some(acceptor),
        })
    }

    /// Starts a server over a fresh empty store.
    pub fn start_empty() -> io::Result<Self> {
        Self::start(MemoryStore::shared())
    }

    /// Returns the listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns a store configuration pointing at this server.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns the number of connections accepted so far.
    pub fn connections_accepted(&self) -> u64 {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Stops accepting and closes every open connection.
    ///
    /// Later connects to [`addr`](Self::addr) are refused.
    pub fn stop(&mut self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake the blocking accept.
        let _ = TcpStream::connect(self.addr);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        for stream in self.shared.streams.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        debug!("fake store on {} stopped", self.addr);
    }
}

impl Drop for FakeStoreServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, store: Arc<MemoryStore>, shared: Arc<ServerShared>) {
    for stream in listener.incoming() {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };
        if store.is_unavailable() {
            let _ = stream.shutdown(Shutdown::Both);
            continue;
        }
        let id = shared.accepted.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(clone) = stream.try_clone() {
            shared.streams.lock().push(clone);
        }

        let store = Arc::clone(&store);
        let spawned = thread::Builder::new()
            .name(format!("fake-store-conn-{id}"))
            .spawn(move || {
                if let Err(e) = serve(stream, &store) {
                    trace!("connection {} ended: {}", id, e);
                }
            });
        if let Err(e) = spawned {
            debug!("could not spawn connection thread: {}", e);
        }
    }
}

/// Serves one client until it disconnects.
fn serve(mut stream: TcpStream, store: &MemoryStore) -> io::Result<()> {
    let mut session = store.new_session();
    let mut decoder = ReplyDecoder::new();
    let mut read_buf = BytesMut::with_capacity(4096);
    let mut write_buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        read_buf.extend_from_slice(&chunk[..n]);

        loop {
            let (request, used) = match decoder.decode(&read_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    Reply::error(format!("ERR Protocol error: {e}")).encode(&mut write_buf);
                    stream.write_all(&write_buf)?;
                    return Ok(());
                }
            };
            read_buf.advance(used);

            if store.is_unavailable() {
                return stream.shutdown(Shutdown::Both);
            }

            let reply = match Command::from_reply(request) {
                Ok(command) => store.apply(&mut session, &command),
                Err(e) => Reply::error(format!("ERR {e}")),
            };
            reply.encode(&mut write_buf);
        }

        if !write_buf.is_empty() {
            stream.write_all(&write_buf)?;
            write_buf.clear();
        }
    }
}
