//! TCP connections to the store.
//!
//! Blocking `std::net` sockets: every call waits for its reply. Timeouts
//! apply only when configured.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use bytes::{Buf, BytesMut};
use kvtab_common::config::StoreConfig;
use tracing::{debug, warn};

use super::{handshake, Connector, StoreConnection};
use crate::error::{ClientError, ClientResult, ConnectionState};
use crate::protocol::{Command, Reply, ReplyDecoder};

/// Bytes read from the socket per `read` call.
const READ_CHUNK: usize = 16 * 1024;

/// A blocking TCP connection to the store.
pub struct TcpConnection {
    /// The socket.
    stream: TcpStream,
    /// Bytes received but not yet decoded.
    read_buf: BytesMut,
    /// Progress through the reply at the front of `read_buf`.
    decoder: ReplyDecoder,
    /// Encoded request.
    write_buf: BytesMut,
    /// `host:port` of the peer.
    peer: String,
    /// Connection state.
    state: ConnectionState,
}

impl TcpConnection {
    /// Connects to the configured store and runs the handshake.
    pub fn connect(config: &StoreConfig) -> ClientResult<Self> {
        let addr = config.address();
        let refused = |reason: String| ClientError::ConnectionRefused {
            addr: addr.clone(),
            reason,
        };

        let candidates: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| refused(e.to_string()))?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for candidate in candidates {
            let attempt = match config.connect_timeout_duration() {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        let stream = stream.ok_or_else(|| {
            refused(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no addresses resolved".to_string()),
            )
        })?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.io_timeout_duration())?;
        stream.set_write_timeout(config.io_timeout_duration())?;

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            decoder: ReplyDecoder::new(),
            write_buf: BytesMut::with_capacity(256),
            peer: addr,
            state: ConnectionState::Connected,
        };
        handshake(&mut conn, config)?;

        debug!("connected to {}", conn.peer);
        Ok(conn)
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn round_trip(&mut self, command: &Command) -> ClientResult<Reply> {
        self.write_buf.clear();
        command.encode(&mut self.write_buf);
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> ClientResult<Reply> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((reply, used)) = self.decoder.decode(&self.read_buf)? {
                self.read_buf.advance(used);
                return Ok(reply);
            }

            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl StoreConnection for TcpConnection {
    fn execute(&mut self, command: &Command) -> ClientResult<Reply> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::ConnectionClosed);
        }

        match self.round_trip(command) {
            Ok(Reply::Error(msg)) => Err(ClientError::Server(msg)),
            Ok(reply) => Ok(reply),
            Err(e) => {
                if e.breaks_connection() {
                    warn!("{} to {} failed, dropping connection: {}", command.name(), self.peer, e);
                    self.state = ConnectionState::Broken;
                }
                Err(e)
            }
        }
    }

    fn is_broken(&self) -> bool {
        self.state != ConnectionState::Connected
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.state = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("buffered", &self.read_buf.len())
            .finish()
    }
}

/// Opens TCP connections to a configured store.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: StoreConfig,
}

impl TcpConnector {
    /// Creates a connector for the given store.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> ClientResult<Box<dyn StoreConnection>> {
        Ok(Box::new(TcpConnection::connect(&self.config)?))
    }

    fn target(&self) -> String {
        self.config.address()
    }
}
