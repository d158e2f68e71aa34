//! Commands sent to the store.

use bytes::{BufMut, Bytes, BytesMut};

use super::reply::Reply;
use super::CRLF;
use crate::error::{ClientError, ClientResult};

/// A command understood by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value`: insert or overwrite.
    Set {
        /// Key.
        key: Bytes,
        /// Value.
        value: Bytes,
    },
    /// `GET key`: value lookup, nil if absent.
    Get {
        /// Key.
        key: Bytes,
    },
    /// `KEYS pattern`: enumerate matching keys in store order.
    Keys {
        /// Glob pattern.
        pattern: Bytes,
    },
    /// `PING`: liveness check.
    Ping,
    /// `AUTH [username] password`.
    Auth {
        /// ACL username, if any.
        username: Option<Bytes>,
        /// Password.
        password: Bytes,
    },
    /// `SELECT db`: switch logical database.
    Select {
        /// Database index.
        db: u32,
    },
}

impl Command {
    /// Creates a `SET` command.
    pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a `GET` command.
    pub fn get(key: impl Into<Bytes>) -> Self {
        Command::Get { key: key.into() }
    }

    /// Creates a `KEYS` command.
    pub fn keys(pattern: impl Into<Bytes>) -> Self {
        Command::Keys {
            pattern: pattern.into(),
        }
    }

    /// Returns the command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Keys { .. } => "KEYS",
            Command::Ping => "PING",
            Command::Auth { .. } => "AUTH",
            Command::Select { .. } => "SELECT",
        }
    }

    /// Returns the arguments, command name first.
    pub fn args(&self) -> Vec<Bytes> {
        let name = Bytes::from_static(self.name().as_bytes());
        match self {
            Command::Set { key, value } => vec![name, key.clone(), value.clone()],
            Command::Get { key } => vec![name, key.clone()],
            Command::Keys { pattern } => vec![name, pattern.clone()],
            Command::Ping => vec![name],
            Command::Auth {
                username: Some(user),
                password,
            } => vec![name, user.clone(), password.clone()],
            Command::Auth {
                username: None,
                password,
            } => vec![name, password.clone()],
            Command::Select { db } => vec![name, Bytes::from(db.to_string())],
        }
    }

    /// Encodes the command as an array of bulk strings.
    pub fn encode(&self, buf: &mut BytesMut) {
        let args = self.args();
        buf.put_u8(b'*');
        buf.put_slice(args.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for arg in args {
            buf.put_u8(b'$');
            buf.put_slice(arg.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(&arg);
            buf.put_slice(CRLF);
        }
    }

    /// Rebuilds a command from a decoded request array.
    ///
    /// This is the server side of [`Command::encode`].
    pub fn from_reply(request: Reply) -> ClientResult<Self> {
        let items = match request {
            Reply::Array(Some(items)) if !items.is_empty() => items,
            other => {
                return Err(ClientError::protocol(format!(
                    "expected non-empty request array, got {}",
                    other.kind()
                )))
            }
        };

        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Reply::Bulk(Some(bytes)) => args.push(bytes),
                other => {
                    return Err(ClientError::protocol(format!(
                        "request arguments must be bulk strings, got {}",
                        other.kind()
                    )))
                }
            }
        }

        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let arity_error =
            || ClientError::protocol(format!("wrong number of arguments for '{name}'"));

        match (name.as_str(), args.len()) {
            ("SET", 3) => Ok(Command::Set {
                key: args[1].clone(),
                value: args[2].clone(),
            }),
            ("GET", 2) => Ok(Command::Get {
                key: args[1].clone(),
            }),
            ("KEYS", 2) => Ok(Command::Keys {
                pattern: args[1].clone(),
            }),
            ("PING", 1) => Ok(Command::Ping),
            ("AUTH", 2) => Ok(Command::Auth {
                username: None,
                password: args[1].clone(),
            }),
            ("AUTH", 3) => Ok(Command::Auth {
                username: Some(args[1].clone()),
                password: args[2].clone(),
            }),
            ("SELECT", 2) => {
                let db = std::str::from_utf8(&args[1])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ClientError::protocol("SELECT index is not an integer"))?;
                Ok(Command::Select { db })
            }
            ("SET" | "GET" | "KEYS" | "PING" | "AUTH" | "SELECT", _) => Err(arity_error()),
            _ => Err(ClientError::protocol(format!("unknown command '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    #[test]
    fn test_encode_set() {
        let mut buf = BytesMut::new();
        Command::set("k1", "hello world").encode(&mut buf);
        assert_eq!(
            &buf[..],
            b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$11\r\nhello world\r\n"
        );
    }

    #[test]
    fn test_encode_ping() {
        let mut buf = BytesMut::new();
        Command::Ping.encode(&mut buf);
        assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_binary_arguments_survive() {
        let key = Bytes::from_static(b"a\r\nb\0c");
        let command = Command::set(key.clone(), Bytes::from_static(b" spaced value "));

        let mut buf = BytesMut::new();
        command.encode(&mut buf);

        let (request, used) = decode(&buf).unwrap().unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(Command::from_reply(request).unwrap(), command);
    }

    #[test]
    fn test_from_reply_case_insensitive() {
        let request = Reply::Array(Some(vec![
            Reply::Bulk(Some(Bytes::from("keys"))),
            Reply::Bulk(Some(Bytes::from("*"))),
        ]));
        assert_eq!(Command::from_reply(request).unwrap(), Command::keys("*"));
    }

    #[test]
    fn test_from_reply_rejects() {
        let unknown = Reply::Array(Some(vec![Reply::Bulk(Some(Bytes::from("FLUSHALL")))]));
        assert!(matches!(
            Command::from_reply(unknown),
            Err(ClientError::Protocol(_))
        ));

        let arity = Reply::Array(Some(vec![Reply::Bulk(Some(Bytes::from("GET")))]));
        assert!(Command::from_reply(arity).is_err());

        assert!(Command::from_reply(Reply::Status("OK".to_string())).is_err());
    }

    #[test]
    fn test_select_round_trip() {
        let mut buf = BytesMut::new();
        Command::Select { db: 3 }.encode(&mut buf);
        let (request, _) = decode(&buf).unwrap().unwrap();
        assert_eq!(
            Command::from_reply(request).unwrap(),
            Command::Select { db: 3 }
        );
    }
}
