//! Replies received from the store, and the incremental reply decoder.

use bytes::{BufMut, Bytes, BytesMut};

use super::{CRLF, MAX_ARRAY_LEN, MAX_BULK_LEN, MAX_LINE_LEN};
use crate::error::{ClientError, ClientResult};

/// A reply from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status string, such as `OK` or `PONG`.
    Status(String),
    /// Error string.
    Error(String),
    /// Signed integer.
    Integer(i64),
    /// Binary-safe string; `None` is nil.
    Bulk(Option<Bytes>),
    /// Array of replies; `None` is nil.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// The `+OK` status.
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// An error reply.
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Returns a short name for the reply type.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "nil bulk",
            Reply::Array(Some(_)) => "array",
            Reply::Array(None) => "nil array",
        }
    }

    /// Converts a bulk reply into its payload.
    pub fn into_bulk(self) -> ClientResult<Option<Bytes>> {
        match self {
            Reply::Bulk(value) => Ok(value),
            other => Err(ClientError::protocol(format!(
                "expected bulk reply, got {}",
                other.kind()
            ))),
        }
    }

    /// Converts an array of bulk strings into its payloads.
    ///
    /// A nil array is treated as empty.
    pub fn into_bulk_array(self) -> ClientResult<Vec<Bytes>> {
        match self {
            Reply::Array(None) => Ok(Vec::new()),
            Reply::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Bulk(Some(bytes)) => Ok(bytes),
                    other => Err(ClientError::protocol(format!(
                        "expected bulk array element, got {}",
                        other.kind()
                    ))),
                })
                .collect(),
            other => Err(ClientError::protocol(format!(
                "expected array reply, got {}",
                other.kind()
            ))),
        }
    }

    /// Checks for a status reply.
    pub fn expect_status(self) -> ClientResult<String> {
        match self {
            Reply::Status(status) => Ok(status),
            other => Err(ClientError::protocol(format!(
                "expected status reply, got {}",
                other.kind()
            ))),
        }
    }

    /// Encodes the reply.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.put_u8(b'-');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Reply::Bulk(Some(bytes)) => {
                buf.put_u8(b'$');
                buf.put_slice(bytes.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(bytes);
                buf.put_slice(CRLF);
            }
            Reply::Array(None) => buf.put_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }
}

/// Decodes one reply from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete reply, and
/// `Ok(Some((reply, consumed)))` otherwise. Nothing is consumed on `None`;
/// the caller reads more bytes and tries again.
///
/// Each call starts from the first byte. Callers that grow one buffer across
/// many reads should keep a [`ReplyDecoder`] instead.
pub fn decode(buf: &[u8]) -> ClientResult<Option<(Reply, usize)>> {
    ReplyDecoder::new().decode(buf)
}

// =============================================================================
// Incremental decoder
// =============================================================================

/// Resumable reply decoder.
///
/// The frame at the front of the buffer is first measured element by element
/// without allocating; progress is kept between calls, so bytes already
/// measured are not walked again when more arrive. Once the whole frame is
/// buffered it is materialized in a single pass.
///
/// ```text
///   *3\r\n $1\r\na\r\n $1\r\nb\r\n $1\r\n|c\r\n
///   └────────── scanned ──────────┘ └ waiting for more bytes
///   pending = [1]   (elements still owed by the open array)
/// ```
///
/// The decoder assumes the caller only appends to the buffer between calls
/// until a reply is returned, and then drops the consumed prefix.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    /// Bytes of the current frame already measured.
    scanned: usize,
    /// Elements still owed by each open array, innermost last.
    pending: Vec<usize>,
    /// Whether the frame's first header has been measured.
    started: bool,
    /// Element headers measured since creation.
    headers_read: u64,
}

impl ReplyDecoder {
    /// Creates a decoder positioned at the start of a frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one reply from the front of `buf`, resuming any partial
    /// measurement from earlier calls. Same contract as [`decode`].
    pub fn decode(&mut self, buf: &[u8]) -> ClientResult<Option<(Reply, usize)>> {
        match self.measure(buf) {
            Ok(Some(frame_len)) => {
                self.reset();
                match parse(&buf[..frame_len], 0)? {
                    Some((reply, used)) if used == frame_len => Ok(Some((reply, used))),
                    _ => Err(ClientError::protocol("reply frame length mismatch")),
                }
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Returns how many element headers have been measured. Each header is
    /// measured once, plus at most once more per call that found it
    /// incomplete.
    pub fn headers_read(&self) -> u64 {
        self.headers_read
    }

    /// Forgets any partial frame.
    pub fn reset(&mut self) {
        self.scanned = 0;
        self.pending.clear();
        self.started = false;
    }

    /// Advances the measurement; returns the frame length once complete.
    fn measure(&mut self, buf: &[u8]) -> ClientResult<Option<usize>> {
        loop {
            if self.started && self.pending.is_empty() {
                return Ok(Some(self.scanned));
            }

            let pos = self.scanned;
            let Some(&tag) = buf.get(pos) else {
                return Ok(None);
            };
            self.headers_read += 1;
            let Some((line, next)) = read_line(buf, pos + 1)? else {
                return Ok(None);
            };

            let end = match tag {
                b'+' | b'-' => next,
                b':' => {
                    parse_int(line)?;
                    next
                }
                b'$' => match parse_len(line, MAX_BULK_LEN)? {
                    None => next,
                    Some(len) => {
                        let end = next + len;
                        if buf.len() < end + CRLF.len() {
                            return Ok(None);
                        }
                        if &buf[end..end + CRLF.len()] != CRLF {
                            return Err(ClientError::protocol(
                                "bulk string not terminated by CRLF",
                            ));
                        }
                        end + CRLF.len()
                    }
                },
                b'*' => match parse_len(line, MAX_ARRAY_LEN)? {
                    Some(count) if count > 0 => {
                        self.started = true;
                        self.scanned = next;
                        self.pending.push(count);
                        continue;
                    }
                    _ => next,
                },
                other => {
                    return Err(ClientError::protocol(format!(
                        "unknown reply type byte 0x{other:02x}"
                    )))
                }
            };

            self.started = true;
            self.scanned = end;
            // A finished element may finish its enclosing arrays.
            while let Some(owed) = self.pending.last_mut() {
                *owed -= 1;
                if *owed > 0 {
                    break;
                }
                self.pending.pop();
            }
        }
    }
}

fn parse(buf: &[u8], pos: usize) -> ClientResult<Option<(Reply, usize)>> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1)? else {
        return Ok(None);
    };

    match tag {
        b'+' => Ok(Some((Reply::Status(lossy(line)), next))),
        b'-' => Ok(Some((Reply::Error(lossy(line)), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(line)?), next))),
        b'$' => {
            let Some(len) = parse_len(line, MAX_BULK_LEN)? else {
                return Ok(Some((Reply::Bulk(None), next)));
            };
            let end = next + len;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(ClientError::protocol("bulk string not terminated by CRLF"));
            }
            let payload = Bytes::copy_from_slice(&buf[next..end]);
            Ok(Some((Reply::Bulk(Some(payload)), end + CRLF.len())))
        }
        b'*' => {
            let Some(count) = parse_len(line, MAX_ARRAY_LEN)? else {
                return Ok(Some((Reply::Array(None), next)));
            };
            let mut items = Vec::with_capacity(count.min(1024));
            let mut cursor = next;
            for _ in 0..count {
                match parse(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), cursor)))
        }
        other => Err(ClientError::protocol(format!(
            "unknown reply type byte 0x{other:02x}"
        ))),
    }
}

fn read_line(buf: &[u8], start: usize) -> ClientResult<Option<(&[u8], usize)>> {
    let window = buf.get(start..).unwrap_or_default();
    match window.windows(CRLF.len()).position(|w| w == CRLF) {
        Some(i) => Ok(Some((&window[..i], start + i + CRLF.len()))),
        None if window.len() > MAX_LINE_LEN => {
            Err(ClientError::protocol("header line exceeds maximum length"))
        }
        None => Ok(None),
    }
}

fn parse_int(line: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ClientError::protocol(format!("invalid integer '{}'", lossy(line))))
}

/// Parses a length header; `-1` is nil.
fn parse_len(line: &[u8], max: usize) -> ClientResult<Option<usize>> {
    let len = parse_int(line)?;
    if len == -1 {
        return Ok(None);
    }
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(Some(len)),
        _ => Err(ClientError::protocol(format!("length {len} out of range"))),
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use bytes::Buf;

    use super::*;

    fn decode_all(input: &[u8]) -> Reply {
        let (reply, used) = decode(input).unwrap().expect("complete reply");
        assert_eq!(used, input.len());
        reply
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_all(b"+OK\r\n"), Reply::ok());
        assert_eq!(
            decode_all(b"-ERR unknown command\r\n"),
            Reply::error("ERR unknown command")
        );
        assert_eq!(decode_all(b":-42\r\n"), Reply::Integer(-42));
        assert_eq!(decode_all(b"$-1\r\n"), Reply::Bulk(None));
        assert_eq!(decode_all(b"*-1\r\n"), Reply::Array(None));
        assert_eq!(
            decode_all(b"$0\r\n\r\n"),
            Reply::Bulk(Some(Bytes::new()))
        );
    }

    #[test]
    fn test_decode_keys_array() {
        let reply = decode_all(b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
        assert_eq!(
            reply.into_bulk_array().unwrap(),
            vec![Bytes::from("a"), Bytes::from("b")]
        );
    }

    #[test]
    fn test_decode_incomplete() {
        let full = b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n";
        for cut in 0..full.len() {
            assert!(
                decode(&full[..cut]).unwrap().is_none(),
                "prefix of {cut} bytes decoded early"
            );
        }
        assert!(decode(full).unwrap().is_some());
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let (reply, used) = decode(b"+PONG\r\n+OK\r\n").unwrap().unwrap();
        assert_eq!(reply, Reply::Status("PONG".to_string()));
        assert_eq!(used, 7);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode(b"?what\r\n").is_err());
        assert!(decode(b":12x\r\n").is_err());
        assert!(decode(b"$3\r\nabcXY").is_err());
        assert!(decode(b"$-5\r\n").is_err());
    }

    #[test]
    fn test_encode_matches_decode() {
        let reply = Reply::Array(Some(vec![
            Reply::ok(),
            Reply::Integer(7),
            Reply::Bulk(None),
            Reply::Bulk(Some(Bytes::from_static(b"bin\r\nary"))),
            Reply::Array(Some(vec![])),
        ]));
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(decode_all(&buf), reply);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(
            Reply::Bulk(Some(Bytes::from("v"))).into_bulk().unwrap(),
            Some(Bytes::from("v"))
        );
        assert!(Reply::Integer(1).into_bulk().is_err());
        assert!(Reply::Array(None).into_bulk_array().unwrap().is_empty());
        assert!(Reply::Array(Some(vec![Reply::Integer(1)]))
            .into_bulk_array()
            .is_err());
        assert_eq!(Reply::ok().expect_status().unwrap(), "OK");
    }

    #[test]
    fn test_decoder_measures_each_header_once() {
        let count = 20_000;
        let reply = Reply::Array(Some(
            (0..count)
                .map(|i| Reply::Bulk(Some(Bytes::from(format!("key:{i:05}")))))
                .collect(),
        ));
        let mut wire = BytesMut::new();
        reply.encode(&mut wire);

        let mut decoder = ReplyDecoder::new();
        let mut received = BytesMut::new();
        let mut calls = 0u64;
        let mut decoded = None;
        for chunk in wire.chunks(7) {
            received.extend_from_slice(chunk);
            calls += 1;
            if let Some((reply, used)) = decoder.decode(&received).unwrap() {
                assert_eq!(used, wire.len());
                decoded = Some(reply);
            }
        }

        assert_eq!(decoded, Some(reply));
        // One array header, one per element, and one retry per short read.
        assert!(
            decoder.headers_read() <= 1 + count as u64 + calls,
            "{} headers measured for {} elements over {} reads",
            decoder.headers_read(),
            count,
            calls
        );
    }

    #[test]
    fn test_decoder_resets_after_each_reply() {
        let mut decoder = ReplyDecoder::new();
        let mut buf = BytesMut::from(&b"*2\r\n$1\r\na\r\n"[..]);
        assert!(decoder.decode(&buf).unwrap().is_none());

        buf.extend_from_slice(b"$1\r\nb\r\n+OK\r\n");
        let (first, used) = decoder.decode(&buf).unwrap().unwrap();
        assert_eq!(
            first,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(Bytes::from("a"))),
                Reply::Bulk(Some(Bytes::from("b"))),
            ]))
        );
        buf.advance(used);

        assert_eq!(decoder.decode(&buf).unwrap(), Some((Reply::ok(), 5)));
    }

    #[test]
    fn test_decoder_nested_and_empty_arrays() {
        let mut decoder = ReplyDecoder::new();
        let wire = b"*3\r\n*0\r\n*2\r\n:1\r\n$-1\r\n*-1\r\n";
        for cut in 0..wire.len() {
            assert!(decoder.decode(&wire[..cut]).unwrap().is_none());
        }
        let (reply, used) = decoder.decode(wire).unwrap().unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Array(Some(vec![])),
                Reply::Array(Some(vec![Reply::Integer(1), Reply::Bulk(None)])),
                Reply::Array(None),
            ]))
        );
    }

    #[test]
    fn test_decode_random_binary_values_in_chunks() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let items: Vec<Reply> = (0..rng.gen_range(0..8))
                .map(|_| {
                    let len = rng.gen_range(0..64);
                    let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                    Reply::Bulk(Some(Bytes::from(value)))
                })
                .collect();
            let reply = Reply::Array(Some(items));

            let mut wire = BytesMut::new();
            reply.encode(&mut wire);

            // Feed the stream in random chunks, as a socket would.
            let mut received = Vec::new();
            let mut offset = 0;
            let decoded = loop {
                let step = rng.gen_range(1..=16).min(wire.len() - offset);
                received.extend_from_slice(&wire[offset..offset + step]);
                offset += step;
                if let Some((decoded, used)) = decode(&received).unwrap() {
                    assert_eq!(used, wire.len());
                    break decoded;
                }
                assert!(offset < wire.len(), "complete frame not decoded");
            };
            assert_eq!(decoded, reply);
        }
    }
}
