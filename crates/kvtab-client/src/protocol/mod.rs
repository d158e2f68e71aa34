//! Request/reply wire protocol.
//!
//! Every command is sent as an array of binary-safe bulk strings and answered
//! by exactly one reply. There is no pipelining: one request, one reply,
//! then the next request.
//!
//! # Frame Format
//!
//! ```text
//! request:   *<argc>\r\n  ( $<len>\r\n <bytes> \r\n ){argc}
//!
//! reply:     +<status>\r\n
//!            -<error>\r\n
//!            :<integer>\r\n
//!            $<len>\r\n <bytes> \r\n       ($-1\r\n is nil)
//!            *<count>\r\n <reply>{count}     (*-1\r\n is nil)
//! ```

mod command;
mod reply;

pub use command::Command;
pub use reply::{decode, Reply, ReplyDecoder};

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted from the peer (512 MiB).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array accepted from the peer.
pub const MAX_ARRAY_LEN: usize = i32::MAX as usize;

/// Longest header line accepted before a terminator must appear.
pub const MAX_LINE_LEN: usize = 64 * 1024;
