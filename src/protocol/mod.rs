//! Protocol Module
//!
//! Pure encode/decode for the two memcache wire formats. Nothing here opens
//! sockets; decoders pull bytes through [`ByteSource`].
//!
//! ## Line Protocol
//! ```text
//! set <key> <flags> <exptime> <bytes> [noreply]\r\n
//! <data>\r\n
//!
//! VALUE <key> <flags> <bytes> [<cas>]\r\n
//! <data>\r\n
//! END\r\n
//! ```
//!
//! ## Binary Protocol
//! ```text
//! ┌──────────────────────────┬────────┬─────┬─────────┐
//! │ Header (24, big-endian)  │ Extras │ Key │  Value  │
//! └──────────────────────────┴────────┴─────┴─────────┘
//! ```
//! total body length = extras + key + value

use std::io::{BufRead, Cursor, Read};

use crate::error::{McError, Result};

pub mod ascii;
pub mod binary;
mod command;
mod response;

pub use command::{ArithOp, Command, StoreMode, StoreOptions};
pub use response::{GetResult, LineReply, Outcome, ResponseRecord};

/// Byte-level read primitives both decoders are written against
pub trait ByteSource {
    /// Read one line including its terminator. An empty vector means EOF.
    fn read_line(&mut self) -> Result<Vec<u8>>;

    /// Read exactly `n` bytes. A short read is a framing error.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;
}

/// Shared implementation for anything buffered
pub(crate) fn read_line_from<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    Ok(line)
}

/// Shared implementation for anything readable
///
/// `n` comes off the wire, so the buffer grows with the bytes that actually
/// arrive instead of being sized up front.
pub(crate) fn read_exact_from<R: Read>(reader: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(n as u64).read_to_end(&mut buf)?;
    if buf.len() < n {
        return Err(McError::closed_mid_frame(n, buf.len()));
    }
    Ok(buf)
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn read_line(&mut self) -> Result<Vec<u8>> {
        read_line_from(self)
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        read_exact_from(self, n)
    }
}
