//! Binary protocol codec
//!
//! ## Header (24 bytes, big-endian)
//! ```text
//!  0 ┌───────────┬───────────┬───────────────────────┐
//!    │ Magic (1) │ Opcode(1) │ Key length (2)        │
//!  4 ├───────────┼───────────┼───────────────────────┤
//!    │ Extras(1) │ Type (1)  │ vbucket / status (2)  │
//!  8 ├───────────┴───────────┴───────────────────────┤
//!    │ Total body length (4)                         │
//! 12 ├───────────────────────────────────────────────┤
//!    │ Opaque (4)                                    │
//! 16 ├───────────────────────────────────────────────┤
//!    │ CAS (8)                                       │
//! 24 └───────────────────────────────────────────────┘
//! ```
//! Body: extras, then key, then value.

use bytes::{BufMut, Bytes, BytesMut};

use super::ByteSource;
use crate::error::{McError, Result};

/// Magic byte for request frames
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte for response frames
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Fixed header size
pub const HEADER_SIZE: usize = 24;

/// Extras of set/add/replace/cas: flags (4) + expiry (4)
pub const STORE_EXTRAS_SIZE: usize = 8;

/// Extras of incr/decr: delta (8) + initial (8) + expiry (4)
pub const ARITH_EXTRAS_SIZE: usize = 20;

/// Expiry that tells incr/decr not to create a missing key
pub const ARITH_NO_CREATE: u32 = 0xFFFF_FFFF;

// =============================================================================
// Opcodes
// =============================================================================

/// Binary protocol opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    GetK = 0x0C,
    GetKQ = 0x0D,
    Append = 0x0E,
    Prepend = 0x0F,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1A,
    Touch = 0x1C,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let opcode = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0A => Opcode::Noop,
            0x0B => Opcode::Version,
            0x0C => Opcode::GetK,
            0x0D => Opcode::GetKQ,
            0x0E => Opcode::Append,
            0x0F => Opcode::Prepend,
            0x10 => Opcode::Stat,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x14 => Opcode::DeleteQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x17 => Opcode::QuitQ,
            0x18 => Opcode::FlushQ,
            0x19 => Opcode::AppendQ,
            0x1A => Opcode::PrependQ,
            0x1C => Opcode::Touch,
            _ => return None,
        };
        Some(opcode)
    }

    /// Quiet opcodes only reply on error (and, for gets, on a hit)
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            Opcode::GetQ
                | Opcode::GetKQ
                | Opcode::SetQ
                | Opcode::AddQ
                | Opcode::ReplaceQ
                | Opcode::DeleteQ
                | Opcode::IncrementQ
                | Opcode::DecrementQ
                | Opcode::QuitQ
                | Opcode::FlushQ
                | Opcode::AppendQ
                | Opcode::PrependQ
        )
    }

    /// Quiet variant, or `None` if the opcode has none
    pub fn quiet(&self) -> Option<Opcode> {
        let quiet = match self {
            Opcode::Get => Opcode::GetQ,
            Opcode::GetK => Opcode::GetKQ,
            Opcode::Set => Opcode::SetQ,
            Opcode::Add => Opcode::AddQ,
            Opcode::Replace => Opcode::ReplaceQ,
            Opcode::Delete => Opcode::DeleteQ,
            Opcode::Increment => Opcode::IncrementQ,
            Opcode::Decrement => Opcode::DecrementQ,
            Opcode::Quit => Opcode::QuitQ,
            Opcode::Flush => Opcode::FlushQ,
            Opcode::Append => Opcode::AppendQ,
            Opcode::Prepend => Opcode::PrependQ,
            other if other.is_quiet() => *other,
            _ => return None,
        };
        Some(quiet)
    }
}

// =============================================================================
// Status Codes
// =============================================================================

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumericValue = 0x0006,
    WrongVbucket = 0x0007,
    AuthError = 0x0008,
    AuthContinue = 0x0009,
    AuthRequired = 0x0020,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TempFailure = 0x0086,
}

impl Status {
    pub fn from_u16(value: u16) -> Option<Self> {
        let status = match value {
            0x0000 => Status::NoError,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::NonNumericValue,
            0x0007 => Status::WrongVbucket,
            0x0008 => Status::AuthError,
            0x0009 => Status::AuthContinue,
            0x0020 => Status::AuthRequired,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TempFailure,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(&self) -> u16 {
        *self as u16
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NoError => "No error",
            Status::KeyNotFound => "Key not found",
            Status::KeyExists => "Key exists",
            Status::ValueTooLarge => "Value too large",
            Status::InvalidArguments => "Invalid arguments",
            Status::ItemNotStored => "Item not stored",
            Status::NonNumericValue => "Incr/decr on a non-numeric value",
            Status::WrongVbucket => "The vbucket belongs to another server",
            Status::AuthError => "Authentication error",
            Status::AuthContinue => "Authentication continue",
            Status::AuthRequired => "Authentication required",
            Status::UnknownCommand => "Unknown command",
            Status::OutOfMemory => "Out of memory",
            Status::NotSupported => "Not supported",
            Status::InternalError => "Internal error",
            Status::Busy => "Busy",
            Status::TempFailure => "Temporary failure",
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// The fixed 24-byte header, shared by requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    /// vbucket id in requests, status in responses
    pub status_or_vbucket: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    /// Parse a header of either direction
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(McError::closed_mid_frame(HEADER_SIZE, data.len()));
        }
        if data[0] != REQUEST_MAGIC && data[0] != RESPONSE_MAGIC {
            return Err(McError::Framing(format!("invalid magic byte: 0x{:02x}", data[0])));
        }
        let opcode = Opcode::from_u8(data[1])
            .ok_or_else(|| McError::Framing(format!("unknown opcode: 0x{:02x}", data[1])))?;

        let header = Self {
            magic: data[0],
            opcode,
            key_length: u16::from_be_bytes([data[2], data[3]]),
            extras_length: data[4],
            data_type: data[5],
            status_or_vbucket: u16::from_be_bytes([data[6], data[7]]),
            total_body_length: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            opaque: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            cas: u64::from_be_bytes([
                data[16], data[17], data[18], data[19], data[20], data[21], data[22], data[23],
            ]),
        };
        header.value_length()?;
        Ok(header)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.magic);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extras_length);
        buf.put_u8(self.data_type);
        buf.put_u16(self.status_or_vbucket);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// total body length - extras - key; a negative remainder is a framing error
    pub fn value_length(&self) -> Result<usize> {
        let fixed = self.extras_length as usize + self.key_length as usize;
        (self.total_body_length as usize)
            .checked_sub(fixed)
            .ok_or_else(|| {
                McError::Framing(format!(
                    "body length {} shorter than extras {} + key {}",
                    self.total_body_length, self.extras_length, self.key_length
                ))
            })
    }

    /// Response status; codes outside the closed set are surfaced
    pub fn status(&self) -> Result<Status> {
        Status::from_u16(self.status_or_vbucket)
            .ok_or(McError::UnknownStatus(self.status_or_vbucket))
    }

    pub fn is_response(&self) -> bool {
        self.magic == RESPONSE_MAGIC
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Pack a request frame
pub fn encode_binary_frame(
    opcode: Opcode,
    key: &[u8],
    extras: &[u8],
    value: &[u8],
    opaque: u32,
    cas: u64,
) -> Result<Bytes> {
    let key_length = u16::try_from(key.len()).map_err(|_| {
        McError::InvalidArgument(format!("key of {} bytes does not fit the header", key.len()))
    })?;
    let extras_length = u8::try_from(extras.len()).map_err(|_| {
        McError::InvalidArgument(format!("{} bytes of extras do not fit the header", extras.len()))
    })?;
    let total_body_length = u32::try_from(extras.len() + key.len() + value.len())
        .map_err(|_| McError::InvalidArgument("frame body exceeds 4 GiB".to_string()))?;

    let header = Header {
        magic: REQUEST_MAGIC,
        opcode,
        key_length,
        extras_length,
        data_type: 0,
        status_or_vbucket: 0,
        total_body_length,
        opaque,
        cas,
    };

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body_length as usize);
    header.encode(&mut buf);
    buf.put_slice(extras);
    buf.put_slice(key);
    buf.put_slice(value);
    Ok(buf.freeze())
}

/// A request to be packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub opcode: Opcode,
    pub key: Bytes,
    pub extras: Bytes,
    pub value: Bytes,
    pub opaque: u32,
    pub cas: u64,
}

impl RequestFrame {
    /// Frame with an empty body (noop, version, flush without delay)
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            key: Bytes::new(),
            extras: Bytes::new(),
            value: Bytes::new(),
            opaque: 0,
            cas: 0,
        }
    }

    /// Frame carrying only a key (get, delete, stat group)
    pub fn keyed(opcode: Opcode, key: &str) -> Self {
        Self {
            key: Bytes::copy_from_slice(key.as_bytes()),
            ..Self::new(opcode)
        }
    }

    /// set/add/replace/cas: flags + expiry extras
    pub fn store(opcode: Opcode, key: &str, value: Bytes, flags: u32, exptime: u32) -> Self {
        let mut extras = BytesMut::with_capacity(STORE_EXTRAS_SIZE);
        extras.put_u32(flags);
        extras.put_u32(exptime);
        Self {
            extras: extras.freeze(),
            value,
            ..Self::keyed(opcode, key)
        }
    }

    /// append/prepend: no extras
    pub fn affix(opcode: Opcode, key: &str, value: Bytes) -> Self {
        Self {
            value,
            ..Self::keyed(opcode, key)
        }
    }

    /// incr/decr: delta + initial + expiry extras
    pub fn arith(opcode: Opcode, key: &str, delta: u64, initial: u64, exptime: u32) -> Self {
        let mut extras = BytesMut::with_capacity(ARITH_EXTRAS_SIZE);
        extras.put_u64(delta);
        extras.put_u64(initial);
        extras.put_u32(exptime);
        Self {
            extras: extras.freeze(),
            ..Self::keyed(opcode, key)
        }
    }

    /// touch: expiry extras
    pub fn touch(key: &str, exptime: u32) -> Self {
        Self {
            extras: Bytes::copy_from_slice(&exptime.to_be_bytes()),
            ..Self::keyed(Opcode::Touch, key)
        }
    }

    /// flush: optional delay extras
    pub fn flush(delay: Option<u32>) -> Self {
        let extras = delay
            .map(|d| Bytes::copy_from_slice(&d.to_be_bytes()))
            .unwrap_or_default();
        Self {
            extras,
            ..Self::new(Opcode::Flush)
        }
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Swap in the quiet opcode
    pub fn quiet(mut self) -> Result<Self> {
        self.opcode = self
            .opcode
            .quiet()
            .ok_or(McError::Unsupported("opcode has no quiet variant"))?;
        Ok(self)
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode_binary_frame(
            self.opcode,
            &self.key,
            &self.extras,
            &self.value,
            self.opaque,
            self.cas,
        )
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Frame {
    fn split(header: Header, body: Bytes) -> Result<Self> {
        let value_length = header.value_length()?;
        if body.len() != header.total_body_length as usize {
            return Err(McError::closed_mid_frame(
                header.total_body_length as usize,
                body.len(),
            ));
        }
        let extras_end = header.extras_length as usize;
        let key_end = extras_end + header.key_length as usize;
        let frame = Self {
            header,
            extras: body.slice(..extras_end),
            key: body.slice(extras_end..key_end),
            value: body.slice(key_end..),
        };
        debug_assert_eq!(frame.value.len(), value_length);
        Ok(frame)
    }

    /// Flags from 4-byte get extras, 0 when absent
    pub fn flags(&self) -> u32 {
        match self.extras.get(..4) {
            Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        }
    }

    pub fn key_str(&self) -> Result<String> {
        String::from_utf8(self.key.to_vec())
            .map_err(|_| McError::Framing("frame key is not valid UTF-8".to_string()))
    }
}

/// Decode one frame from a complete buffer
///
/// Returns the frame and the number of bytes consumed.
pub fn decode_binary_frame(bytes: &[u8]) -> Result<(Frame, usize)> {
    let header = Header::parse(bytes)?;
    let total = HEADER_SIZE + header.total_body_length as usize;
    if bytes.len() < total {
        return Err(McError::closed_mid_frame(total, bytes.len()));
    }
    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total]);
    Ok((Frame::split(header, body)?, total))
}

/// Read exactly one response frame
///
/// Blocks until the header and the declared body are in.
pub fn read_binary_frame<S: ByteSource + ?Sized>(source: &mut S) -> Result<Frame> {
    let raw = source.read_exact(HEADER_SIZE)?;
    let header = Header::parse(&raw)?;
    if !header.is_response() {
        return Err(McError::Framing(format!(
            "expected response magic 0x{:02x}, got 0x{:02x}",
            RESPONSE_MAGIC, header.magic
        )));
    }

    let body = if header.total_body_length > 0 {
        Bytes::from(source.read_exact(header.total_body_length as usize)?)
    } else {
        Bytes::new()
    };
    Frame::split(header, body)
}

/// Pack a response frame (for fake servers in tests and tools)
pub fn encode_response_frame(
    opcode: Opcode,
    status: Status,
    key: &[u8],
    extras: &[u8],
    value: &[u8],
    opaque: u32,
    cas: u64,
) -> Result<Bytes> {
    let request = encode_binary_frame(opcode, key, extras, value, opaque, cas)?;
    let mut buf = BytesMut::from(&request[..]);
    buf[0] = RESPONSE_MAGIC;
    buf[6..8].copy_from_slice(&status.code().to_be_bytes());
    Ok(buf.freeze())
}
