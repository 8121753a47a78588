//! Response definitions
//!
//! Decoded replies and the typed outcomes clients hand back to callers.

use std::collections::HashMap;

use bytes::Bytes;

/// One item returned by a read command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub key: String,
    pub flags: u32,

    /// Declared payload length; always equals `value.len()`
    pub len: usize,

    pub value: Bytes,

    /// Present for `gets` and binary reads
    pub cas: Option<u64>,

    /// Present when `lease-get` granted a lease instead of a value
    pub lease_token: Option<u64>,
}

impl ResponseRecord {
    pub fn new(key: impl Into<String>, flags: u32, value: Bytes) -> Self {
        Self {
            key: key.into(),
            flags,
            len: value.len(),
            value,
            cas: None,
            lease_token: None,
        }
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    pub fn with_lease_token(mut self, token: u64) -> Self {
        self.lease_token = Some(token);
        self
    }

    /// Value as UTF-8, lossy
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Multi-key read result: every requested key, `None` on a miss
pub type GetResult = HashMap<String, Option<ResponseRecord>>;

/// One logical line-protocol reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineReply {
    /// `VALUE` or `LVALUE` line plus its payload
    Value(ResponseRecord),

    /// `META <key> name: value; ...`
    Meta(Vec<(String, String)>),

    /// `STAT <name> <value>`
    Stat { name: String, value: String },

    End,
    Stored,
    NotStored,
    StaleStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    Error,
    ClientError(String),
    ServerError(String),
    Version(String),

    /// Result of incr/decr
    Numeric(u64),
}

impl LineReply {
    /// True for ERROR, CLIENT_ERROR and SERVER_ERROR
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            LineReply::Error | LineReply::ClientError(_) | LineReply::ServerError(_)
        )
    }

    /// Map a status line to an outcome; data-bearing replies have none
    pub fn to_outcome(&self) -> Option<Outcome> {
        let outcome = match self {
            LineReply::Stored => Outcome::Stored,
            LineReply::NotStored => Outcome::NotStored,
            LineReply::StaleStored => Outcome::StaleStored,
            LineReply::Exists => Outcome::Exists,
            LineReply::NotFound => Outcome::NotFound,
            LineReply::Deleted => Outcome::Deleted,
            LineReply::Touched => Outcome::Touched,
            LineReply::Ok => Outcome::Ok,
            LineReply::Error => Outcome::Error,
            LineReply::ClientError(msg) => Outcome::ClientError(msg.clone()),
            LineReply::ServerError(msg) => Outcome::ServerError(msg.clone()),
            _ => return None,
        };
        Some(outcome)
    }
}

/// Normal result of a line-protocol write command. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stored,
    NotStored,
    StaleStored,
    /// CAS token was stale
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// `noreply` was sent and the server stayed silent
    NoReply,
    Error,
    ClientError(String),
    ServerError(String),
}

impl Outcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Outcome::Stored)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Outcome::Error | Outcome::ClientError(_) | Outcome::ServerError(_)
        )
    }
}
