//! Command definitions
//!
//! Represents requests a client can issue, independent of encoding.

use bytes::Bytes;

/// Which storage command a `Store` carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Set => "set",
            StoreMode::Add => "add",
            StoreMode::Replace => "replace",
            StoreMode::Append => "append",
            StoreMode::Prepend => "prepend",
        }
    }
}

/// incr or decr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Incr,
    Decr,
}

impl ArithOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Incr => "incr",
            ArithOp::Decr => "decr",
        }
    }
}

/// Flags, expiry and reply mode for write commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub flags: u32,

    /// Relative seconds, absolute unix time, or negative for "already expired"
    pub exptime: i64,

    /// Ask the server not to answer
    pub noreply: bool,
}

impl StoreOptions {
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_exptime(mut self, exptime: i64) -> Self {
        self.exptime = exptime;
        self
    }

    pub fn noreply(mut self) -> Self {
        self.noreply = true;
        self
    }
}

/// A request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch one or more keys
    Get { keys: Vec<String> },

    /// Fetch one or more keys with their CAS tokens
    Gets { keys: Vec<String> },

    /// Fetch routing metadata for a key
    Metaget { key: String },

    /// Fetch, or be granted a lease token on a miss
    LeaseGet { keys: Vec<String> },

    /// Store under a previously granted lease token
    LeaseSet {
        key: String,
        value: Bytes,
        token: u64,
        options: StoreOptions,
    },

    /// set / add / replace / append / prepend
    Store {
        mode: StoreMode,
        key: String,
        value: Bytes,
        options: StoreOptions,
    },

    /// Store only if the CAS token is still current
    Cas {
        key: String,
        value: Bytes,
        cas: u64,
        options: StoreOptions,
    },

    Delete {
        key: String,
        exptime: Option<i64>,
        noreply: bool,
    },

    Touch {
        key: String,
        exptime: i64,
        noreply: bool,
    },

    Arith {
        op: ArithOp,
        key: String,
        delta: u64,
        noreply: bool,
    },

    /// `stats [group]`
    Stats { group: Option<String> },

    FlushAll { delay: Option<u32> },

    Version,

    Shutdown,

    /// Raw bytes written verbatim
    Raw(Bytes),
}

impl Command {
    /// Get the command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Gets { .. } => "gets",
            Command::Metaget { .. } => "metaget",
            Command::LeaseGet { .. } => "lease-get",
            Command::LeaseSet { .. } => "lease-set",
            Command::Store { mode, .. } => mode.as_str(),
            Command::Cas { .. } => "cas",
            Command::Delete { .. } => "delete",
            Command::Touch { .. } => "touch",
            Command::Arith { op, .. } => op.as_str(),
            Command::Stats { .. } => "stats",
            Command::FlushAll { .. } => "flush_all",
            Command::Version => "version",
            Command::Shutdown => "shutdown",
            Command::Raw(_) => "raw",
        }
    }

    /// True if the server was asked not to reply
    pub fn is_noreply(&self) -> bool {
        match self {
            Command::LeaseSet { options, .. }
            | Command::Store { options, .. }
            | Command::Cas { options, .. } => options.noreply,
            Command::Delete { noreply, .. }
            | Command::Touch { noreply, .. }
            | Command::Arith { noreply, .. } => *noreply,
            _ => false,
        }
    }

    /// Keys the command addresses, in request order
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Command::Get { keys } | Command::Gets { keys } | Command::LeaseGet { keys } => {
                keys.iter().map(String::as_str).collect()
            }
            Command::Metaget { key }
            | Command::LeaseSet { key, .. }
            | Command::Store { key, .. }
            | Command::Cas { key, .. }
            | Command::Delete { key, .. }
            | Command::Touch { key, .. }
            | Command::Arith { key, .. } => vec![key.as_str()],
            Command::Stats { .. }
            | Command::FlushAll { .. }
            | Command::Version
            | Command::Shutdown
            | Command::Raw(_) => Vec::new(),
        }
    }
}
