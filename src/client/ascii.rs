//! Line protocol client
//!
//! Every command over one persistent text-mode connection. Misses,
//! not-stored and stale CAS come back as [`Outcome`] values; only framing,
//! protocol violations and unmapped error lines are `Err`.

use std::collections::HashMap;

use bytes::Bytes;

use super::{ConnState, Counters, Session};
use crate::config::{ClientConfig, ProbeWindows};
use crate::error::{McError, Result};
use crate::network::{Connection, Transport};
use crate::protocol::ascii::{decode_line_response, encode_line_command, read_reply_line, trim_line};
use crate::protocol::{
    ArithOp, ByteSource, Command, GetResult, LineReply, Outcome, ResponseRecord, StoreMode,
    StoreOptions,
};

/// Line protocol client owning one transport
pub struct AsciiClient<T: Transport = Connection> {
    session: Session<T>,
}

impl AsciiClient<Connection> {
    /// Open a connection to the configured endpoint
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Connection::open(config)?, config.probes()))
    }
}

impl<T: Transport> AsciiClient<T> {
    /// Wrap an already connected transport
    pub fn new(transport: T, probes: ProbeWindows) -> Self {
        Self {
            session: Session::new(transport, probes),
        }
    }

    pub fn state(&self) -> ConnState {
        self.session.state()
    }

    pub fn counters(&self) -> Counters {
        self.session.counters
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.session.transport()
    }

    pub fn into_inner(self) -> T {
        self.session.into_transport()
    }

    /// Drop the stream and open a new one to the same peer
    pub fn reconnect(&mut self) -> Result<()> {
        self.session.reconnect()
    }

    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    pub fn get(&mut self, key: &str) -> Result<Option<ResponseRecord>> {
        self.single(Command::Get { keys: vec![key.to_string()] }, false)
    }

    /// Multi-get; every requested key is present in the result, `None` on a miss
    pub fn get_multi(&mut self, keys: &[&str]) -> Result<GetResult> {
        self.retrieve(Command::Get { keys: owned(keys) }, false)
    }

    pub fn gets(&mut self, key: &str) -> Result<Option<ResponseRecord>> {
        self.single(Command::Gets { keys: vec![key.to_string()] }, true)
    }

    pub fn gets_multi(&mut self, keys: &[&str]) -> Result<GetResult> {
        self.retrieve(Command::Gets { keys: owned(keys) }, true)
    }

    /// A record with `lease_token` set means a lease was granted instead of a value
    pub fn lease_get(&mut self, key: &str) -> Result<Option<ResponseRecord>> {
        self.single(Command::LeaseGet { keys: vec![key.to_string()] }, false)
    }

    pub fn lease_get_multi(&mut self, keys: &[&str]) -> Result<GetResult> {
        self.retrieve(Command::LeaseGet { keys: owned(keys) }, false)
    }

    /// Routing metadata for `key`, empty if the server has none
    pub fn metaget(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let request = encode_line_command(&Command::Metaget { key: key.to_string() })?;
        self.session.exchange(&request, |t| {
            let mut meta = HashMap::new();
            loop {
                match decode_line_response(t)? {
                    LineReply::End => return Ok(meta),
                    LineReply::Meta(pairs) => meta.extend(pairs),
                    reply if reply.is_error() => {
                        return Err(McError::ErrorReply(error_text(&reply)))
                    }
                    other => {
                        return Err(McError::Protocol(format!(
                            "unexpected reply {:?} to metaget",
                            other
                        )))
                    }
                }
            }
        })
    }

    fn single(&mut self, command: Command, expect_cas: bool) -> Result<Option<ResponseRecord>> {
        let key = command.keys()[0].to_string();
        let mut result = self.retrieve(command, expect_cas)?;
        Ok(result.remove(&key).flatten())
    }

    fn retrieve(&mut self, command: Command, expect_cas: bool) -> Result<GetResult> {
        let request = encode_line_command(&command)?;
        let keys = command.keys();
        self.session
            .exchange(&request, |t| read_values(t, &keys, expect_cas))
    }

    // =========================================================================
    // Storage
    // =========================================================================

    pub fn set(&mut self, key: &str, value: impl AsRef<[u8]>, options: StoreOptions) -> Result<Outcome> {
        self.store(StoreMode::Set, key, value.as_ref(), options)
    }

    pub fn add(&mut self, key: &str, value: impl AsRef<[u8]>, options: StoreOptions) -> Result<Outcome> {
        self.store(StoreMode::Add, key, value.as_ref(), options)
    }

    pub fn replace(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: StoreOptions,
    ) -> Result<Outcome> {
        self.store(StoreMode::Replace, key, value.as_ref(), options)
    }

    /// Stored / not-stored / server-error / client-error
    pub fn append(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: StoreOptions,
    ) -> Result<Outcome> {
        self.store(StoreMode::Append, key, value.as_ref(), options)
    }

    pub fn prepend(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: StoreOptions,
    ) -> Result<Outcome> {
        self.store(StoreMode::Prepend, key, value.as_ref(), options)
    }

    fn store(&mut self, mode: StoreMode, key: &str, value: &[u8], options: StoreOptions) -> Result<Outcome> {
        let command = Command::Store {
            mode,
            key: key.to_string(),
            value: Bytes::copy_from_slice(value),
            options,
        };
        match mode {
            StoreMode::Append | StoreMode::Prepend => self.write(&command, false, |o| {
                matches!(
                    o,
                    Outcome::Stored
                        | Outcome::NotStored
                        | Outcome::ServerError(_)
                        | Outcome::ClientError(_)
                )
            }),
            StoreMode::Set | StoreMode::Add | StoreMode::Replace => self.write(&command, true, |o| {
                matches!(
                    o,
                    Outcome::Stored | Outcome::NotStored | Outcome::Exists | Outcome::NotFound
                ) || o.is_error()
            }),
        }
    }

    /// `Stored` if the token was current, `Exists` if stale, `NotFound` if the key is gone
    pub fn cas(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        cas_token: u64,
        options: StoreOptions,
    ) -> Result<Outcome> {
        let command = Command::Cas {
            key: key.to_string(),
            value: Bytes::copy_from_slice(value.as_ref()),
            cas: cas_token,
            options,
        };
        self.write(&command, true, |o| {
            matches!(o, Outcome::Stored | Outcome::Exists | Outcome::NotFound) || o.is_error()
        })
    }

    /// Store under the token a `lease_get` handed out
    pub fn lease_set(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        token: u64,
        exptime: i64,
    ) -> Result<Outcome> {
        let command = Command::LeaseSet {
            key: key.to_string(),
            value: Bytes::copy_from_slice(value.as_ref()),
            token,
            options: StoreOptions::default().with_exptime(exptime),
        };
        self.write(&command, true, |o| {
            matches!(o, Outcome::Stored | Outcome::StaleStored | Outcome::NotStored)
                || o.is_error()
        })
    }

    // =========================================================================
    // Deletion, Expiry, Counters
    // =========================================================================

    /// Deleted / not-found / server-error; anything else is a protocol error
    pub fn delete(&mut self, key: &str, exptime: Option<i64>, noreply: bool) -> Result<Outcome> {
        self.session.counters.deletes += 1;
        let command = Command::Delete {
            key: key.to_string(),
            exptime,
            noreply,
        };
        self.write(&command, false, |o| {
            matches!(o, Outcome::Deleted | Outcome::NotFound | Outcome::ServerError(_))
        })
    }

    /// Touched / not-found / server-error / client-error
    pub fn touch(&mut self, key: &str, exptime: i64, noreply: bool) -> Result<Outcome> {
        let command = Command::Touch {
            key: key.to_string(),
            exptime,
            noreply,
        };
        self.write(&command, false, |o| {
            matches!(
                o,
                Outcome::Touched | Outcome::NotFound | Outcome::ServerError(_) | Outcome::ClientError(_)
            )
        })
    }

    /// New value, or `None` on a miss (and for a silent `noreply`)
    pub fn incr(&mut self, key: &str, delta: u64, noreply: bool) -> Result<Option<u64>> {
        self.arith(ArithOp::Incr, key, delta, noreply)
    }

    pub fn decr(&mut self, key: &str, delta: u64, noreply: bool) -> Result<Option<u64>> {
        self.arith(ArithOp::Decr, key, delta, noreply)
    }

    fn arith(&mut self, op: ArithOp, key: &str, delta: u64, noreply: bool) -> Result<Option<u64>> {
        let command = Command::Arith {
            op,
            key: key.to_string(),
            delta,
            noreply,
        };
        let request = encode_line_command(&command)?;
        if noreply {
            self.session.exchange_silent(&request)?;
            return Ok(None);
        }

        self.session.exchange(&request, |t| match decode_line_response(t)? {
            LineReply::Numeric(value) => Ok(Some(value)),
            LineReply::NotFound => Ok(None),
            reply if reply.is_error() => Err(McError::ErrorReply(error_text(&reply))),
            other => Err(McError::Protocol(format!(
                "unexpected reply {:?} to {}",
                other,
                op.as_str()
            ))),
        })
    }

    // =========================================================================
    // Statistics and Administration
    // =========================================================================

    /// `None` if the server stays silent through the stats window or closes
    pub fn stats(&mut self, group: Option<&str>) -> Result<Option<HashMap<String, String>>> {
        let request = encode_line_command(&Command::Stats {
            group: group.map(str::to_string),
        })?;
        let window = self.session.probes.stats;
        self.session.exchange(&request, |t| {
            if t.probe_no_data_within(window)? {
                return Ok(None);
            }

            let mut stats = HashMap::new();
            loop {
                let raw = t.read_line()?;
                if raw.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(trim_line(&raw)).into_owned();
                if line.trim() == "END" {
                    return Ok(Some(stats));
                }
                if let [_, name, value] = split_fields(&line, 2).as_slice() {
                    stats.insert(name.to_string(), value.to_string());
                }
            }
        })
    }

    /// Everything after the first word of each stats line
    pub fn raw_stats(&mut self, group: Option<&str>) -> Result<Option<Vec<String>>> {
        let request = encode_line_command(&Command::Stats {
            group: group.map(str::to_string),
        })?;
        let window = self.session.probes.raw;
        self.session.exchange(&request, |t| {
            if t.probe_no_data_within(window)? {
                return Ok(None);
            }

            let mut lines = Vec::new();
            loop {
                let line = read_reply_line(t)?;
                if line.trim() == "END" {
                    return Ok(Some(lines));
                }
                if let [_, rest] = split_fields(&line, 1).as_slice() {
                    lines.push(rest.to_string());
                }
            }
        })
    }

    pub fn version(&mut self) -> Result<String> {
        let request = encode_line_command(&Command::Version)?;
        self.session.exchange(&request, |t| match decode_line_response(t)? {
            LineReply::Version(version) => Ok(version),
            reply if reply.is_error() => Err(McError::ErrorReply(error_text(&reply))),
            other => Err(McError::Protocol(format!(
                "unexpected reply {:?} to version",
                other
            ))),
        })
    }

    /// Returns whatever line the server sends before going away
    pub fn shutdown(&mut self) -> Result<String> {
        let request = encode_line_command(&Command::Shutdown)?;
        self.session.exchange(&request, |t| {
            let raw = t.read_line()?;
            Ok(String::from_utf8_lossy(trim_line(&raw)).into_owned())
        })
    }

    pub fn flush_all(&mut self, delay: Option<u32>) -> Result<Outcome> {
        self.write(&Command::FlushAll { delay }, false, |o| {
            matches!(o, Outcome::Ok) || o.is_error()
        })
    }

    // =========================================================================
    // Raw Commands
    // =========================================================================

    /// Write raw command text and return the first reply line, terminator included
    ///
    /// An empty string means the server closed the connection.
    pub fn issue_command(&mut self, command: impl AsRef<[u8]>) -> Result<String> {
        self.session.counters.others += 1;
        self.session.exchange(command.as_ref(), |t| {
            let raw = t.read_line()?;
            Ok(String::from_utf8_lossy(&raw).into_owned())
        })
    }

    /// Write raw command text and collect lines through `END`
    ///
    /// `None` if nothing arrives within the raw probe window. An error line
    /// before any data reconnects and is returned as [`McError::ErrorReply`].
    pub fn issue_command_and_read_all(&mut self, command: impl AsRef<[u8]>) -> Result<Option<String>> {
        self.session.counters.others += 1;
        let window = self.session.probes.raw;
        let read = self.session.exchange(command.as_ref(), |t| {
            if t.probe_no_data_within(window)? {
                return Ok(ReadAll::Silent);
            }

            let mut answer = String::new();
            loop {
                let line = read_reply_line(t)?;
                if answer.is_empty() && line.contains("ERROR") {
                    return Ok(ReadAll::ErrorFirst(line));
                }
                answer.push_str(&line);
                answer.push_str("\r\n");
                if line == "END" {
                    return Ok(ReadAll::Lines(answer));
                }
            }
        })?;

        match read {
            ReadAll::Silent => Ok(None),
            ReadAll::Lines(answer) => Ok(Some(answer)),
            ReadAll::ErrorFirst(line) => {
                self.session.reconnect()?;
                Err(McError::ErrorReply(line))
            }
        }
    }

    // =========================================================================
    // Shared Write Path
    // =========================================================================

    /// Encode, send, and map the single status line through `legal`
    ///
    /// With `reconnect_on_error`, an error outcome reopens the connection
    /// before it is returned.
    fn write(
        &mut self,
        command: &Command,
        reconnect_on_error: bool,
        legal: impl Fn(&Outcome) -> bool,
    ) -> Result<Outcome> {
        let request = encode_line_command(command)?;
        if command.is_noreply() {
            self.session.exchange_silent(&request)?;
            return Ok(Outcome::NoReply);
        }

        let name = command.name();
        let outcome = self.session.exchange(&request, |t| {
            let reply = decode_line_response(t)?;
            match reply.to_outcome() {
                Some(outcome) if legal(&outcome) => Ok(outcome),
                _ => Err(McError::Protocol(format!(
                    "unexpected reply {:?} to {}",
                    reply, name
                ))),
            }
        })?;

        if reconnect_on_error && outcome.is_error() {
            tracing::debug!("Reconnecting after {:?} reply to {}", outcome, name);
            self.session.reconnect()?;
        }
        Ok(outcome)
    }
}

enum ReadAll {
    Silent,
    Lines(String),
    ErrorFirst(String),
}

/// Accumulate `VALUE`/`LVALUE` records until `END`
fn read_values<S: ByteSource + ?Sized>(
    source: &mut S,
    keys: &[&str],
    expect_cas: bool,
) -> Result<GetResult> {
    let mut result: GetResult = keys.iter().map(|k| (k.to_string(), None)).collect();
    let mut had_value = false;

    loop {
        match decode_line_response(source)? {
            LineReply::End => return Ok(result),
            LineReply::Value(record) => {
                if expect_cas && record.cas.is_none() {
                    return Err(McError::Framing(format!(
                        "gets reply for {:?} carries no CAS token",
                        record.key
                    )));
                }
                match result.get_mut(&record.key) {
                    Some(slot) => *slot = Some(record),
                    None => {
                        return Err(McError::Protocol(format!(
                            "reply for unrequested key {:?}",
                            record.key
                        )))
                    }
                }
                had_value = true;
            }
            LineReply::ServerError(msg) if had_value => {
                return Err(McError::Protocol(format!(
                    "hit reply followed by SERVER_ERROR {} in multiget",
                    msg
                )))
            }
            LineReply::ServerError(msg) => {
                return Err(McError::ErrorReply(format!("SERVER_ERROR {}", msg)))
            }
            other => {
                return Err(McError::Protocol(format!(
                    "unexpected reply {:?} for keys {:?}",
                    other, keys
                )))
            }
        }
    }
}

/// The reply line as the server sent it
fn error_text(reply: &LineReply) -> String {
    match reply {
        LineReply::ClientError(msg) => format!("CLIENT_ERROR {}", msg),
        LineReply::ServerError(msg) => format!("SERVER_ERROR {}", msg),
        _ => "ERROR".to_string(),
    }
}

/// Whitespace split with at most `max_splits` splits; the rest stays whole
fn split_fields(line: &str, max_splits: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if fields.len() == max_splits {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                fields.push(&rest[..i]);
                rest = rest[i..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
