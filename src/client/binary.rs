//! Binary protocol client
//!
//! Same command surface as the line client, framed with the 24-byte header.
//! Status 0 is success, 1 a miss, 2 and 5 a conflict; every other status is
//! raised as [`McError::Status`].

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use super::{ConnState, Counters, Session};
use crate::config::{ClientConfig, ProbeWindows};
use crate::error::{McError, Result};
use crate::network::{Connection, Transport};
use crate::protocol::binary::{
    read_binary_frame, Frame, Opcode, RequestFrame, Status, ARITH_NO_CREATE,
};
use crate::protocol::{ByteSource, GetResult, ResponseRecord, StoreOptions};

/// Result of a binary write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOutcome {
    /// Status 0, with the item's new CAS
    Success { cas: u64 },
    /// Status 1
    Miss,
    /// Status 2 (exists) or 5 (not stored)
    Conflict(Status),
    /// Quiet opcode, nothing came back before the fence
    Quiet,
}

impl BinaryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BinaryOutcome::Success { .. } | BinaryOutcome::Quiet)
    }
}

/// Binary protocol client owning one transport
pub struct BinaryClient<T: Transport = Connection> {
    session: Session<T>,
    /// Opaque of the last request, echoed back by the server
    opaque: u32,
}

impl BinaryClient<Connection> {
    /// Open a connection to the configured endpoint
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Connection::open(config)?, config.probes()))
    }
}

impl<T: Transport> BinaryClient<T> {
    pub fn new(transport: T, probes: ProbeWindows) -> Self {
        Self {
            session: Session::new(transport, probes),
            opaque: 0,
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
        let reply = self.round_trip(RequestFrame::keyed(Opcode::Get, key))?;
        match outcome(&reply)? {
            BinaryOutcome::Success { cas } => Ok(Some(
                ResponseRecord::new(key, reply.flags(), reply.value.clone()).with_cas(cas),
            )),
            BinaryOutcome::Miss => Ok(None),
            _ => Err(status_error(&reply)),
        }
    }

    /// Binary replies always carry the CAS, so this is `get`
    pub fn gets(&mut self, key: &str) -> Result<Option<ResponseRecord>> {
        self.get(key)
    }

    /// One `GetKQ` per key fenced by a `Noop`; misses stay silent
    pub fn get_multi(&mut self, keys: &[&str]) -> Result<GetResult> {
        if keys.is_empty() {
            return Err(McError::InvalidArgument(
                "multiget needs at least one key".to_string(),
            ));
        }

        let mut request = BytesMut::new();
        for key in keys {
            let frame = RequestFrame::keyed(Opcode::GetKQ, key).with_opaque(self.next_opaque());
            request.put_slice(&frame.encode()?);
        }
        let fence = self.next_opaque();
        request.put_slice(&RequestFrame::new(Opcode::Noop).with_opaque(fence).encode()?);

        let mut result: GetResult = keys.iter().map(|k| (k.to_string(), None)).collect();
        let mut failure = None;
        self.session.exchange(&request, |t| loop {
            let frame = read_binary_frame(t)?;
            if frame.header.opcode == Opcode::Noop {
                check_reply(&frame, Opcode::Noop, fence)?;
                return Ok(());
            }
            if frame.header.opcode != Opcode::GetKQ {
                return Err(McError::Protocol(format!(
                    "unexpected {:?} reply inside a multiget",
                    frame.header.opcode
                )));
            }

            let key = frame.key_str()?;
            let slot = result.get_mut(&key).ok_or_else(|| {
                McError::Protocol(format!("reply for unrequested key {:?}", key))
            })?;
            match outcome(&frame) {
                Ok(BinaryOutcome::Success { cas }) => {
                    *slot = Some(
                        ResponseRecord::new(key.as_str(), frame.flags(), frame.value.clone())
                            .with_cas(cas),
                    );
                }
                Ok(BinaryOutcome::Miss) => {}
                // Keep draining to the fence so the stream stays aligned
                Ok(_) => failure = failure.take().or_else(|| Some(status_error(&frame))),
                Err(e) => failure = failure.take().or(Some(e)),
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }

    pub fn gets_multi(&mut self, keys: &[&str]) -> Result<GetResult> {
        self.get_multi(keys)
    }

    // =========================================================================
    // Storage
    // =========================================================================

    pub fn set(&mut self, key: &str, value: impl AsRef<[u8]>, options: StoreOptions) -> Result<BinaryOutcome> {
        self.store(Opcode::Set, key, value.as_ref(), options, 0)
    }

    /// `Conflict(KeyExists)` if the key is already present
    pub fn add(&mut self, key: &str, value: impl AsRef<[u8]>, options: StoreOptions) -> Result<BinaryOutcome> {
        self.store(Opcode::Add, key, value.as_ref(), options, 0)
    }

    pub fn replace(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: StoreOptions,
    ) -> Result<BinaryOutcome> {
        self.store(Opcode::Replace, key, value.as_ref(), options, 0)
    }

    /// `set` carrying a CAS; a stale token comes back as `Conflict(KeyExists)`
    pub fn cas(
        &mut self,
        key: &str,
        value: impl AsRef<[u8]>,
        cas_token: u64,
        options: StoreOptions,
    ) -> Result<BinaryOutcome> {
        self.store(Opcode::Set, key, value.as_ref(), options, cas_token)
    }

    pub fn append(&mut self, key: &str, value: impl AsRef<[u8]>, noreply: bool) -> Result<BinaryOutcome> {
        let frame = RequestFrame::affix(Opcode::Append, key, Bytes::copy_from_slice(value.as_ref()));
        self.mutate(frame, noreply)
    }

    pub fn prepend(&mut self, key: &str, value: impl AsRef<[u8]>, noreply: bool) -> Result<BinaryOutcome> {
        let frame = RequestFrame::affix(Opcode::Prepend, key, Bytes::copy_from_slice(value.as_ref()));
        self.mutate(frame, noreply)
    }

    fn store(
        &mut self,
        opcode: Opcode,
        key: &str,
        value: &[u8],
        options: StoreOptions,
        cas: u64,
    ) -> Result<BinaryOutcome> {
        let frame = RequestFrame::store(
            opcode,
            key,
            Bytes::copy_from_slice(value),
            options.flags,
            expiry(options.exptime)?,
        )
        .with_cas(cas);
        self.mutate(frame, options.noreply)
    }

    // =========================================================================
    // Deletion, Expiry, Counters
    // =========================================================================

    pub fn delete(&mut self, key: &str, noreply: bool) -> Result<BinaryOutcome> {
        self.session.counters.deletes += 1;
        self.mutate(RequestFrame::keyed(Opcode::Delete, key), noreply)
    }

    /// Touch has no quiet variant
    pub fn touch(&mut self, key: &str, exptime: i64) -> Result<BinaryOutcome> {
        self.mutate(RequestFrame::touch(key, expiry(exptime)?), false)
    }

    /// New value, or `None` if the key does not exist
    pub fn incr(&mut self, key: &str, delta: u64) -> Result<Option<u64>> {
        self.arith(Opcode::Increment, key, delta, 0, ARITH_NO_CREATE)
    }

    pub fn decr(&mut self, key: &str, delta: u64) -> Result<Option<u64>> {
        self.arith(Opcode::Decrement, key, delta, 0, ARITH_NO_CREATE)
    }

    /// Increment, creating a missing key at `initial` with `exptime`
    pub fn incr_with_initial(
        &mut self,
        key: &str,
        delta: u64,
        initial: u64,
        exptime: u32,
    ) -> Result<Option<u64>> {
        self.arith(Opcode::Increment, key, delta, initial, exptime)
    }

    fn arith(
        &mut self,
        opcode: Opcode,
        key: &str,
        delta: u64,
        initial: u64,
        exptime: u32,
    ) -> Result<Option<u64>> {
        let reply = self.round_trip(RequestFrame::arith(opcode, key, delta, initial, exptime))?;
        match outcome(&reply)? {
            BinaryOutcome::Success { .. } => {
                let bytes: [u8; 8] = reply.value[..].try_into().map_err(|_| {
                    McError::Framing(format!(
                        "counter reply carries {} bytes, expected 8",
                        reply.value.len()
                    ))
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            BinaryOutcome::Miss => Ok(None),
            _ => Err(status_error(&reply)),
        }
    }

    // =========================================================================
    // Statistics and Administration
    // =========================================================================

    /// One frame per statistic, terminated by a frame with an empty key
    pub fn stats(&mut self, group: Option<&str>) -> Result<HashMap<String, String>> {
        let pairs = self.stat_frames(group)?;
        Ok(pairs.into_iter().collect())
    }

    /// `name value` per statistic, in server order
    pub fn raw_stats(&mut self, group: Option<&str>) -> Result<Vec<String>> {
        let pairs = self.stat_frames(group)?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| format!("{} {}", name, value))
            .collect())
    }

    fn stat_frames(&mut self, group: Option<&str>) -> Result<Vec<(String, String)>> {
        let frame = match group {
            Some(group) => RequestFrame::keyed(Opcode::Stat, group),
            None => RequestFrame::new(Opcode::Stat),
        };
        let opaque = self.next_opaque();
        let request = frame.with_opaque(opaque).encode()?;

        let mut pairs = Vec::new();
        let last = self.session.exchange(&request, |t| loop {
            let frame = read_reply(t, Opcode::Stat, opaque)?;
            if frame.header.status()? != Status::NoError || frame.key.is_empty() {
                return Ok(frame);
            }
            pairs.push((
                frame.key_str()?,
                String::from_utf8_lossy(&frame.value).into_owned(),
            ));
        })?;

        match last.header.status()? {
            Status::NoError => Ok(pairs),
            _ => Err(status_error(&last)),
        }
    }

    pub fn version(&mut self) -> Result<String> {
        let reply = self.round_trip(RequestFrame::new(Opcode::Version))?;
        match outcome(&reply)? {
            BinaryOutcome::Success { .. } => Ok(String::from_utf8_lossy(&reply.value).into_owned()),
            _ => Err(status_error(&reply)),
        }
    }

    pub fn flush_all(&mut self, delay: Option<u32>) -> Result<BinaryOutcome> {
        self.mutate(RequestFrame::flush(delay), false)
    }

    pub fn noop(&mut self) -> Result<()> {
        let reply = self.round_trip(RequestFrame::new(Opcode::Noop))?;
        match outcome(&reply)? {
            BinaryOutcome::Success { .. } => Ok(()),
            _ => Err(status_error(&reply)),
        }
    }

    // =========================================================================
    // Line-Protocol-Only Commands
    // =========================================================================

    pub fn shutdown(&mut self) -> Result<String> {
        Err(McError::Unsupported("shutdown over the binary protocol"))
    }

    pub fn issue_command(&mut self, _command: impl AsRef<[u8]>) -> Result<String> {
        Err(McError::Unsupported("raw commands over the binary protocol"))
    }

    pub fn issue_command_and_read_all(&mut self, _command: impl AsRef<[u8]>) -> Result<Option<String>> {
        Err(McError::Unsupported("raw commands over the binary protocol"))
    }

    pub fn metaget(&mut self, _key: &str) -> Result<HashMap<String, String>> {
        Err(McError::Unsupported("metaget over the binary protocol"))
    }

    pub fn lease_get(&mut self, _key: &str) -> Result<Option<ResponseRecord>> {
        Err(McError::Unsupported("leases over the binary protocol"))
    }

    pub fn lease_set(
        &mut self,
        _key: &str,
        _value: impl AsRef<[u8]>,
        _token: u64,
        _exptime: i64,
    ) -> Result<BinaryOutcome> {
        Err(McError::Unsupported("leases over the binary protocol"))
    }

    // =========================================================================
    // Shared Request Path
    // =========================================================================

    fn next_opaque(&mut self) -> u32 {
        self.opaque = self.opaque.wrapping_add(1);
        self.opaque
    }

    /// Send one frame and read its matching reply
    fn round_trip(&mut self, frame: RequestFrame) -> Result<Frame> {
        let opaque = self.next_opaque();
        let opcode = frame.opcode;
        let request = frame.with_opaque(opaque).encode()?;
        self.session
            .exchange(&request, |t| read_reply(t, opcode, opaque))
    }

    /// Writes that map to a [`BinaryOutcome`]; `noreply` uses the quiet opcode
    fn mutate(&mut self, frame: RequestFrame, noreply: bool) -> Result<BinaryOutcome> {
        if !noreply {
            let reply = self.round_trip(frame)?;
            return outcome(&reply);
        }

        let opaque = self.next_opaque();
        let frame = frame.quiet()?.with_opaque(opaque);
        let opcode = frame.opcode;
        let fence = self.next_opaque();

        let mut request = BytesMut::new();
        request.put_slice(&frame.encode()?);
        request.put_slice(&RequestFrame::new(Opcode::Noop).with_opaque(fence).encode()?);

        let reply = self.session.exchange(&request, |t| {
            let first = read_binary_frame(t)?;
            if first.header.opcode == Opcode::Noop {
                check_reply(&first, Opcode::Noop, fence)?;
                return Ok(None);
            }
            check_reply(&first, opcode, opaque)?;
            read_reply(t, Opcode::Noop, fence)?;
            Ok(Some(first))
        })?;

        match reply {
            Some(frame) => outcome(&frame),
            None => Ok(BinaryOutcome::Quiet),
        }
    }
}

fn read_reply<S: ByteSource + ?Sized>(source: &mut S, opcode: Opcode, opaque: u32) -> Result<Frame> {
    let frame = read_binary_frame(source)?;
    check_reply(&frame, opcode, opaque)?;
    Ok(frame)
}

/// A reply must echo the request's opcode and opaque
fn check_reply(frame: &Frame, opcode: Opcode, opaque: u32) -> Result<()> {
    if frame.header.opcode != opcode {
        return Err(McError::Protocol(format!(
            "expected {:?} reply, got {:?}",
            opcode, frame.header.opcode
        )));
    }
    if frame.header.opaque != opaque {
        return Err(McError::Protocol(format!(
            "reply opaque {} does not match request {}",
            frame.header.opaque, opaque
        )));
    }
    Ok(())
}

/// Map the reply status; anything outside {0, 1, 2, 5} is an error
fn outcome(frame: &Frame) -> Result<BinaryOutcome> {
    match frame.header.status()? {
        Status::NoError => Ok(BinaryOutcome::Success {
            cas: frame.header.cas,
        }),
        Status::KeyNotFound => Ok(BinaryOutcome::Miss),
        status @ (Status::KeyExists | Status::ItemNotStored) => Ok(BinaryOutcome::Conflict(status)),
        _ => Err(status_error(frame)),
    }
}

/// Error for a reply whose status the command has no outcome for
fn status_error(frame: &Frame) -> McError {
    match frame.header.status() {
        Ok(status) => McError::Status {
            status,
            message: String::from_utf8_lossy(&frame.value).into_owned(),
        },
        Err(e) => e,
    }
}

/// Binary expiry is an unsigned 32-bit field
fn expiry(exptime: i64) -> Result<u32> {
    u32::try_from(exptime).map_err(|_| {
        McError::InvalidArgument(format!(
            "expiry {} does not fit the binary protocol's unsigned 32-bit field",
            exptime
        ))
    })
}
