//! Client Module
//!
//! Request/response drivers for both encodings.
//!
//! ## Connection States
//! ```text
//!   Disconnected ──reconnect──► Connected ──send──► AwaitingResponse
//!        ▲                          ▲                     │
//!        │                          └──── well-formed ────┤
//!        └──────── framing / io failure ──────────────────┘
//! ```
//! A protocol violation (legal framing, illegal reply) reconnects before the
//! error is returned, so the next call starts on a fresh stream.

mod ascii;
mod binary;

pub use ascii::AsciiClient;
pub use binary::{BinaryClient, BinaryOutcome};

use crate::config::ProbeWindows;
use crate::error::{McError, Result};
use crate::network::Transport;

/// Per-connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connected,
    AwaitingResponse,
}

/// Per-client operation tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Requests written
    pub requests: u64,
    pub deletes: u64,
    /// Raw commands issued through the escape hatches
    pub others: u64,
    pub reconnects: u64,
}

/// One transport plus the state machine around it
pub(crate) struct Session<T: Transport> {
    transport: T,
    state: ConnState,
    pub(crate) counters: Counters,
    pub(crate) probes: ProbeWindows,
}

impl<T: Transport> Session<T> {
    /// Wrap an already connected transport
    pub(crate) fn new(transport: T, probes: ProbeWindows) -> Self {
        Self {
            transport,
            state: ConnState::Connected,
            counters: Counters::default(),
            probes,
        }
    }

    pub(crate) fn state(&self) -> ConnState {
        self.state
    }

    pub(crate) fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn into_transport(self) -> T {
        self.transport
    }

    /// Write a request; only legal from `Connected`
    pub(crate) fn send(&mut self, request: &[u8]) -> Result<()> {
        if self.state != ConnState::Connected {
            return Err(McError::NotConnected);
        }
        self.state = ConnState::AwaitingResponse;
        self.counters.requests += 1;
        tracing::trace!("Sending {} byte request", request.len());

        if let Err(e) = self.transport.write_all(request) {
            self.teardown(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Settle the state after reading a reply
    pub(crate) fn finish<R>(&mut self, result: Result<R>) -> Result<R> {
        match &result {
            Ok(_) => self.state = ConnState::Connected,
            Err(e) if e.poisons_connection() => self.teardown(e),
            Err(e) if e.wants_reconnect() => {
                tracing::debug!("Reconnecting after protocol error: {}", e);
                self.state = ConnState::Disconnected;
                // The protocol error is what the caller needs to see
                if let Err(reopen) = self.reconnect() {
                    tracing::debug!("Reconnect failed, staying disconnected: {}", reopen);
                }
            }
            Err(_) => self.state = ConnState::Connected,
        }
        result
    }

    /// Send, then read with `read`, settling the state either way
    pub(crate) fn exchange<R>(
        &mut self,
        request: &[u8],
        read: impl FnOnce(&mut T) -> Result<R>,
    ) -> Result<R> {
        self.send(request)?;
        let result = read(&mut self.transport);
        self.finish(result)
    }

    /// Send a `noreply` request and verify the server stays silent
    pub(crate) fn exchange_silent(&mut self, request: &[u8]) -> Result<()> {
        let window = self.probes.noreply;
        self.exchange(request, |t| {
            if t.probe_no_data_within(window)? {
                Ok(())
            } else {
                Err(McError::Protocol(
                    "server replied to a noreply request".to_string(),
                ))
            }
        })
    }

    /// Open a fresh stream to the same peer
    pub(crate) fn reconnect(&mut self) -> Result<()> {
        self.transport.reopen()?;
        self.counters.reconnects += 1;
        self.state = ConnState::Connected;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.state = ConnState::Disconnected;
        self.transport.close()
    }

    fn teardown(&mut self, cause: &McError) {
        tracing::debug!("Tearing down connection: {}", cause);
        self.state = ConnState::Disconnected;
        if let Err(e) = self.transport.close() {
            tracing::debug!("Close after failure also failed: {}", e);
        }
    }
}
