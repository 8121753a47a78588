//! Network Module
//!
//! Socket-level transport the protocol clients run over.
//!
//! ## Architecture
//! - One blocking stream socket per client (TCP or Unix-domain)
//! - Buffered reader for line reads, buffered writer flushed per request
//! - Silence probes use a temporary read timeout

mod connection;

pub use connection::{Connection, Transport};
