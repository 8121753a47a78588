//! # mcharness
//!
//! Client-side tooling for driving a memcache-speaking proxy under test:
//! - Line (text) and binary protocol codecs
//! - Blocking single-connection clients for both encodings
//! - Lease tokens, CAS, multi-key gets, `noreply` silence checks
//! - A JSON config templater that rewrites `host:port` endpoints
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │     AsciiClient      │   │     BinaryClient     │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            │      Session state       │
//!            ▼                          ▼
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │  protocol::ascii     │   │  protocol::binary    │
//! │  (lines + payloads)  │   │  (24-byte header)    │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            └────────────┬─────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │ Transport           │
//!              │ (TCP / Unix socket) │
//!              └─────────────────────┘
//!
//! ┌──────────────────────────────────────────────────┐
//! │ template: placeholders + PortRewriter over JSON  │
//! └──────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod client;
pub mod template;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{McError, Result};
pub use config::{ClientConfig, Endpoint};
pub use client::{AsciiClient, BinaryClient, BinaryOutcome, ConnState, Counters};
pub use protocol::{GetResult, Outcome, ResponseRecord, StoreOptions};
pub use template::{PortRewriter, PortSubstitution};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mcharness
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
