//! Configuration for mcharness clients
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{McError, Result};

/// Where a client connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP `host:port`
    Tcp(String),

    /// Unix-domain stream socket path
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint on localhost
    pub fn port(port: u16) -> Self {
        Endpoint::Tcp(format!("localhost:{}", port))
    }

    /// Parse an address as given on a command line.
    ///
    /// `unix:<path>` or anything containing `/` is a socket path, a bare
    /// number is a localhost port, everything else is `host:port`.
    pub fn parse(addr: &str) -> Result<Self> {
        if let Some(path) = addr.strip_prefix("unix:") {
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if addr.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(addr)));
        }
        if let Ok(port) = addr.parse::<u16>() {
            return Ok(Endpoint::port(port));
        }
        if addr.rsplit_once(':').map_or(true, |(host, port)| {
            host.is_empty() || port.parse::<u16>().is_err()
        }) {
            return Err(McError::Config(format!("invalid endpoint: {:?}", addr)));
        }
        Ok(Endpoint::Tcp(addr.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Main configuration for a protocol client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Server (or proxy) to talk to
    pub endpoint: Endpoint,

    /// Connect timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,

    /// Read timeout (milliseconds, 0 = block forever)
    pub read_timeout_ms: u64,

    /// Write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,

    /// How many times to try connecting while the peer refuses
    pub connect_attempts: u32,

    /// Pause between refused connection attempts (milliseconds)
    pub connect_retry_delay_ms: u64,

    /// Disable Nagle's algorithm on TCP sockets
    pub nodelay: bool,

    // -------------------------------------------------------------------------
    // Silence Probes
    // -------------------------------------------------------------------------
    /// How long a `noreply` write must stay unanswered (milliseconds)
    pub noreply_probe_ms: u64,

    /// Initial no-response window for `stats` (milliseconds)
    pub stats_probe_ms: u64,

    /// Initial no-response window for `raw_stats` and raw read-all commands (milliseconds)
    pub raw_probe_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp("127.0.0.1:11211".to_string()),
            connect_timeout_ms: 1000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            connect_attempts: 1,
            connect_retry_delay_ms: 100,
            nodelay: true,
            noreply_probe_ms: 500,
            stats_probe_ms: 5000,
            raw_probe_ms: 2000,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Probe windows used by the clients
    pub fn probes(&self) -> ProbeWindows {
        ProbeWindows {
            noreply: Duration::from_millis(self.noreply_probe_ms),
            stats: Duration::from_millis(self.stats_probe_ms),
            raw: Duration::from_millis(self.raw_probe_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.noreply_probe_ms == 0 || self.stats_probe_ms == 0 || self.raw_probe_ms == 0 {
            return Err(McError::Config(
                "probe windows must be non-zero".to_string(),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(McError::Config(
                "connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded waits used to detect a silent peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeWindows {
    pub noreply: Duration,
    pub stats: Duration,
    pub raw: Duration,
}

impl Default for ProbeWindows {
    fn default() -> Self {
        ClientConfig::default().probes()
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the endpoint to connect to
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set how many refused connects are tolerated
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts;
        self
    }

    /// Set the pause between refused connects (in milliseconds)
    pub fn connect_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.connect_retry_delay_ms = ms;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set the `noreply` silence window (in milliseconds)
    pub fn noreply_probe_ms(mut self, ms: u64) -> Self {
        self.config.noreply_probe_ms = ms;
        self
    }

    /// Set the `stats` no-response window (in milliseconds)
    pub fn stats_probe_ms(mut self, ms: u64) -> Self {
        self.config.stats_probe_ms = ms;
        self
    }

    /// Set the raw command no-response window (in milliseconds)
    pub fn raw_probe_ms(mut self, ms: u64) -> Self {
        self.config.raw_probe_ms = ms;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
