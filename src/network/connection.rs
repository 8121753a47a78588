//! Client Connection
//!
//! A buffered TCP or Unix-domain byte stream with the primitives both
//! protocol clients are written against.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::config::{ClientConfig, Endpoint};
use crate::error::{McError, Result};
use crate::protocol::{read_exact_from, read_line_from, ByteSource};

/// A bidirectional byte stream a client owns
pub trait Transport: ByteSource {
    /// Write and flush
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// True if nothing arrives within `timeout`. Pending data or EOF is not silence.
    fn probe_no_data_within(&mut self, timeout: Duration) -> Result<bool>;

    fn close(&mut self) -> Result<()>;

    /// Drop the current stream and open a fresh one to the same peer
    fn reopen(&mut self) -> Result<()>;
}

/// Either kind of stream socket
#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Stream::Tcp(s) => s.try_clone().map(Stream::Tcp),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_clone().map(Stream::Unix),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_write_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_write_timeout(timeout),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// Reader and writer halves of one open socket
struct Halves {
    /// Buffered for line reads
    reader: BufReader<Stream>,

    writer: BufWriter<Stream>,
}

/// A connection to a memcache server or proxy
pub struct Connection {
    config: ClientConfig,

    /// `None` once closed
    halves: Option<Halves>,
}

impl Connection {
    /// Connect using the config's endpoint and timeouts
    ///
    /// Retries refused connects up to `connect_attempts` times.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let mut conn = Self {
            config: config.clone(),
            halves: None,
        };
        conn.connect()?;
        Ok(conn)
    }

    /// Endpoint this connection talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.halves.is_some()
    }

    fn connect(&mut self) -> Result<()> {
        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;
        let stream = loop {
            match self.connect_once() {
                Ok(stream) => break stream,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused && attempt < attempts => {
                    tracing::debug!(
                        "Connection to {} refused (attempt {}/{}), retrying",
                        self.config.endpoint,
                        attempt,
                        attempts
                    );
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(self.config.connect_retry_delay_ms));
                }
                Err(e) => return Err(e.into()),
            }
        };

        stream.set_read_timeout(millis(self.config.read_timeout_ms))?;
        stream.set_write_timeout(millis(self.config.write_timeout_ms))?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        self.halves = Some(Halves {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        });

        tracing::debug!("Connected to {}", self.config.endpoint);
        Ok(())
    }

    fn connect_once(&self) -> io::Result<Stream> {
        match &self.config.endpoint {
            Endpoint::Tcp(addr) => {
                let stream = match millis(self.config.connect_timeout_ms) {
                    Some(timeout) => {
                        let mut last_err = None;
                        let mut connected = None;
                        for sock_addr in addr.to_socket_addrs()? {
                            match TcpStream::connect_timeout(&sock_addr, timeout) {
                                Ok(s) => {
                                    connected = Some(s);
                                    break;
                                }
                                Err(e) => last_err = Some(e),
                            }
                        }
                        match connected {
                            Some(s) => s,
                            None => {
                                return Err(last_err.unwrap_or_else(|| {
                                    io::Error::new(
                                        io::ErrorKind::AddrNotAvailable,
                                        format!("{} resolved to no addresses", addr),
                                    )
                                }))
                            }
                        }
                    }
                    None => TcpStream::connect(addr.as_str())?,
                };
                // Disable Nagle's algorithm for low latency
                stream.set_nodelay(self.config.nodelay)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    fn halves(&mut self) -> Result<&mut Halves> {
        self.halves.as_mut().ok_or(McError::NotConnected)
    }
}

impl ByteSource for Connection {
    fn read_line(&mut self) -> Result<Vec<u8>> {
        read_line_from(&mut self.halves()?.reader)
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        read_exact_from(&mut self.halves()?.reader, n)
    }
}

impl Transport for Connection {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let halves = self.halves()?;
        halves.writer.write_all(buf)?;
        halves.writer.flush()?;
        Ok(())
    }

    fn probe_no_data_within(&mut self, timeout: Duration) -> Result<bool> {
        let restore = millis(self.config.read_timeout_ms);
        let halves = self.halves()?;
        if !halves.reader.buffer().is_empty() {
            return Ok(false);
        }

        halves.reader.get_ref().set_read_timeout(Some(timeout))?;
        let probed = match halves.reader.fill_buf() {
            // Data or EOF
            Ok(_) => Ok(false),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(true)
            }
            Err(e) => Err(e.into()),
        };
        halves.reader.get_ref().set_read_timeout(restore)?;
        probed
    }

    fn close(&mut self) -> Result<()> {
        if let Some(halves) = self.halves.take() {
            tracing::debug!("Closing connection to {}", self.config.endpoint);
            match halves.reader.get_ref().shutdown() {
                Ok(()) => {}
                // Peer already gone
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        // A failed shutdown must not prevent the reconnect
        if let Err(e) = self.close() {
            tracing::debug!("Ignoring close error before reconnect: {}", e);
        }
        self.connect()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// 0 means "no timeout"
fn millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
