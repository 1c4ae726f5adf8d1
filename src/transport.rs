//! Blocking byte transport over TCP or a Unix socket, with optional TLS
//! upgrade mid-stream (spec.md §4.1, C1).
//!
//! Mirrors the teacher's `Stream` enum (`Tcp`/`Tls`/`Unix`, each a
//! `BufReader<T>`) so the rest of the crate reads/writes through one type
//! regardless of what's underneath.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Error, Result};

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

enum Stream {
    Tcp(io::BufReader<TcpStream>),
    #[cfg(feature = "sync-tls")]
    Tls(io::BufReader<native_tls::TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(io::BufReader<UnixStream>),
}

/// One socket's worth of connection state. Owned exclusively by a `Session`.
pub struct Transport {
    stream: Stream,
    closed: bool,
}

impl Transport {
    /// Resolve `host:port` and connect to the first address that accepts,
    /// per spec.md §4.1 ("connect iterates resolved addresses until one
    /// succeeds or all fail").
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::UnknownHost(format!("{host}: {e}")))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(sock) => {
                    sock.set_nodelay(true).map_err(Error::Transport)?;
                    return Ok(Self {
                        stream: Stream::Tcp(io::BufReader::new(sock)),
                        closed: false,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(Error::Transport)
            .unwrap_or_else(|| Error::UnknownHost(host.to_string())))
    }

    #[cfg(unix)]
    pub fn connect_unix(path: &str) -> Result<Self> {
        let sock = UnixStream::connect(path).map_err(Error::Transport)?;
        Ok(Self {
            stream: Stream::Unix(io::BufReader::new(sock)),
            closed: false,
        })
    }

    #[cfg(not(unix))]
    pub fn connect_unix(_path: &str) -> Result<Self> {
        Err(Error::Transport(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )))
    }

    /// True while TLS can still be activated on this transport: plain TCP,
    /// not already upgraded.
    pub fn supports_tls(&self) -> bool {
        matches!(self.stream, Stream::Tcp(_))
    }

    /// Perform a blocking TLS handshake on the existing socket. Per
    /// spec.md §4.1, failure marks the connection permanently closed.
    #[cfg(feature = "sync-tls")]
    pub fn activate_tls(&mut self, domain: &str) -> Result<()> {
        let Stream::Tcp(reader) = &self.stream else {
            return Err(Error::StateAbuse(
                "TLS can only be activated once, on a plain TCP transport".to_string(),
            ));
        };
        let sock = reader
            .get_ref()
            .try_clone()
            .map_err(Error::Transport)?;
        sock.set_read_timeout(Some(TLS_HANDSHAKE_TIMEOUT))
            .map_err(Error::Transport)?;

        let connector = native_tls::TlsConnector::new().map_err(|e| Error::Tls(e.to_string()))?;
        let result = connector.connect(domain, sock);
        match result {
            Ok(tls) => {
                tls.get_ref()
                    .set_read_timeout(None)
                    .map_err(Error::Transport)?;
                self.stream = Stream::Tls(io::BufReader::new(tls));
                Ok(())
            }
            Err(e) => {
                self.closed = true;
                Err(Error::Tls(e.to_string()))
            }
        }
    }

    #[cfg(not(feature = "sync-tls"))]
    pub fn activate_tls(&mut self, _domain: &str) -> Result<()> {
        self.closed = true;
        Err(Error::Tls("this build was compiled without TLS support".to_string()))
    }

    /// Fully retrying write: short writes are continued until `bytes` is
    /// exhausted or an unrecoverable error occurs.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let result = match &mut self.stream {
            Stream::Tcp(r) => r.get_mut().write_all(bytes),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_mut().write_all(bytes),
            #[cfg(unix)]
            Stream::Unix(r) => r.get_mut().write_all(bytes),
        };
        match result {
            Ok(()) => Ok(()),
            // macOS can report a spurious wrong_protocol_type on an
            // otherwise-healthy socket; the caller is expected to retry.
            Err(e) if e.raw_os_error() == Some(libc_eprototype()) => Ok(()),
            Err(e) => Err(self.classify_io_error(e)),
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match &mut self.stream {
            Stream::Tcp(r) => r.read_exact(buf),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.read_exact(buf),
            #[cfg(unix)]
            Stream::Unix(r) => r.read_exact(buf),
        };
        result.map_err(|e| self.classify_io_error(e))
    }

    /// Read up to `buf.len()` bytes within `ms` milliseconds. Returns `0` on
    /// a clean EOF rather than an error.
    pub fn read_with_timeout(&mut self, buf: &mut [u8], ms: u64) -> Result<usize> {
        self.set_read_timeout(Some(Duration::from_millis(ms)))?;
        let result = match &mut self.stream {
            Stream::Tcp(r) => r.read(buf),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.read(buf),
            #[cfg(unix)]
            Stream::Unix(r) => r.read(buf),
        };
        self.set_read_timeout(None)?;
        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(self.classify_io_error(e)),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.stream {
            Stream::Tcp(r) => r.get_ref().set_read_timeout(timeout).map_err(Error::Transport),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_ref().get_ref().set_read_timeout(timeout).map_err(Error::Transport),
            #[cfg(unix)]
            Stream::Unix(r) => r.get_ref().set_read_timeout(timeout).map_err(Error::Transport),
        }
    }

    pub fn shutdown(&mut self, direction: Shutdown) -> Result<()> {
        let result = match &self.stream {
            Stream::Tcp(r) => r.get_ref().shutdown(direction),
            #[cfg(feature = "sync-tls")]
            Stream::Tls(r) => r.get_ref().get_ref().shutdown(direction),
            #[cfg(unix)]
            Stream::Unix(r) => r.get_ref().shutdown(direction),
        };
        result.map_err(Error::Transport)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.shutdown(Shutdown::Both);
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// EOF/reset/aborted/broken-pipe reads as "server has gone away"; any
    /// other OS error is surfaced with its own message (spec.md §4.1).
    fn classify_io_error(&mut self, e: io::Error) -> Error {
        self.closed = true;
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::ServerGone,
            _ => Error::Transport(e),
        }
    }
}

#[cfg(target_os = "macos")]
fn libc_eprototype() -> i32 {
    41
}

#[cfg(not(target_os = "macos"))]
fn libc_eprototype() -> i32 {
    i32::MIN
}
