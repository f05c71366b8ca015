//! Backend transport.
//!
//! The pool only needs three things from a backend: a way to open a
//! connection, a way to send one request on it, and a way to read whatever
//! response bytes are currently available. [`Transport`] and [`Connection`]
//! capture exactly that; [`TcpTransport`] is the TCP implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default backend connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory for backend connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Opens a new backend connection.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Connection>> + Send;
}

/// One backend session.
pub trait Connection: Send + 'static {
    /// Transmits one request.
    fn send(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Reads as many bytes as are currently available into `buf`.
    ///
    /// `Ok(0)` means the backend closed its side.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Backend address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on new sockets.
    pub nodelay: bool,
}

impl TcpConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Opens plain TCP connections to a single backend.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn connect(&self) -> io::Result<TcpConnection> {
        tracing::debug!("Connecting to backend {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Backend connect timeout");
            io::Error::new(io::ErrorKind::TimedOut, "backend connect timed out")
        })??;

        if self.config.nodelay {
            stream.set_nodelay(true).ok();
        }

        tracing::debug!("Connected to backend {}", self.config.addr);
        Ok(TcpConnection {
            stream,
            peer: self.config.addr,
        })
    }
}

/// A TCP connection to the backend.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for TcpConnection {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }
}
