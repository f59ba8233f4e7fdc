//! Raw TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use visca_core::HexBytes;

use crate::{LinkKind, Transport, error::*};

/// TCP transport carrying bare VISCA bytes
pub struct TcpTransport {
    host: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    closed_by_peer: bool,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            closed_by_peer: false,
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        };

        let addr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(addr);
        Ok(addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are tiny; don't let Nagle hold them back
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        self.closed_by_peer = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!(bytes = %HexBytes(data), "tcp tx");

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(256);

        let n = match timeout(wait, stream.read_buf(&mut buf)).await {
            Err(_) => return Ok(buf),
            Ok(read) => read.map_err(Error::Io)?,
        };

        if n == 0 {
            self.closed_by_peer = true;
            return Err(Error::ConnectionClosed);
        }

        trace!(bytes = %HexBytes(&buf), "tcp rx");

        Ok(buf)
    }

    fn is_alive(&self) -> bool {
        self.stream.is_some() && !self.closed_by_peer
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }

    fn kind(&self) -> LinkKind {
        LinkKind::RawTcp
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!("TCP transport dropped while still connected");
        }
    }
}
