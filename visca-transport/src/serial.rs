//! Serial port transport

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace};
use visca_core::HexBytes;

use crate::{LinkKind, Transport, error::*};

/// RS-232/RS-422 link, 8N1 without flow control
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<SerialStream>,
    closed: bool,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
            closed: false,
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let port = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::Open {
                target: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!("open_port OK: {} @ {} baud", self.path, self.baud_rate);

        self.port = Some(port);
        self.closed = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.path);
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        trace!(bytes = %HexBytes(data), "serial tx");

        port.write_all(data).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<BytesMut> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(64);
        let n = match timeout(wait, port.read_buf(&mut buf)).await {
            Err(_) => return Ok(buf),
            Ok(read) => read?,
        };

        if n == 0 {
            self.closed = true;
            return Err(Error::ConnectionClosed);
        }

        trace!(bytes = %HexBytes(&buf), "serial rx");
        Ok(buf)
    }

    fn is_alive(&self) -> bool {
        self.port.is_some() && !self.closed
    }

    fn remote_addr(&self) -> String {
        self.path.clone()
    }

    fn kind(&self) -> LinkKind {
        LinkKind::Serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_device_fails_open() {
        let mut transport = SerialTransport::new("/dev/visca-does-not-exist", 9600);
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, Error::Open { ref target, .. } if target == "/dev/visca-does-not-exist"));
        assert!(!transport.is_alive());
    }

    #[tokio::test]
    async fn test_io_requires_open() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0", 9600);
        assert!(matches!(transport.write(&[0x81]).await, Err(Error::NotConnected)));
        assert_eq!(transport.remote_addr(), "/dev/ttyUSB0");
        assert_eq!(transport.baud_rate(), 9600);
    }
}
