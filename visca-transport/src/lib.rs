//! Transport layer for VISCA cameras
//!
//! Provides serial, raw TCP and RFC 2217 links, plus an in-memory link for
//! tests and simulators.

pub mod endpoint;
pub mod error;
pub mod memory;
pub mod rfc2217;
pub mod serial;
pub mod tcp;

pub use endpoint::{Endpoint, LinkKind, LinkOptions, NetMode};
pub use error::{Error, Result};
pub use memory::{MemoryLink, MemoryTransport};
pub use rfc2217::Rfc2217Transport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte link to one or more cameras
///
/// Implementations never retry on their own; every failure is returned to
/// the caller as it happens.
#[async_trait]
pub trait Transport: Send {
    /// Open the link
    async fn open(&mut self) -> Result<()>;

    /// Close the link; closing a closed link is a no-op
    async fn close(&mut self) -> Result<()>;

    /// Write all bytes
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever arrives within `wait`
    ///
    /// Returns an empty buffer when nothing arrived in time. End of stream
    /// is `ConnectionClosed`.
    async fn read_available(&mut self, wait: Duration) -> Result<BytesMut>;

    /// Whether the link is open and has not seen end of stream
    fn is_alive(&self) -> bool;

    /// Get remote address
    fn remote_addr(&self) -> String;

    fn kind(&self) -> LinkKind;
}

/// Build the transport a connection string names
///
/// # Examples
///
/// ```
/// use visca_transport::{LinkKind, LinkOptions, NetMode, from_connection_string};
///
/// let link = from_connection_string("/dev/ttyUSB0", NetMode::default(), &LinkOptions::default()).unwrap();
/// assert_eq!(link.kind(), LinkKind::Serial);
/// ```
pub fn from_connection_string(
    connection: &str,
    mode: NetMode,
    options: &LinkOptions,
) -> Result<Box<dyn Transport>> {
    Ok(Endpoint::parse(connection, mode)?.into_transport(options))
}
