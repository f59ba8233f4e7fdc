//! In-memory transport for tests and simulators

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::trace;
use visca_core::HexBytes;

use crate::{LinkKind, Transport, error::*};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct LinkState {
    open: bool,
    hung_up: bool,
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    fail_writes: bool,
    fail_open: bool,
    open_count: usize,
    responder: Option<Responder>,
}

/// Far end of a [`MemoryTransport`]
///
/// Cloning shares the same link. Tests push camera replies, inspect what
/// was written, and inject failures.
#[derive(Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<LinkState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport bound to this link
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { link: self.clone() }
    }

    /// Queue bytes for the transport to read
    pub fn push_inbound(&self, data: &[u8]) {
        self.state.lock().inbound.extend(data);
    }

    /// Every write so far, one entry per call
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Take and clear the recorded writes
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().written)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Answer every write with the bytes `responder` returns
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    /// Simulate the remote end closing the connection
    pub fn hang_up(&self) {
        self.state.lock().hung_up = true;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Successful opens so far
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

/// Transport end of a [`MemoryLink`]
pub struct MemoryTransport {
    link: MemoryLink,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.link.state.lock();
        if state.open {
            return Err(Error::AlreadyConnected);
        }
        if state.fail_open {
            return Err(Error::Open {
                target: "memory".into(),
                reason: "refused".into(),
            });
        }
        state.open = true;
        state.hung_up = false;
        state.open_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.link.state.lock();
        state.open = false;
        state.inbound.clear();
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.link.state.lock();
        if !state.open {
            return Err(Error::NotConnected);
        }
        if state.hung_up {
            return Err(Error::ConnectionClosed);
        }
        if state.fail_writes {
            return Err(Error::Io(std::io::Error::other("injected write failure")));
        }

        trace!(bytes = %HexBytes(data), "memory tx");
        state.written.push(data.to_vec());

        if let Some(responder) = state.responder.as_mut() {
            let reply = responder(data);
            state.inbound.extend(reply);
        }
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<BytesMut> {
        {
            let mut state = self.link.state.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            if !state.inbound.is_empty() {
                let data: Vec<u8> = state.inbound.drain(..).collect();
                return Ok(BytesMut::from(&data[..]));
            }
            if state.hung_up {
                return Err(Error::ConnectionClosed);
            }
        }

        tokio::time::sleep(wait).await;
        Ok(BytesMut::new())
    }

    fn is_alive(&self) -> bool {
        let state = self.link.state.lock();
        state.open && !state.hung_up
    }

    fn remote_addr(&self) -> String {
        "memory".into()
    }

    fn kind(&self) -> LinkKind {
        LinkKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_round_trip() {
        let link = MemoryLink::new();
        let mut transport = link.transport();

        assert!(matches!(transport.write(&[0x81]).await, Err(Error::NotConnected)));

        transport.open().await.unwrap();
        assert!(transport.is_alive());
        assert_eq!(link.open_count(), 1);

        link.set_responder(|data| {
            if data == [0x81, 0x09, 0x04, 0x00, 0xFF] {
                vec![0x90, 0x50, 0x02, 0xFF]
            } else {
                Vec::new()
            }
        });
        transport.write(&[0x81, 0x09, 0x04, 0x00, 0xFF]).await.unwrap();

        let read = transport.read_available(Duration::from_millis(10)).await.unwrap();
        assert_eq!(read.as_ref(), &[0x90, 0x50, 0x02, 0xFF]);
        assert!(transport.read_available(Duration::from_millis(10)).await.unwrap().is_empty());
        assert_eq!(link.written(), vec![vec![0x81, 0x09, 0x04, 0x00, 0xFF]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_failures() {
        let link = MemoryLink::new();
        let mut transport = link.transport();

        link.set_fail_open(true);
        assert!(matches!(transport.open().await, Err(Error::Open { .. })));
        link.set_fail_open(false);
        transport.open().await.unwrap();

        link.set_fail_writes(true);
        let err = transport.write(&[0x81]).await.unwrap_err();
        assert!(!err.is_fatal());

        link.hang_up();
        assert!(!transport.is_alive());
        assert!(matches!(
            transport.read_available(Duration::from_millis(1)).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
