//! Connection manager
//!
//! Owns the transport and walks the link through
//! `Idle → Connecting → Connected ⇄ ReconnectWait`, with `Failed` as the end
//! of the road when reconnect attempts are capped.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use visca_core::{Address, Frame, FrameParser, HexBytes, Inquiry};
use visca_transport::{Error as TransportError, Transport};
use visca_types::ConnectionState;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::ConnectionError;
use crate::event::{EventSender, StatusEvent};

/// Link state machine around one transport
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    parser: FrameParser,
    /// Frames that arrived behind the probe reply
    backlog: Vec<Frame>,
    state: ConnectionState,
    backoff: Backoff,
    failed_attempts: u32,
    io_failures: u32,
    io_failure_threshold: u32,
    max_attempts: Option<u32>,
    stability_window: Duration,
    connected_at: Option<Instant>,
    retry_at: Option<Instant>,
    probe: Address,
    probe_wait: Duration,
    probe_attempts: u32,
    state_tx: watch::Sender<ConnectionState>,
    events: EventSender,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn Transport>, config: &Config, events: EventSender) -> Self {
        let (state_tx, _rx) = watch::channel(ConnectionState::Idle);
        Self {
            transport,
            parser: FrameParser::new(),
            backlog: Vec::new(),
            state: ConnectionState::Idle,
            backoff: Backoff::new(config.backoff),
            failed_attempts: 0,
            io_failures: 0,
            io_failure_threshold: config.io_failure_threshold.max(1),
            max_attempts: config.max_reconnect_attempts,
            stability_window: config.stability_window,
            connected_at: None,
            retry_at: None,
            probe: config.probe_address(),
            probe_wait: config.ack_timeout,
            probe_attempts: config.max_retries + 1,
            state_tx,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// When the next reconnect attempt is due
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    fn transition(&mut self, next: ConnectionState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        info!("Connection {} -> {} ({})", previous, next, self.transport.remote_addr());
        self.state_tx.send_replace(next);
        let _ = self.events.send(StatusEvent::ConnectionChanged {
            previous,
            current: next,
        });
    }

    /// Explicit connect request; starts the backoff over
    ///
    /// Does nothing when already connected.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.backoff.reset();
        self.failed_attempts = 0;
        self.attempt().await
    }

    /// Whether a scheduled reconnect is due at `now`
    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.state == ConnectionState::ReconnectWait && self.retry_at.is_some_and(|at| now >= at)
    }

    /// One connection attempt: open the transport and probe the camera
    ///
    /// # Errors
    ///
    /// `Unreachable` when the attempt failed and another is scheduled,
    /// `MaxRetriesExceeded` when the manager gave up.
    pub async fn attempt(&mut self) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::Connecting);
        self.retry_at = None;

        match self.open_and_probe().await {
            Ok(()) => {
                self.failed_attempts = 0;
                self.io_failures = 0;
                self.connected_at = Some(Instant::now());
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(reason) => {
                if let Err(e) = self.transport.close().await {
                    debug!("Close after failed attempt: {}", e);
                }
                Err(self.attempt_failed(reason))
            }
        }
    }

    fn attempt_failed(&mut self, reason: String) -> ConnectionError {
        self.failed_attempts += 1;
        warn!(attempt = self.failed_attempts, "Connection attempt failed: {}", reason);

        let unreachable = ConnectionError::Unreachable(reason);
        let _ = self.events.send(StatusEvent::ConnectionError(unreachable.clone()));

        if let Some(max) = self.max_attempts {
            if self.failed_attempts >= max {
                let error = ConnectionError::MaxRetriesExceeded {
                    attempts: self.failed_attempts,
                };
                warn!("{}", error);
                let _ = self.events.send(StatusEvent::ConnectionError(error.clone()));
                self.transition(ConnectionState::Failed);
                return error;
            }
        }

        self.schedule_retry();
        unreachable
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        debug!(?delay, "Reconnect scheduled");
        self.retry_at = Some(Instant::now() + delay);
        self.transition(ConnectionState::ReconnectWait);
    }

    async fn open_and_probe(&mut self) -> Result<(), String> {
        info!("Connecting to {}...", self.transport.remote_addr());
        if self.transport.is_alive() {
            let _ = self.transport.close().await;
        }
        self.transport.open().await.map_err(|e| e.to_string())?;
        self.parser.clear();
        self.backlog.clear();

        // Any reply from the probed camera proves the link, errors included
        let probe = Inquiry::Power.encode(self.probe).encode();
        for attempt in 1..=self.probe_attempts {
            trace!(attempt, bytes = %HexBytes(&probe), "Probe");
            self.transport.write(&probe).await.map_err(|e| e.to_string())?;

            let deadline = Instant::now() + self.probe_wait;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let data = self
                    .transport
                    .read_available(deadline - now)
                    .await
                    .map_err(|e| e.to_string())?;
                if data.is_empty() {
                    break;
                }
                let mut frames = self.parser.feed(&data).into_iter();
                while let Some(frame) = frames.next() {
                    match frame.reply() {
                        Ok(reply) if reply.from() == self.probe => {
                            debug!(%frame, "Probe answered");
                            self.backlog.extend(frames);
                            return Ok(());
                        }
                        _ => trace!(%frame, "Ignoring frame during probe"),
                    }
                }
            }
        }

        Err(format!(
            "camera {} did not answer {} probes",
            self.probe, self.probe_attempts
        ))
    }

    /// Read whatever arrived and split it into frames
    ///
    /// Frames left over from the probe come first, without touching the
    /// transport.
    pub async fn read_frames(&mut self, wait: Duration) -> Result<Vec<Frame>, TransportError> {
        if !self.backlog.is_empty() {
            return Ok(std::mem::take(&mut self.backlog));
        }
        let data = self.transport.read_available(wait).await?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        trace!(bytes = %HexBytes(&data), "rx");
        self.io_failures = 0;
        Ok(self.parser.feed(&data))
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        trace!(bytes = %HexBytes(data), "tx");
        self.transport.write(data).await?;
        self.io_failures = 0;
        Ok(())
    }

    /// Count an I/O failure; drops the link when it is certainly gone
    ///
    /// Returns `true` when the link was dropped.
    pub async fn io_failed(&mut self, error: &TransportError) -> bool {
        self.io_failures += 1;
        warn!(
            failures = self.io_failures,
            threshold = self.io_failure_threshold,
            "I/O failure: {}",
            error
        );
        if error.is_fatal() || self.io_failures >= self.io_failure_threshold {
            self.drop_link(&error.to_string()).await;
            return true;
        }
        false
    }

    /// Leave `Connected` and schedule a reconnect
    pub async fn drop_link(&mut self, reason: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        warn!("Link to {} lost: {}", self.transport.remote_addr(), reason);
        if let Err(e) = self.transport.close().await {
            debug!("Close after link loss: {}", e);
        }
        self.parser.clear();
        self.backlog.clear();
        self.io_failures = 0;

        let stable = self
            .connected_at
            .take()
            .is_some_and(|at| at.elapsed() >= self.stability_window);
        if stable {
            self.backoff.reset();
        }
        self.schedule_retry();
    }

    /// Close the link and stay idle
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }
        info!("Disconnecting from {}...", self.transport.remote_addr());
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }
        self.parser.clear();
        self.backlog.clear();
        self.connected_at = None;
        self.retry_at = None;
        self.transition(ConnectionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::event::{EventReceiver, event_channel};
    use async_trait::async_trait;
    use bytes::BytesMut;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use std::io;
    use visca_transport::{LinkKind, Result as TransportResult};

    mock! {
        Link {}

        #[async_trait]
        impl Transport for Link {
            async fn open(&mut self) -> TransportResult<()>;
            async fn close(&mut self) -> TransportResult<()>;
            async fn write(&mut self, data: &[u8]) -> TransportResult<()>;
            async fn read_available(&mut self, wait: Duration) -> TransportResult<BytesMut>;
            fn is_alive(&self) -> bool;
            fn remote_addr(&self) -> String;
            fn kind(&self) -> LinkKind;
        }
    }

    const POWER_ON_REPLY: [u8; 4] = [0x90, 0x50, 0x02, 0xFF];

    fn base_link() -> MockLink {
        let mut link = MockLink::new();
        link.expect_remote_addr().return_const("mock".to_string());
        link.expect_is_alive().return_const(false);
        link.expect_close().returning(|| Ok(()));
        link
    }

    /// A link whose camera always answers the probe
    fn answering_link() -> MockLink {
        let mut link = base_link();
        link.expect_open().returning(|| Ok(()));
        link.expect_write().returning(|_| Ok(()));
        link.expect_read_available()
            .returning(|_| Ok(BytesMut::from(&POWER_ON_REPLY[..])));
        link
    }

    fn manager(link: MockLink, config: Config) -> (ConnectionManager, EventReceiver) {
        let (tx, rx) = event_channel(64);
        (ConnectionManager::new(Box::new(link), &config, tx), rx)
    }

    fn transitions(events: &mut EventReceiver) -> Vec<(ConnectionState, ConnectionState)> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let StatusEvent::ConnectionChanged { previous, current } = event {
                out.push((previous, current));
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success() {
        let (mut mgr, mut events) = manager(answering_link(), Config::default());
        let mut watch = mgr.subscribe();

        mgr.connect().await.unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(*watch.borrow_and_update(), ConnectionState::Connected);
        assert_eq!(
            transitions(&mut events),
            vec![
                (ConnectionState::Idle, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_error_answers_probe() {
        let mut link = base_link();
        link.expect_open().returning(|| Ok(()));
        link.expect_write().returning(|_| Ok(()));
        link.expect_read_available()
            .returning(|_| Ok(BytesMut::from(&[0x90, 0x60, 0x02, 0xFF][..])));
        let (mut mgr, _events) = manager(link, Config::default());

        mgr.connect().await.unwrap();
        assert_eq!(mgr.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_schedules_retry() {
        let mut link = base_link();
        link.expect_open().returning(|| Err(TransportError::ConnectionTimeout));
        let (mut mgr, mut events) = manager(link, Config::default());

        let err = mgr.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unreachable(_)));
        assert_eq!(mgr.state(), ConnectionState::ReconnectWait);

        let retry_at = mgr.retry_at().unwrap();
        assert!(!mgr.reconnect_due(retry_at - Duration::from_millis(1)));
        assert!(mgr.reconnect_due(retry_at));

        let mut saw_unreachable = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, StatusEvent::ConnectionError(ConnectionError::Unreachable(_))) {
                saw_unreachable = true;
            }
        }
        assert!(saw_unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_camera_times_out() {
        let mut link = base_link();
        link.expect_open().returning(|| Ok(()));
        link.expect_write().times(3).returning(|_| Ok(()));
        link.expect_read_available().returning(|wait| {
            assert!(wait > Duration::ZERO);
            Ok(BytesMut::new())
        });
        let (mut mgr, _events) = manager(link, Config::default());

        let start = Instant::now();
        assert!(mgr.connect().await.is_err());
        assert_eq!(mgr.state(), ConnectionState::ReconnectWait);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut link = base_link();
        link.expect_open().returning(|| Err(TransportError::ConnectionTimeout));
        let (mut mgr, mut events) = manager(link, Config::default().with_max_reconnect_attempts(Some(2)));

        assert!(matches!(mgr.connect().await, Err(ConnectionError::Unreachable(_))));
        assert!(matches!(
            mgr.attempt().await,
            Err(ConnectionError::MaxRetriesExceeded { attempts: 2 })
        ));
        assert_eq!(mgr.state(), ConnectionState::Failed);
        assert_eq!(mgr.retry_at(), None);
        assert_eq!(
            transitions(&mut events).last(),
            Some(&(ConnectionState::Connecting, ConnectionState::Failed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_failure_threshold() {
        let (mut mgr, _events) = manager(answering_link(), Config::default());
        mgr.connect().await.unwrap();

        let soft = || TransportError::Io(io::Error::other("glitch"));
        assert!(!mgr.io_failed(&soft()).await);
        assert!(!mgr.io_failed(&soft()).await);
        assert!(mgr.io_failed(&soft()).await);
        assert_eq!(mgr.state(), ConnectionState::ReconnectWait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_io_resets_failures() {
        let (mut mgr, _events) = manager(answering_link(), Config::default());
        mgr.connect().await.unwrap();

        let soft = || TransportError::Io(io::Error::other("glitch"));
        assert!(!mgr.io_failed(&soft()).await);
        assert!(!mgr.io_failed(&soft()).await);
        mgr.write(&[0x81, 0x09, 0x04, 0x00, 0xFF]).await.unwrap();
        assert!(!mgr.io_failed(&soft()).await);
        assert_eq!(mgr.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_drops_at_once() {
        let (mut mgr, _events) = manager(answering_link(), Config::default());
        mgr.connect().await.unwrap();
        assert!(mgr.io_failed(&TransportError::ConnectionClosed).await);
        assert_eq!(mgr.state(), ConnectionState::ReconnectWait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_after_stable_period() {
        let config = Config::default().with_backoff(BackoffConfig::default());
        let (mut mgr, _events) = manager(answering_link(), config);

        let delay_after_drop = |mgr: &ConnectionManager| mgr.retry_at().unwrap() - Instant::now();

        mgr.connect().await.unwrap();
        mgr.drop_link("flap").await;
        assert_eq!(delay_after_drop(&mgr), Duration::from_millis(500));

        mgr.attempt().await.unwrap();
        mgr.drop_link("flap").await;
        assert_eq!(delay_after_drop(&mgr), Duration::from_millis(1000));

        mgr.attempt().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        mgr.drop_link("flap").await;
        assert_eq!(delay_after_drop(&mgr), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_goes_idle() {
        let (mut mgr, mut events) = manager(answering_link(), Config::default());
        mgr.connect().await.unwrap();
        mgr.disconnect().await;
        assert_eq!(mgr.state(), ConnectionState::Idle);
        assert_eq!(
            transitions(&mut events).last(),
            Some(&(ConnectionState::Connected, ConnectionState::Idle))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frames() {
        let (mut mgr, _events) = manager(answering_link(), Config::default());
        mgr.connect().await.unwrap();
        let frames = mgr.read_frames(Duration::ZERO).await.unwrap();
        assert_eq!(frames, vec![Frame::decode(&POWER_ON_REPLY).unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_behind_probe_reply_are_kept() {
        let mut link = base_link();
        link.expect_open().returning(|| Ok(()));
        link.expect_write().returning(|_| Ok(()));
        link.expect_read_available().times(1).returning(|_| {
            Ok(BytesMut::from(&[0x90, 0x50, 0x02, 0xFF, 0x90, 0x38, 0xFF][..]))
        });
        let (mut mgr, _events) = manager(link, Config::default());

        mgr.connect().await.unwrap();
        let frames = mgr.read_frames(Duration::ZERO).await.unwrap();
        assert_eq!(frames, vec![Frame::decode(&[0x90, 0x38, 0xFF]).unwrap()]);
    }
}
