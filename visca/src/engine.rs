//! The engine task
//!
//! One task owns the connection manager and the dispatcher. Clients talk to
//! it over a bounded channel; every read and write happens here, so frames
//! never interleave on the wire.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use visca_core::{Action, Address, Inquiry};
use visca_types::{ConnectionState, Speeds};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::dispatcher::{CommandId, CommandResponder, DispatchEvent, Dispatcher, InquiryResponder};
use crate::error::{ConnectionError, Error, Result};
use crate::event::{EventSender, StatusEvent};

/// Work posted by a client
pub(crate) enum Request {
    Issue {
        id: CommandId,
        address: Address,
        action: Action,
        frame: Bytes,
        respond: CommandResponder,
    },
    Cancel {
        id: CommandId,
        respond: oneshot::Sender<Result<()>>,
    },
    Query {
        address: Address,
        inquiry: Inquiry,
        respond: InquiryResponder,
    },
    SetSpeeds {
        address: Address,
        speeds: Speeds,
        respond: oneshot::Sender<Result<()>>,
    },
    ClearInterface {
        address: Address,
        respond: oneshot::Sender<Result<()>>,
    },
    Connect {
        respond: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        respond: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

pub(crate) struct Engine {
    manager: ConnectionManager,
    dispatcher: Dispatcher,
    requests: mpsc::Receiver<Request>,
    events: EventSender,
    probe: Address,
    auto_connect: bool,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    next_heartbeat: Option<Instant>,
    heartbeat_pending: bool,
    /// Requests that arrived during a connection attempt and need the link
    deferred: VecDeque<Request>,
}

impl Engine {
    pub(crate) fn new(
        manager: ConnectionManager,
        dispatcher: Dispatcher,
        requests: mpsc::Receiver<Request>,
        events: EventSender,
        config: &Config,
    ) -> Self {
        Self {
            manager,
            dispatcher,
            requests,
            events,
            probe: config.probe_address(),
            auto_connect: config.auto_connect,
            poll_interval: config.poll_interval,
            heartbeat_interval: config.heartbeat_interval,
            next_heartbeat: None,
            heartbeat_pending: false,
            deferred: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!("VISCA engine started for {}", self.manager.remote_addr());
        if self.auto_connect {
            let _ = self.connect().await;
        }

        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let stop = match self.deferred.pop_front() {
                Some(request) => self.on_request(Some(request)).await,
                None => tokio::select! {
                    request = self.requests.recv() => self.on_request(request).await,
                    _ = tick.tick() => {
                        self.poll().await;
                        false
                    }
                },
            };
            if stop {
                break;
            }
            self.flush().await;
        }
        info!("VISCA engine stopped");
    }

    /// Returns `true` when the engine should stop
    async fn on_request(&mut self, request: Option<Request>) -> bool {
        match request {
            Some(Request::Shutdown { respond }) => {
                self.shutdown().await;
                let _ = respond.send(());
                true
            }
            Some(request) => {
                self.handle(request).await;
                false
            }
            None => {
                debug!("All clients dropped");
                self.shutdown().await;
                true
            }
        }
    }

    async fn handle(&mut self, request: Request) {
        let Some(request) = serve(&mut self.dispatcher, request) else {
            return;
        };
        match request {
            Request::Connect { respond } => {
                let _ = respond.send(self.connect().await);
            }
            Request::Disconnect { respond } => {
                self.manager.disconnect().await;
                self.dispatcher.link_lost("disconnected");
                self.heartbeat_pending = false;
                self.sync_state();
                let _ = respond.send(Ok(()));
            }
            Request::Shutdown { respond } => {
                // Handled by the loop
                let _ = respond.send(());
            }
            _ => {}
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self.run_attempt(true).await {
            Some(result) => result.map_err(Error::from),
            None => Err(Error::NotConnected),
        }
    }

    /// Run one connection attempt while still serving requests
    ///
    /// Requests that only touch the dispatcher are answered at once. A
    /// disconnect or shutdown interrupts the attempt and returns `None`;
    /// a connect request waits for the outcome.
    async fn run_attempt(&mut self, fresh: bool) -> Option<std::result::Result<(), ConnectionError>> {
        let outcome = {
            let manager = &mut self.manager;
            let attempt = async move {
                if fresh {
                    manager.connect().await
                } else {
                    manager.attempt().await
                }
            };
            tokio::pin!(attempt);

            loop {
                tokio::select! {
                    result = &mut attempt => break Some(result),
                    request = self.requests.recv() => match request {
                        Some(request) => match serve(&mut self.dispatcher, request) {
                            None => {}
                            Some(request @ Request::Connect { .. }) => self.deferred.push_back(request),
                            Some(request) => {
                                debug!("Connection attempt interrupted");
                                self.deferred.push_front(request);
                                break None;
                            }
                        },
                        None => break None,
                    },
                }
            }
        };

        match outcome {
            Some(_) => self.after_attempt(),
            None => self.sync_state(),
        }
        outcome
    }

    fn after_attempt(&mut self) {
        self.sync_state();
        if self.manager.state() == ConnectionState::Connected && !self.dispatcher.is_link_up() {
            let now = Instant::now();
            self.heartbeat_pending = false;
            self.next_heartbeat = Some(now + self.heartbeat_interval);
            self.dispatcher.link_up(now);
        }
    }

    fn sync_state(&self) {
        self.dispatcher.store().set_connection(self.manager.state());
    }

    async fn poll(&mut self) {
        let now = Instant::now();
        match self.manager.state() {
            ConnectionState::Connected => self.poll_connected(now).await,
            ConnectionState::ReconnectWait if self.manager.reconnect_due(now) => {
                let _ = self.run_attempt(false).await;
            }
            _ => {}
        }
    }

    async fn poll_connected(&mut self, now: Instant) {
        if !self.manager.is_alive() {
            self.lose_link("link closed").await;
            return;
        }

        match self.manager.read_frames(Duration::ZERO).await {
            Ok(frames) => {
                for frame in frames {
                    self.dispatcher.handle_frame(frame, now);
                }
            }
            Err(e) => {
                if self.manager.io_failed(&e).await {
                    self.link_dropped(&e.to_string());
                    return;
                }
            }
        }

        self.dispatcher.check_timeouts(now);
        if self.handle_dispatch_events(now).await {
            return;
        }

        if self.next_heartbeat.is_some_and(|at| now >= at) {
            self.send_heartbeat(now);
        }
    }

    fn send_heartbeat(&mut self, now: Instant) {
        self.next_heartbeat = Some(now + self.heartbeat_interval);
        if self.heartbeat_pending {
            return;
        }
        self.heartbeat_pending = true;
        self.dispatcher.heartbeat(self.probe, now);
    }

    /// Returns `true` when the link was dropped
    async fn handle_dispatch_events(&mut self, now: Instant) -> bool {
        for event in self.dispatcher.take_events() {
            match event {
                DispatchEvent::HeartbeatAnswered(address) => {
                    trace!(%address, "Heartbeat answered");
                    self.heartbeat_pending = false;
                }
                DispatchEvent::HeartbeatAbandoned(address) => {
                    trace!(%address, "Heartbeat abandoned");
                    self.heartbeat_pending = false;
                }
                DispatchEvent::HeartbeatFailed(address) => {
                    warn!(%address, "Heartbeat unanswered");
                    self.lose_link("heartbeat unanswered").await;
                    return true;
                }
                DispatchEvent::LinkSuspect(address) => {
                    debug!(%address, "Request unanswered, probing link");
                    self.send_heartbeat(now);
                }
                DispatchEvent::Unsolicited(frame) => {
                    let _ = self.events.send(StatusEvent::Unsolicited(frame));
                }
            }
        }
        false
    }

    async fn lose_link(&mut self, reason: &str) {
        self.manager.drop_link(reason).await;
        self.link_dropped(reason);
    }

    fn link_dropped(&mut self, reason: &str) {
        self.dispatcher.link_lost(reason);
        self.heartbeat_pending = false;
        self.next_heartbeat = None;
        self.sync_state();
    }

    /// Write everything the dispatcher queued
    async fn flush(&mut self) {
        let outbox = self.dispatcher.take_outbox();
        if outbox.is_empty() {
            return;
        }
        if self.manager.state() != ConnectionState::Connected {
            debug!(frames = outbox.len(), "Dropping writes, link is down");
            return;
        }

        for (address, frame) in outbox {
            if let Err(e) = self.manager.write(&frame).await {
                warn!(%address, "Write failed: {}", e);
                if self.manager.io_failed(&e).await {
                    self.link_dropped(&e.to_string());
                    return;
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        self.dispatcher.shutdown();
        self.manager.disconnect().await;
        self.sync_state();
    }
}

/// Answer a request that only needs the dispatcher
///
/// Hands back the requests that act on the link.
fn serve(dispatcher: &mut Dispatcher, request: Request) -> Option<Request> {
    let now = Instant::now();
    match request {
        Request::Issue {
            id,
            address,
            action,
            frame,
            respond,
        } => dispatcher.submit_command(id, address, action, frame, respond, now),
        Request::Cancel { id, respond } => {
            let _ = respond.send(dispatcher.cancel(id, now));
        }
        Request::Query {
            address,
            inquiry,
            respond,
        } => dispatcher.submit_inquiry(address, inquiry, respond, now),
        Request::SetSpeeds {
            address,
            speeds,
            respond,
        } => {
            let result = speeds.validate().map_err(Error::from);
            if result.is_ok() {
                dispatcher.store().set_speeds(address, speeds);
            }
            let _ = respond.send(result);
        }
        Request::ClearInterface { address, respond } => {
            let _ = respond.send(dispatcher.clear_camera(address, now));
        }
        link @ (Request::Connect { .. } | Request::Disconnect { .. } | Request::Shutdown { .. }) => {
            return Some(link);
        }
    }
    None
}
