//! Request dispatcher
//!
//! Matches camera replies to outstanding requests and decides what goes on
//! the wire next. It does no I/O: the engine feeds it requests, decoded
//! frames and the current time, then writes whatever it left in the outbox.
//!
//! Per camera, at most one frame waits for its first answer at a time, so a
//! socket-less error reply always refers to that frame. Commands hold one of
//! the camera's two sockets from the moment they are sent until they
//! complete, fail or are canceled.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use visca_core::{
    Action, Address, CameraError, Frame, HexBytes, Inquiry, InquiryValue, MotionGroup, Reply,
    Socket, SocketTable, cancel_frame, if_clear_frame,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::StateStore;

/// Engine-assigned identifier of an issued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolves the caller's handle for a command
pub type CommandResponder = oneshot::Sender<Result<()>>;

/// Resolves the caller's handle for an inquiry
pub type InquiryResponder = oneshot::Sender<Result<InquiryValue>>;

/// Timing and policy knobs
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub ack_timeout: Duration,
    pub completion_timeout: Duration,
    pub max_retries: u32,
    pub queue_depth: usize,
    pub supersede_motion: bool,
}

impl From<&Config> for DispatchConfig {
    fn from(config: &Config) -> Self {
        Self {
            ack_timeout: config.ack_timeout,
            completion_timeout: config.completion_timeout,
            max_retries: config.max_retries,
            queue_depth: config.queue_depth,
            supersede_motion: config.supersede_motion,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Things the connection manager needs to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// The camera answered a heartbeat, possibly with an error
    HeartbeatAnswered(Address),
    /// A heartbeat went unanswered after every retry
    HeartbeatFailed(Address),
    /// A heartbeat was dropped before the camera could answer it
    HeartbeatAbandoned(Address),
    /// A request went unanswered after every retry
    LinkSuspect(Address),
    /// A frame that matched no outstanding request
    Unsolicited(Frame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Canceled,
    Superseded,
}

impl Abort {
    fn error(self) -> Error {
        match self {
            Self::Canceled => Error::Canceled,
            Self::Superseded => Error::Superseded,
        }
    }
}

struct Ticket {
    id: CommandId,
    action: Action,
    frame: Bytes,
    responder: CommandResponder,
}

impl Ticket {
    fn resolve(self, ctx: &Ctx<'_>, result: Result<()>) {
        if let Some(effect) = self.action.effect() {
            match result {
                Ok(()) => ctx.store.confirm(ctx.address, effect),
                Err(_) => ctx.store.discard(ctx.address, effect),
            }
        }
        match &result {
            Ok(()) => debug!(address = %ctx.address, id = %self.id, action = %self.action, "command completed"),
            Err(e) => debug!(address = %ctx.address, id = %self.id, action = %self.action, error = %e, "command failed"),
        }
        let _ = self.responder.send(result);
    }
}

enum Caller {
    Client(InquiryResponder),
    Heartbeat,
}

impl Caller {
    fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

struct InquiryRequest {
    inquiry: Inquiry,
    frame: Bytes,
    caller: Caller,
}

impl InquiryRequest {
    fn resolve(self, ctx: &mut Ctx<'_>, result: Result<InquiryValue>) {
        match self.caller {
            Caller::Client(tx) => {
                let _ = tx.send(result);
            }
            // Anything that came off the wire proves the link, even a reply we can't decode
            Caller::Heartbeat => match result {
                Ok(_) | Err(Error::Camera(_)) | Err(Error::InvalidResponse(_)) => {
                    ctx.events.push(DispatchEvent::HeartbeatAnswered(ctx.address))
                }
                Err(Error::Timeout { .. }) => {
                    ctx.events.push(DispatchEvent::HeartbeatFailed(ctx.address))
                }
                Err(e) => {
                    trace!(address = %ctx.address, error = %e, "heartbeat abandoned");
                    ctx.events.push(DispatchEvent::HeartbeatAbandoned(ctx.address))
                }
            },
        }
    }
}

struct PendingCommand {
    ticket: Ticket,
    sent_at: Instant,
    /// Set once the camera bound the command to a socket
    acked_at: Option<Instant>,
    retries: u32,
    /// Cancel requested before the Ack named the socket
    abort: Option<Abort>,
}

impl PendingCommand {
    fn in_flight(&self) -> bool {
        self.acked_at.is_some()
    }
}

struct PendingInquiry {
    request: InquiryRequest,
    sent_at: Instant,
    retries: u32,
}

enum Queued {
    Command(Ticket),
    Inquiry(InquiryRequest),
}

impl Queued {
    fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Inquiry(r) if r.caller.is_heartbeat())
    }

    fn fail(self, ctx: &mut Ctx<'_>, error: Error) {
        match self {
            Self::Command(ticket) => ticket.resolve(ctx, Err(error)),
            Self::Inquiry(request) => request.resolve(ctx, Err(error)),
        }
    }
}

/// The frame waiting for its first answer
enum Awaiting {
    /// Command sent on a provisional socket, relocated when the Ack names one
    Command(Socket),
    Inquiry(PendingInquiry),
}

struct Ctx<'a> {
    address: Address,
    now: Instant,
    link_up: bool,
    config: &'a DispatchConfig,
    store: &'a StateStore,
    outbox: &'a mut Vec<(Address, Bytes)>,
    events: &'a mut Vec<DispatchEvent>,
}

impl Ctx<'_> {
    fn send(&mut self, frame: Bytes) {
        trace!(address = %self.address, bytes = %HexBytes(&frame), "queued for write");
        self.outbox.push((self.address, frame));
    }
}

#[derive(Default)]
struct CameraSlot {
    sockets: SocketTable<PendingCommand>,
    awaiting: Option<Awaiting>,
    queue: VecDeque<Queued>,
    /// Sockets whose cancel echo or late completion is still due
    echoes: SocketTable<()>,
    /// An interface clear is waiting for its `50` reply
    clear_pending: bool,
}

impl CameraSlot {
    fn queued_requests(&self) -> usize {
        self.queue.iter().filter(|q| !q.is_heartbeat()).count()
    }

    /// Send the next frame if nothing is waiting for an answer
    fn pump(&mut self, ctx: &mut Ctx<'_>) {
        if !ctx.link_up || self.awaiting.is_some() {
            return;
        }

        let table_full = self.sockets.is_full();
        let Some(index) = self.queue.iter().position(|q| match q {
            Queued::Inquiry(_) => true,
            Queued::Command(_) => !table_full,
        }) else {
            return;
        };

        match self.queue.remove(index) {
            Some(Queued::Command(ticket)) => {
                let Some(socket) = self.sockets.free_socket() else {
                    self.queue.insert(index, Queued::Command(ticket));
                    return;
                };
                debug!(address = %ctx.address, id = %ticket.id, action = %ticket.action, "sending command");
                ctx.send(ticket.frame.clone());
                self.sockets.insert(
                    socket,
                    PendingCommand {
                        ticket,
                        sent_at: ctx.now,
                        acked_at: None,
                        retries: 0,
                        abort: None,
                    },
                );
                self.awaiting = Some(Awaiting::Command(socket));
            }
            Some(Queued::Inquiry(request)) => {
                debug!(address = %ctx.address, inquiry = %request.inquiry, "sending inquiry");
                ctx.send(request.frame.clone());
                self.awaiting = Some(Awaiting::Inquiry(PendingInquiry {
                    request,
                    sent_at: ctx.now,
                    retries: 0,
                }));
            }
            None => {}
        }
    }

    /// Send the cancel frame for an in-flight command and resolve it
    fn abort_in_flight(&mut self, socket: Socket, command: PendingCommand, abort: Abort, ctx: &mut Ctx<'_>) {
        debug!(address = %ctx.address, id = %command.ticket.id, %socket, ?abort, "canceling in-flight command");
        ctx.send(cancel_frame(ctx.address, socket).to_bytes());
        self.echoes.insert(socket, ());
        command.ticket.resolve(ctx, Err(abort.error()));
    }

    fn supersede(&mut self, group: MotionGroup, ctx: &mut Ctx<'_>) {
        for entry in std::mem::take(&mut self.queue) {
            match entry {
                Queued::Command(ticket) if ticket.action.motion_group() == Some(group) => {
                    ticket.resolve(ctx, Err(Error::Superseded))
                }
                other => self.queue.push_back(other),
            }
        }

        let sent: Vec<Socket> = self
            .sockets
            .iter()
            .filter(|(_, c)| c.ticket.action.motion_group() == Some(group))
            .map(|(s, _)| s)
            .collect();
        for socket in sent {
            if self.sockets.get(socket).is_some_and(PendingCommand::in_flight) {
                if let Some(command) = self.sockets.remove(socket) {
                    self.abort_in_flight(socket, command, Abort::Superseded, ctx);
                }
            } else if let Some(command) = self.sockets.get_mut(socket) {
                command.abort = Some(Abort::Superseded);
            }
        }
    }

    fn cancel(&mut self, id: CommandId, ctx: &mut Ctx<'_>) -> bool {
        let queued = self
            .queue
            .iter()
            .position(|q| matches!(q, Queued::Command(t) if t.id == id));
        if let Some(index) = queued {
            if let Some(entry) = self.queue.remove(index) {
                entry.fail(ctx, Error::Canceled);
            }
            return true;
        }

        let Some(socket) = self.sockets.find(|c| c.ticket.id == id) else {
            return false;
        };
        if self.sockets.get(socket).is_some_and(PendingCommand::in_flight) {
            if let Some(command) = self.sockets.remove(socket) {
                self.abort_in_flight(socket, command, Abort::Canceled, ctx);
            }
            self.pump(ctx);
        } else if let Some(command) = self.sockets.get_mut(socket) {
            debug!(address = %ctx.address, %id, "cancel deferred until the command is acknowledged");
            command.abort = Some(Abort::Canceled);
        }
        true
    }

    fn on_ack(&mut self, socket: Socket, ctx: &mut Ctx<'_>) -> bool {
        let Some(Awaiting::Command(provisional)) = self.awaiting else {
            return false;
        };
        self.awaiting = None;

        // Cameras only reuse sockets whose command has finished
        if let Some(displaced) = self.sockets.relocate(provisional, socket) {
            debug!(address = %ctx.address, id = %displaced.ticket.id, %socket, "socket reused, treating previous command as completed");
            displaced.ticket.resolve(ctx, Ok(()));
        }
        self.echoes.remove(socket);

        let abort = match self.sockets.get_mut(socket) {
            Some(command) => {
                command.acked_at = Some(ctx.now);
                trace!(address = %ctx.address, id = %command.ticket.id, %socket, "acknowledged");
                command.abort.take()
            }
            None => None,
        };
        if let Some(abort) = abort {
            if let Some(command) = self.sockets.remove(socket) {
                self.abort_in_flight(socket, command, abort, ctx);
            }
        }
        true
    }

    fn on_completion(&mut self, socket: Socket, ctx: &mut Ctx<'_>) -> bool {
        if self.sockets.get(socket).is_some_and(PendingCommand::in_flight) {
            if let Some(command) = self.sockets.remove(socket) {
                command.ticket.resolve(ctx, Ok(()));
            }
            return true;
        }
        if self.echoes.remove(socket).is_some() {
            trace!(address = %ctx.address, %socket, "late completion of a canceled command");
            return true;
        }
        // The Ack was lost; the completion answers the waiting command
        if let Some(Awaiting::Command(provisional)) = self.awaiting {
            self.awaiting = None;
            if let Some(command) = self.sockets.remove(provisional) {
                command.ticket.resolve(ctx, Ok(()));
            }
            return true;
        }
        false
    }

    fn on_error(&mut self, socket: Option<Socket>, error: CameraError, ctx: &mut Ctx<'_>) -> bool {
        let Some(socket) = socket else {
            return match self.awaiting.take() {
                Some(Awaiting::Command(provisional)) => {
                    if let Some(command) = self.sockets.remove(provisional) {
                        warn!(address = %ctx.address, id = %command.ticket.id, %error, "camera rejected command");
                        command.ticket.resolve(ctx, Err(Error::Camera(error)));
                    }
                    true
                }
                Some(Awaiting::Inquiry(pending)) => {
                    warn!(address = %ctx.address, inquiry = %pending.request.inquiry, %error, "camera rejected inquiry");
                    pending.request.resolve(ctx, Err(Error::Camera(error)));
                    true
                }
                None => false,
            };
        };

        if self.sockets.get(socket).is_some_and(PendingCommand::in_flight) {
            if let Some(command) = self.sockets.remove(socket) {
                warn!(address = %ctx.address, id = %command.ticket.id, %socket, %error, "command failed on camera");
                command.ticket.resolve(ctx, Err(Error::Camera(error)));
            }
            return true;
        }
        if self.echoes.remove(socket).is_some() {
            trace!(address = %ctx.address, %socket, %error, "cancel echo");
            return true;
        }
        // Rejected before the Ack, tagged with the socket it would have used
        if let Some(Awaiting::Command(provisional)) = self.awaiting {
            self.awaiting = None;
            if let Some(command) = self.sockets.remove(provisional) {
                warn!(address = %ctx.address, id = %command.ticket.id, %socket, %error, "camera rejected command");
                let result = match command.abort {
                    Some(abort) => Err(abort.error()),
                    None => Err(Error::Camera(error)),
                };
                command.ticket.resolve(ctx, result);
            }
            return true;
        }
        false
    }

    fn on_inquiry_reply(&mut self, payload: &[u8], ctx: &mut Ctx<'_>) -> bool {
        if payload.is_empty() && self.clear_pending {
            self.clear_pending = false;
            debug!(address = %ctx.address, "interface cleared");
            return true;
        }

        match self.awaiting.take() {
            Some(Awaiting::Inquiry(pending)) => {
                let result = pending.request.inquiry.decode_reply(payload);
                match result {
                    Ok(value) => {
                        debug!(address = %ctx.address, %value, "inquiry answered");
                        ctx.store.apply_inquiry(ctx.address, &value);
                        pending.request.resolve(ctx, Ok(value));
                    }
                    Err(e) => {
                        warn!(address = %ctx.address, error = %e, "undecodable inquiry reply");
                        pending.request.resolve(ctx, Err(Error::InvalidResponse(e.to_string())));
                    }
                }
                true
            }
            other => {
                self.awaiting = other;
                false
            }
        }
    }

    fn check_timeouts(&mut self, ctx: &mut Ctx<'_>) {
        let ack_timeout = ctx.config.ack_timeout;
        let max_retries = ctx.config.max_retries;
        let now = ctx.now;

        if let Some(Awaiting::Command(socket)) = self.awaiting {
            let mut give_up = None;
            if let Some(command) = self.sockets.get_mut(socket) {
                if now.duration_since(command.sent_at) >= ack_timeout {
                    if command.retries < max_retries {
                        command.retries += 1;
                        command.sent_at = now;
                        warn!(address = %ctx.address, id = %command.ticket.id, retry = command.retries, "no ack, resending command");
                        ctx.send(command.ticket.frame.clone());
                    } else {
                        give_up = Some(command.retries + 1);
                    }
                }
            }
            if let Some(attempts) = give_up {
                self.awaiting = None;
                if let Some(command) = self.sockets.remove(socket) {
                    warn!(address = %ctx.address, id = %command.ticket.id, attempts, "command unanswered");
                    let error = match command.abort {
                        Some(abort) => abort.error(),
                        None => Error::Timeout { attempts },
                    };
                    command.ticket.resolve(ctx, Err(error));
                }
                ctx.events.push(DispatchEvent::LinkSuspect(ctx.address));
            }
        }

        let mut give_up = None;
        if let Some(Awaiting::Inquiry(pending)) = &mut self.awaiting {
            if now.duration_since(pending.sent_at) >= ack_timeout {
                if pending.retries < max_retries {
                    pending.retries += 1;
                    pending.sent_at = now;
                    warn!(address = %ctx.address, inquiry = %pending.request.inquiry, retry = pending.retries, "no reply, resending inquiry");
                    ctx.send(pending.request.frame.clone());
                } else {
                    give_up = Some(pending.retries + 1);
                }
            }
        }
        if let Some(attempts) = give_up {
            if let Some(Awaiting::Inquiry(pending)) = self.awaiting.take() {
                warn!(address = %ctx.address, inquiry = %pending.request.inquiry, attempts, "inquiry unanswered");
                if !pending.request.caller.is_heartbeat() {
                    ctx.events.push(DispatchEvent::LinkSuspect(ctx.address));
                }
                pending.request.resolve(ctx, Err(Error::Timeout { attempts }));
            }
        }

        let completion_timeout = ctx.config.completion_timeout;
        let expired: Vec<Socket> = self
            .sockets
            .iter()
            .filter(|(_, c)| c.acked_at.is_some_and(|t| now.duration_since(t) >= completion_timeout))
            .map(|(s, _)| s)
            .collect();
        for socket in expired {
            if let Some(command) = self.sockets.remove(socket) {
                warn!(address = %ctx.address, id = %command.ticket.id, %socket, "command never completed");
                let attempts = command.retries + 1;
                command.ticket.resolve(ctx, Err(Error::Timeout { attempts }));
            }
        }
    }

    /// Fail everything already on the wire
    fn fail_sent(&mut self, ctx: &mut Ctx<'_>, error: impl Fn() -> Error) {
        if let Some(Awaiting::Inquiry(pending)) = self.awaiting.take() {
            pending.request.resolve(ctx, Err(error()));
        }
        for (_, command) in self.sockets.drain() {
            command.ticket.resolve(ctx, Err(error()));
        }
        self.echoes = SocketTable::new();
        self.clear_pending = false;
    }

    fn link_lost(&mut self, reason: &str, ctx: &mut Ctx<'_>) {
        self.fail_sent(ctx, || Error::IoFailure(reason.to_string()));

        for entry in std::mem::take(&mut self.queue) {
            match entry {
                Queued::Command(ticket) if !ticket.action.is_directional() => {
                    self.queue.push_back(Queued::Command(ticket))
                }
                stale => stale.fail(ctx, Error::NotConnected),
            }
        }
    }

    fn shutdown(&mut self, ctx: &mut Ctx<'_>) {
        self.fail_sent(ctx, || Error::Shutdown);
        for entry in std::mem::take(&mut self.queue) {
            entry.fail(ctx, Error::Shutdown);
        }
    }

    fn clear(&mut self, ctx: &mut Ctx<'_>) -> Result<()> {
        for entry in std::mem::take(&mut self.queue) {
            entry.fail(ctx, Error::Canceled);
        }
        let running: Vec<Socket> = self
            .sockets
            .iter()
            .filter(|(_, c)| c.in_flight())
            .map(|(s, _)| s)
            .collect();
        self.fail_sent(ctx, || Error::Canceled);

        if !ctx.link_up {
            return Err(Error::NotConnected);
        }
        for socket in running {
            self.echoes.insert(socket, ());
        }
        ctx.send(if_clear_frame(ctx.address).to_bytes());
        self.clear_pending = true;
        Ok(())
    }
}

/// Per-camera request scheduling
pub struct Dispatcher {
    config: DispatchConfig,
    cameras: BTreeMap<Address, CameraSlot>,
    store: StateStore,
    outbox: Vec<(Address, Bytes)>,
    events: Vec<DispatchEvent>,
    link_up: bool,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, store: StateStore) -> Self {
        let cameras = store
            .snapshot()
            .keys()
            .map(|address| (*address, CameraSlot::default()))
            .collect();
        Self {
            config,
            cameras,
            store,
            outbox: Vec::new(),
            events: Vec::new(),
            link_up: false,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    fn with_slot<R>(
        &mut self,
        address: Address,
        now: Instant,
        f: impl FnOnce(&mut CameraSlot, &mut Ctx<'_>) -> R,
    ) -> R {
        let slot = self.cameras.entry(address).or_default();
        let mut ctx = Ctx {
            address,
            now,
            link_up: self.link_up,
            config: &self.config,
            store: &self.store,
            outbox: &mut self.outbox,
            events: &mut self.events,
        };
        f(slot, &mut ctx)
    }

    fn for_each_slot(&mut self, now: Instant, mut f: impl FnMut(&mut CameraSlot, &mut Ctx<'_>)) {
        let addresses: Vec<Address> = self.cameras.keys().copied().collect();
        for address in addresses {
            self.with_slot(address, now, &mut f);
        }
    }

    /// Queue an encoded command
    pub fn submit_command(
        &mut self,
        id: CommandId,
        address: Address,
        action: Action,
        frame: Bytes,
        responder: CommandResponder,
        now: Instant,
    ) {
        let ticket = Ticket {
            id,
            action,
            frame,
            responder,
        };
        self.with_slot(address, now, |slot, ctx| {
            if !ctx.link_up && action.is_directional() {
                ticket.resolve(ctx, Err(Error::NotConnected));
                return;
            }
            if ctx.config.supersede_motion {
                if let Some(group) = action.motion_group() {
                    slot.supersede(group, ctx);
                }
            }
            if slot.queued_requests() >= ctx.config.queue_depth {
                warn!(address = %ctx.address, %id, "request queue full");
                ticket.resolve(ctx, Err(Error::QueueFull));
                return;
            }

            if let Some(effect) = action.effect() {
                ctx.store.propose(ctx.address, effect);
            }
            debug!(address = %ctx.address, %id, %action, "command queued");
            slot.queue.push_back(Queued::Command(ticket));
            slot.pump(ctx);
        });
    }

    pub fn submit_inquiry(
        &mut self,
        address: Address,
        inquiry: Inquiry,
        responder: InquiryResponder,
        now: Instant,
    ) {
        let request = InquiryRequest {
            inquiry,
            frame: inquiry.encode(address).to_bytes(),
            caller: Caller::Client(responder),
        };
        self.with_slot(address, now, |slot, ctx| {
            if !ctx.link_up {
                request.resolve(ctx, Err(Error::NotConnected));
                return;
            }
            if slot.queued_requests() >= ctx.config.queue_depth {
                request.resolve(ctx, Err(Error::QueueFull));
                return;
            }
            slot.queue.push_back(Queued::Inquiry(request));
            slot.pump(ctx);
        });
    }

    /// Put a power inquiry at the head of the camera's queue
    pub fn heartbeat(&mut self, address: Address, now: Instant) {
        if !self.link_up {
            return;
        }
        let request = InquiryRequest {
            inquiry: Inquiry::Power,
            frame: Inquiry::Power.encode(address).to_bytes(),
            caller: Caller::Heartbeat,
        };
        self.with_slot(address, now, |slot, ctx| {
            trace!(address = %ctx.address, "heartbeat");
            slot.queue.push_front(Queued::Inquiry(request));
            slot.pump(ctx);
        });
    }

    /// Cancel a queued or running command
    ///
    /// # Errors
    ///
    /// `UnknownCommand` when no camera has a command with this id.
    pub fn cancel(&mut self, id: CommandId, now: Instant) -> Result<()> {
        let addresses: Vec<Address> = self.cameras.keys().copied().collect();
        for address in addresses {
            if self.with_slot(address, now, |slot, ctx| slot.cancel(id, ctx)) {
                return Ok(());
            }
        }
        Err(Error::UnknownCommand(id))
    }

    /// Drop the camera's work and send an interface clear
    pub fn clear_camera(&mut self, address: Address, now: Instant) -> Result<()> {
        self.with_slot(address, now, |slot, ctx| slot.clear(ctx))
    }

    pub fn handle_frame(&mut self, frame: Frame, now: Instant) {
        let reply = match frame.reply() {
            Ok(reply) => reply,
            Err(e) => {
                debug!(%frame, error = %e, "not a camera reply");
                self.events.push(DispatchEvent::Unsolicited(frame));
                return;
            }
        };

        let address = reply.from();
        let handled = match reply {
            Reply::AddressSet { .. } | Reply::NetworkChange { .. } => false,
            _ if !self.cameras.contains_key(&address) => false,
            reply => self.with_slot(address, now, |slot, ctx| {
                let handled = match reply {
                    Reply::Ack { socket, .. } => slot.on_ack(socket, ctx),
                    Reply::Completion { socket, .. } => slot.on_completion(socket, ctx),
                    Reply::Error { socket, error, .. } => slot.on_error(socket, error, ctx),
                    Reply::InquiryReply { payload, .. } => slot.on_inquiry_reply(&payload, ctx),
                    Reply::AddressSet { .. } | Reply::NetworkChange { .. } => false,
                };
                slot.pump(ctx);
                handled
            }),
        };

        if !handled {
            debug!(%frame, "unsolicited frame");
            self.events.push(DispatchEvent::Unsolicited(frame));
        }
    }

    /// Resend or fail requests whose answer is overdue
    pub fn check_timeouts(&mut self, now: Instant) {
        self.for_each_slot(now, |slot, ctx| {
            slot.check_timeouts(ctx);
            slot.pump(ctx);
        });
    }

    /// The link came up; start sending queued work
    pub fn link_up(&mut self, now: Instant) {
        self.link_up = true;
        self.for_each_slot(now, |slot, ctx| slot.pump(ctx));
    }

    /// The link went down under outstanding requests
    pub fn link_lost(&mut self, reason: &str) {
        self.link_up = false;
        self.for_each_slot(Instant::now(), |slot, ctx| slot.link_lost(reason, ctx));
    }

    /// Fail every request
    pub fn shutdown(&mut self) {
        self.link_up = false;
        self.for_each_slot(Instant::now(), |slot, ctx| slot.shutdown(ctx));
        self.outbox.clear();
    }

    pub fn take_outbox(&mut self) -> Vec<(Address, Bytes)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> Vec<DispatchEvent> {
        std::mem::take(&mut self.events)
    }

    /// Commands holding a socket on `address`
    pub fn pending_commands(&self, address: Address) -> usize {
        self.cameras.get(&address).map_or(0, |slot| slot.sockets.len())
    }

    /// Requests waiting to be sent to `address`
    pub fn queued(&self, address: Address) -> usize {
        self.cameras.get(&address).map_or(0, CameraSlot::queued_requests)
    }
}
