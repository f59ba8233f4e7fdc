//! RFC 2217 (telnet COM port control) transport
//!
//! A serial device server exposes the camera's serial line over telnet.
//! After the TCP connection is up we agree on binary mode and the COM port
//! option, then set the line to `baud`/8N1 without flow control.
//!
//! Negotiation:
//!
//! ```text
//! client                                  server
//!   WILL/DO BINARY, WILL/DO SGA  ────────▶
//!   WILL COM-PORT-OPTION         ────────▶
//!   SB SET-BAUDRATE .. SET-CONTROL ──────▶
//!                                ◀──────── DO COM-PORT-OPTION
//!                                ◀──────── SB <responses> SE
//! ```

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{LinkKind, LinkOptions, Transport, error::*, tcp::TcpTransport};

mod telnet {
    pub const IAC: u8 = 255;
    pub const DONT: u8 = 254;
    pub const DO: u8 = 253;
    pub const WONT: u8 = 252;
    pub const WILL: u8 = 251;
    pub const SB: u8 = 250;
    pub const SE: u8 = 240;

    pub const BINARY: u8 = 0;
    pub const SGA: u8 = 3;
    pub const COM_PORT: u8 = 44;

    pub const SET_BAUDRATE: u8 = 1;
    pub const SET_DATASIZE: u8 = 2;
    pub const SET_PARITY: u8 = 3;
    pub const SET_STOPSIZE: u8 = 4;
    pub const SET_CONTROL: u8 = 5;
    pub const NOTIFY_LINESTATE: u8 = 106;
    pub const NOTIFY_MODEMSTATE: u8 = 107;

    /// Server replies echo the client sub-command plus this offset
    pub const SERVER_OFFSET: u8 = 100;

    pub const PARITY_NONE: u8 = 1;
    pub const STOPSIZE_ONE: u8 = 1;
    pub const CONTROL_NONE: u8 = 1;
}

use telnet::*;

/// State of the COM port option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComPortStatus {
    Pending,
    Accepted,
    Refused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Data,
    Iac,
    Verb(u8),
    Sub,
    SubIac,
}

/// Output of one decode step
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Serial payload with telnet framing removed
    pub data: BytesMut,
    /// Negotiation answers to send back
    pub replies: BytesMut,
}

/// Telnet stream codec
///
/// Pure state machine: escapes outgoing data, strips telnet commands from
/// incoming data and tracks the option negotiation.
#[derive(Debug)]
pub struct TelnetCodec {
    state: ParseState,
    sub: Vec<u8>,
    answered: HashSet<(u8, u8)>,
    com_port: ComPortStatus,
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetCodec {
    /// Options we offer (WILL) and request (DO)
    const OFFERED: [u8; 3] = [BINARY, SGA, COM_PORT];
    const REQUESTED: [u8; 2] = [BINARY, SGA];

    pub fn new() -> Self {
        Self {
            state: ParseState::Data,
            sub: Vec::new(),
            answered: HashSet::new(),
            com_port: ComPortStatus::Pending,
        }
    }

    pub fn com_port(&self) -> ComPortStatus {
        self.com_port
    }

    /// Opening negotiation for a line at `baud`/8N1
    pub fn negotiation(baud: u32) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64);
        for option in Self::OFFERED {
            buf.put_slice(&[IAC, WILL, option]);
            if Self::REQUESTED.contains(&option) {
                buf.put_slice(&[IAC, DO, option]);
            }
        }

        let mut sub = |command: u8, value: &[u8]| {
            buf.put_slice(&[IAC, SB, COM_PORT, command]);
            buf.put_slice(&Self::escape(value));
            buf.put_slice(&[IAC, SE]);
        };
        sub(SET_BAUDRATE, &baud.to_be_bytes());
        sub(SET_DATASIZE, &[8]);
        sub(SET_PARITY, &[PARITY_NONE]);
        sub(SET_STOPSIZE, &[STOPSIZE_ONE]);
        sub(SET_CONTROL, &[CONTROL_NONE]);
        buf
    }

    /// Double every IAC byte
    pub fn escape(data: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(data.len() + 4);
        for &b in data {
            if b == IAC {
                buf.put_u8(IAC);
            }
            buf.put_u8(b);
        }
        buf
    }

    /// Split received bytes into payload and negotiation answers
    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for &b in input {
            self.state = match (self.state, b) {
                (ParseState::Data, IAC) => ParseState::Iac,
                (ParseState::Data, _) => {
                    out.data.put_u8(b);
                    ParseState::Data
                }
                (ParseState::Iac, IAC) => {
                    out.data.put_u8(IAC);
                    ParseState::Data
                }
                (ParseState::Iac, WILL | WONT | DO | DONT) => ParseState::Verb(b),
                (ParseState::Iac, SB) => {
                    self.sub.clear();
                    ParseState::Sub
                }
                (ParseState::Iac, _) => ParseState::Data,
                (ParseState::Verb(verb), option) => {
                    self.negotiate(verb, option, &mut out.replies);
                    ParseState::Data
                }
                (ParseState::Sub, IAC) => ParseState::SubIac,
                (ParseState::Sub, _) => {
                    self.sub.push(b);
                    ParseState::Sub
                }
                (ParseState::SubIac, IAC) => {
                    self.sub.push(IAC);
                    ParseState::Sub
                }
                (ParseState::SubIac, SE) => {
                    self.subnegotiation();
                    ParseState::Data
                }
                (ParseState::SubIac, _) => ParseState::Sub,
            };
        }

        out
    }

    fn negotiate(&mut self, verb: u8, option: u8, replies: &mut BytesMut) {
        match verb {
            DO if Self::OFFERED.contains(&option) => {
                trace!(option, "server DO");
                if option == COM_PORT {
                    self.com_port = ComPortStatus::Accepted;
                }
            }
            WILL if Self::REQUESTED.contains(&option) => trace!(option, "server WILL"),
            WILL if option == COM_PORT => self.com_port = ComPortStatus::Accepted,
            DONT | WONT if option == COM_PORT => self.com_port = ComPortStatus::Refused,
            DONT | WONT => trace!(verb, option, "server declined"),
            DO | WILL => {
                let answer = if verb == DO { WONT } else { DONT };
                if self.answered.insert((verb, option)) {
                    debug!(option, "refusing unsolicited telnet option");
                    replies.put_slice(&[IAC, answer, option]);
                }
            }
            _ => {}
        }
    }

    fn subnegotiation(&mut self) {
        let [option, command, value @ ..] = self.sub.as_slice() else {
            return;
        };
        if *option != COM_PORT {
            return;
        }
        match command.wrapping_sub(SERVER_OFFSET) {
            SET_BAUDRATE if value.len() == 4 => {
                let baud = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                debug!(baud, "server set baud rate");
            }
            _ if *command == NOTIFY_LINESTATE || *command == NOTIFY_MODEMSTATE => {
                trace!(command, value = ?value, "server notification");
            }
            _ => trace!(command, value = ?value, "server COM port reply"),
        }
    }
}

/// Telnet serial bridge transport
pub struct Rfc2217Transport {
    inner: TcpTransport,
    codec: TelnetCodec,
    baud_rate: u32,
    negotiation_timeout: Duration,
    pending: BytesMut,
}

impl Rfc2217Transport {
    pub fn new(host: impl Into<String>, port: u16, options: &LinkOptions) -> Self {
        Self {
            inner: TcpTransport::new(host, port).with_connect_timeout(options.connect_timeout),
            codec: TelnetCodec::new(),
            baud_rate: options.baud_rate,
            negotiation_timeout: options.negotiation_timeout,
            pending: BytesMut::new(),
        }
    }

    /// Run received bytes through the codec, answering negotiation
    async fn absorb(&mut self, raw: &[u8]) -> Result<BytesMut> {
        let decoded = self.codec.decode(raw);
        if !decoded.replies.is_empty() {
            self.inner.write(&decoded.replies).await?;
        }
        Ok(decoded.data)
    }

    async fn negotiate(&mut self) -> Result<()> {
        self.inner
            .write(&TelnetCodec::negotiation(self.baud_rate))
            .await?;

        let deadline = Instant::now() + self.negotiation_timeout;
        loop {
            match self.codec.com_port() {
                ComPortStatus::Accepted => return Ok(()),
                ComPortStatus::Refused => {
                    return Err(Error::Negotiation(
                        "server refused the COM port option".into(),
                    ));
                }
                ComPortStatus::Pending => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Negotiation(format!(
                    "no answer within {:?}",
                    self.negotiation_timeout
                )));
            }

            let raw = self.inner.read_available(remaining).await?;
            let data = self.absorb(&raw).await?;
            self.pending.extend_from_slice(&data);
        }
    }
}

#[async_trait]
impl Transport for Rfc2217Transport {
    async fn open(&mut self) -> Result<()> {
        self.inner.open().await?;
        self.codec = TelnetCodec::new();
        self.pending.clear();

        if let Err(e) = self.negotiate().await {
            warn!(error = %e, remote = %self.inner.remote_addr(), "RFC 2217 negotiation failed");
            let _ = self.inner.close().await;
            return Err(e);
        }

        info!(
            remote = %self.inner.remote_addr(),
            baud = self.baud_rate,
            "RFC 2217 port ready"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.inner.close().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(&TelnetCodec::escape(data)).await
    }

    async fn read_available(&mut self, wait: Duration) -> Result<BytesMut> {
        if !self.pending.is_empty() {
            return Ok(self.pending.split());
        }
        let raw = self.inner.read_available(wait).await?;
        self.absorb(&raw).await
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn remote_addr(&self) -> String {
        self.inner.remote_addr()
    }

    fn kind(&self) -> LinkKind {
        LinkKind::Rfc2217
    }
}
