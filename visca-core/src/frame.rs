//! VISCA frame structure, encoding and reply classification

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    address::Address,
    constants::{MAX_FRAME_LEN, TERMINATOR, category, reply},
    error::{CameraError, Error, HexBytes, Result},
    socket::Socket,
};

/// VISCA frame
///
/// # Frame Structure
///
/// ```text
/// ┌──────────┬───────────────────────┬────────────┐
/// │  Header  │         Body          │ Terminator │
/// │  1 byte  │     1-14 bytes        │    0xFF    │
/// └──────────┴───────────────────────┴────────────┘
/// ```
///
/// The header is `0x80 | address` on frames sent to a camera and
/// `(address + 8) << 4` on replies. The body never contains `0xFF`.
///
/// # Examples
///
/// ```
/// use visca_core::{Frame, Reply};
///
/// let frame = Frame::decode(&[0x90, 0x41, 0xFF]).unwrap();
/// assert!(matches!(frame.reply().unwrap(), Reply::Ack { .. }));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Header (address) byte
    pub header: u8,

    /// Message bytes between header and terminator
    pub body: Bytes,
}

/// Frame classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Command,
    Inquiry,
    Cancel,
    AddressSet,
    Ack,
    Completion,
    InquiryReply,
    ErrorReply,
    NetworkChange,
    Unknown,
}

/// Decoded reply from a camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command accepted and running on `socket`
    Ack { from: Address, socket: Socket },

    /// Command on `socket` finished
    Completion { from: Address, socket: Socket },

    /// Answer to an inquiry
    InquiryReply { from: Address, payload: Bytes },

    /// Command or inquiry rejected; socket 0 refers to the last sent frame
    Error {
        from: Address,
        socket: Option<Socket>,
        error: CameraError,
    },

    /// Address-set broadcast came back; `next` is one past the last camera
    AddressSet { next: u8 },

    /// Camera was added to or removed from the chain
    NetworkChange { from: Address },
}

impl Reply {
    pub fn from(&self) -> Address {
        match self {
            Self::Ack { from, .. }
            | Self::Completion { from, .. }
            | Self::InquiryReply { from, .. }
            | Self::Error { from, .. }
            | Self::NetworkChange { from } => *from,
            Self::AddressSet { .. } => Address::BROADCAST,
        }
    }
}

impl Frame {
    /// Largest frame in bytes, terminator included
    pub const MAX_LEN: usize = MAX_FRAME_LEN;

    pub fn new(header: u8, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Ack from `from` on `socket`
    pub fn ack(from: Address, socket: Socket) -> Self {
        Self::new(
            from.reply_header(),
            Bytes::copy_from_slice(&[reply::ACK | socket.get()]),
        )
    }

    /// Completion from `from` on `socket`
    pub fn completion(from: Address, socket: Socket) -> Self {
        Self::new(
            from.reply_header(),
            Bytes::copy_from_slice(&[reply::COMPLETION | socket.get()]),
        )
    }

    /// Error reply from `from`
    pub fn error(from: Address, socket: Option<Socket>, error: CameraError) -> Self {
        let socket = socket.map(Socket::get).unwrap_or(0);
        Self::new(
            from.reply_header(),
            Bytes::copy_from_slice(&[reply::ERROR | socket, error.code()]),
        )
    }

    /// Inquiry reply from `from`
    pub fn inquiry_reply(from: Address, payload: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(1 + payload.len());
        body.put_u8(reply::COMPLETION);
        body.put_slice(payload);
        Self::new(from.reply_header(), body.freeze())
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.body.len() + 2
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Encode to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u8(self.header);
        buf.put_slice(&self.body);
        buf.put_u8(TERMINATOR);
        buf
    }

    pub fn to_bytes(&self) -> Bytes {
        self.encode().freeze()
    }

    /// Decode exactly one frame, terminator included
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer does not end with the terminator
    /// - The header lacks bit 7 or the body contains a terminator
    /// - The frame is longer than `MAX_LEN`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() > Self::MAX_LEN {
            return Err(Error::FrameTooLong {
                len: buf.len(),
                max: Self::MAX_LEN,
            });
        }

        let Some((&TERMINATOR, rest)) = buf.split_last() else {
            return Err(Error::MalformedFrame(format!(
                "missing terminator in [{}]",
                HexBytes(buf)
            )));
        };

        let Some((&header, body)) = rest.split_first() else {
            return Err(Error::MalformedFrame("empty frame".into()));
        };

        if header & 0x80 == 0 || header == TERMINATOR {
            return Err(Error::MalformedFrame(format!("bad header 0x{header:02X}")));
        }

        if body.contains(&TERMINATOR) {
            return Err(Error::MalformedFrame("terminator inside body".into()));
        }

        Ok(Self::new(header, Bytes::copy_from_slice(body)))
    }

    fn is_command_header(&self) -> bool {
        self.header & 0xF0 == 0x80 && (1..=8).contains(&(self.header & 0x0F))
    }

    /// Classify by header and leading body byte
    pub fn kind(&self) -> FrameKind {
        let Some(&lead) = self.body.first() else {
            return FrameKind::Unknown;
        };

        match lead {
            category::COMMAND if self.is_command_header() => FrameKind::Command,
            category::INQUIRY if self.is_command_header() => FrameKind::Inquiry,
            0x21..=0x2F if self.is_command_header() => FrameKind::Cancel,
            reply::ADDRESS_SET => FrameKind::AddressSet,
            reply::NETWORK_CHANGE => FrameKind::NetworkChange,
            0x40..=0x4F => FrameKind::Ack,
            reply::COMPLETION => FrameKind::InquiryReply,
            0x51..=0x5F => FrameKind::Completion,
            0x60..=0x6F => FrameKind::ErrorReply,
            _ => FrameKind::Unknown,
        }
    }

    /// Decode a reply frame
    ///
    /// # Errors
    ///
    /// `UnknownFrameType` for frames that are not camera replies,
    /// `MalformedFrame` or `InvalidSocket` for replies with bad contents.
    pub fn reply(&self) -> Result<Reply> {
        let kind = self.kind();
        let lead = self.body.first().copied().unwrap_or(0);

        if kind == FrameKind::AddressSet {
            let next = self
                .body
                .get(1)
                .copied()
                .ok_or_else(|| Error::MalformedFrame("address set without address".into()))?;
            return Ok(Reply::AddressSet { next });
        }

        let from = Address::from_reply_header(self.header).ok_or_else(|| {
            Error::MalformedFrame(format!("0x{:02X} is not a reply header", self.header))
        })?;
        let socket_nibble = lead & 0x0F;

        match kind {
            FrameKind::Ack => {
                self.expect_len(1)?;
                Ok(Reply::Ack {
                    from,
                    socket: Socket::new(socket_nibble)?,
                })
            }
            FrameKind::Completion => {
                self.expect_len(1)?;
                Ok(Reply::Completion {
                    from,
                    socket: Socket::new(socket_nibble)?,
                })
            }
            FrameKind::InquiryReply => Ok(Reply::InquiryReply {
                from,
                payload: self.body.slice(1..),
            }),
            FrameKind::ErrorReply => {
                self.expect_len(2)?;
                let socket = match socket_nibble {
                    0 => None,
                    n => Some(Socket::new(n)?),
                };
                Ok(Reply::Error {
                    from,
                    socket,
                    error: CameraError::from_code(self.body[1]),
                })
            }
            FrameKind::NetworkChange => Ok(Reply::NetworkChange { from }),
            _ => Err(Error::UnknownFrameType(lead)),
        }
    }

    fn expect_len(&self, len: usize) -> Result<()> {
        if self.body.len() != len {
            return Err(Error::MalformedFrame(format!(
                "expected {} body bytes, got [{}]",
                len,
                HexBytes(&self.body)
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind())
            .field("bytes", &HexBytes(&self.encode()).to_string())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexBytes(&self.encode()))
    }
}
