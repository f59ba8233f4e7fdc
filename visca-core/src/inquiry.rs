//! VISCA inquiry definitions and reply decoding

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use visca_types::{AeMode, FocusMode, PowerState, Speeds, WhiteBalance};

use crate::{
    address::Address,
    command::{FOCUS_POSITION_MAX, ZOOM_POSITION_MAX},
    constants::category,
    error::{Error, HexBytes, Result},
    frame::Frame,
    nibble,
};

/// Camera inquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inquiry {
    Power,
    ZoomPosition,
    FocusPosition,
    FocusMode,
    WhiteBalance,
    AeMode,
    PanTiltPosition,
    PanTiltMaxSpeed,
    Version,
}

/// Version inquiry reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionInfo {
    pub vendor: u16,
    pub model: u16,
    pub rom: u16,
    /// Command sockets the camera reports
    pub sockets: u8,
}

/// Decoded inquiry reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InquiryValue {
    Power(PowerState),
    ZoomPosition(u16),
    FocusPosition(u16),
    FocusMode(FocusMode),
    WhiteBalance(WhiteBalance),
    AeMode(AeMode),
    PanTiltPosition { pan: i16, tilt: i16 },
    PanTiltMaxSpeed { pan: u8, tilt: u8 },
    Version(VersionInfo),
}

impl Inquiry {
    /// Every inquiry, in the order a status refresh runs them
    pub const STATUS: [Inquiry; 7] = [
        Inquiry::Power,
        Inquiry::ZoomPosition,
        Inquiry::FocusPosition,
        Inquiry::FocusMode,
        Inquiry::WhiteBalance,
        Inquiry::AeMode,
        Inquiry::PanTiltPosition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Power => "CAM_PowerInq",
            Self::ZoomPosition => "CAM_ZoomPosInq",
            Self::FocusPosition => "CAM_FocusPosInq",
            Self::FocusMode => "CAM_FocusModeInq",
            Self::WhiteBalance => "CAM_WBModeInq",
            Self::AeMode => "CAM_AEModeInq",
            Self::PanTiltPosition => "Pan-tiltPosInq",
            Self::PanTiltMaxSpeed => "Pan-tiltMaxSpeedInq",
            Self::Version => "CAM_VersionInq",
        }
    }

    fn body(&self) -> [u8; 2] {
        match self {
            Self::Power => [0x04, 0x00],
            Self::ZoomPosition => [0x04, 0x47],
            Self::FocusPosition => [0x04, 0x48],
            Self::FocusMode => [0x04, 0x38],
            Self::WhiteBalance => [0x04, 0x35],
            Self::AeMode => [0x04, 0x39],
            Self::PanTiltPosition => [0x06, 0x12],
            Self::PanTiltMaxSpeed => [0x06, 0x11],
            Self::Version => [0x00, 0x02],
        }
    }

    /// Payload length of the reply, excluding the `50` byte
    pub fn reply_len(&self) -> usize {
        match self {
            Self::Power | Self::FocusMode | Self::WhiteBalance | Self::AeMode => 1,
            Self::ZoomPosition | Self::FocusPosition => 4,
            Self::PanTiltPosition => 8,
            Self::PanTiltMaxSpeed => 2,
            Self::Version => 7,
        }
    }

    /// Encode into an inquiry frame for `address`
    pub fn encode(&self, address: Address) -> Frame {
        let mut body = BytesMut::with_capacity(3);
        body.put_u8(category::INQUIRY);
        body.put_slice(&self.body());
        Frame::new(address.command_header(), body.freeze())
    }

    /// Decode a reply payload (the bytes after `50`)
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` when the payload has the wrong length or carries a
    /// value this inquiry cannot produce.
    pub fn decode_reply(&self, payload: &[u8]) -> Result<InquiryValue> {
        if payload.len() != self.reply_len() {
            return Err(self.unexpected(payload, "wrong length"));
        }

        let value = match self {
            Self::Power => PowerState::from_code(payload[0]).map(InquiryValue::Power),
            Self::FocusMode => FocusMode::from_code(payload[0]).map(InquiryValue::FocusMode),
            Self::WhiteBalance => {
                WhiteBalance::from_code(payload[0]).map(InquiryValue::WhiteBalance)
            }
            Self::AeMode => AeMode::from_code(payload[0]).map(InquiryValue::AeMode),
            Self::ZoomPosition => nibble::join(payload)
                .ok()
                .filter(|p| *p <= ZOOM_POSITION_MAX)
                .map(InquiryValue::ZoomPosition),
            Self::FocusPosition => nibble::join(payload)
                .ok()
                .filter(|p| *p <= FOCUS_POSITION_MAX)
                .map(InquiryValue::FocusPosition),
            Self::PanTiltPosition => {
                let pan = nibble::join(&payload[..4]).ok();
                let tilt = nibble::join(&payload[4..]).ok();
                pan.zip(tilt).map(|(pan, tilt)| InquiryValue::PanTiltPosition {
                    pan: pan as i16,
                    tilt: tilt as i16,
                })
            }
            Self::PanTiltMaxSpeed => {
                let (pan, tilt) = (payload[0], payload[1]);
                (pan <= Speeds::PAN_MAX && tilt <= Speeds::TILT_MAX)
                    .then_some(InquiryValue::PanTiltMaxSpeed { pan, tilt })
            }
            Self::Version => Some(InquiryValue::Version(VersionInfo {
                vendor: u16::from_be_bytes([payload[0], payload[1]]),
                model: u16::from_be_bytes([payload[2], payload[3]]),
                rom: u16::from_be_bytes([payload[4], payload[5]]),
                sockets: payload[6],
            })),
        };

        value.ok_or_else(|| self.unexpected(payload, "value out of range"))
    }

    /// Encode `value` as the reply payload this inquiry expects
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` when `value` answers a different inquiry,
    /// `InvalidParameter` when it is out of range.
    pub fn encode_reply(&self, value: &InquiryValue) -> Result<Bytes> {
        if value.inquiry() != *self {
            return Err(Error::UnexpectedReply {
                inquiry: self.name(),
                detail: format!("cannot answer with {value:?}"),
            });
        }
        value.payload()
    }

    fn unexpected(&self, payload: &[u8], reason: &str) -> Error {
        Error::UnexpectedReply {
            inquiry: self.name(),
            detail: format!("{reason}: [{}]", HexBytes(payload)),
        }
    }
}

impl fmt::Display for Inquiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl InquiryValue {
    /// Inquiry this value answers
    pub fn inquiry(&self) -> Inquiry {
        match self {
            Self::Power(_) => Inquiry::Power,
            Self::ZoomPosition(_) => Inquiry::ZoomPosition,
            Self::FocusPosition(_) => Inquiry::FocusPosition,
            Self::FocusMode(_) => Inquiry::FocusMode,
            Self::WhiteBalance(_) => Inquiry::WhiteBalance,
            Self::AeMode(_) => Inquiry::AeMode,
            Self::PanTiltPosition { .. } => Inquiry::PanTiltPosition,
            Self::PanTiltMaxSpeed { .. } => Inquiry::PanTiltMaxSpeed,
            Self::Version(_) => Inquiry::Version,
        }
    }

    /// Reply payload (the bytes after `50`)
    pub fn payload(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(8);
        match *self {
            Self::Power(power) => buf.put_u8(power.code()),
            Self::FocusMode(mode) => buf.put_u8(mode.code()),
            Self::WhiteBalance(wb) => buf.put_u8(wb.code()),
            Self::AeMode(mode) => buf.put_u8(mode.code()),
            Self::ZoomPosition(position) => {
                if position > ZOOM_POSITION_MAX {
                    return Err(Error::parameter("zoom_position", position, 0, ZOOM_POSITION_MAX as i64));
                }
                nibble::put(&mut buf, position, 4);
            }
            Self::FocusPosition(position) => {
                if position > FOCUS_POSITION_MAX {
                    return Err(Error::parameter("focus_position", position, 0, FOCUS_POSITION_MAX as i64));
                }
                nibble::put(&mut buf, position, 4);
            }
            Self::PanTiltPosition { pan, tilt } => {
                nibble::put(&mut buf, pan as u16, 4);
                nibble::put(&mut buf, tilt as u16, 4);
            }
            Self::PanTiltMaxSpeed { pan, tilt } => {
                if pan > Speeds::PAN_MAX {
                    return Err(Error::parameter("pan_speed", pan, 0, Speeds::PAN_MAX as i64));
                }
                if tilt > Speeds::TILT_MAX {
                    return Err(Error::parameter("tilt_speed", tilt, 0, Speeds::TILT_MAX as i64));
                }
                buf.put_slice(&[pan, tilt]);
            }
            Self::Version(info) => {
                buf.put_u16(info.vendor);
                buf.put_u16(info.model);
                buf.put_u16(info.rom);
                buf.put_u8(info.sockets);
            }
        }
        Ok(buf.freeze())
    }
}

impl fmt::Display for InquiryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power(power) => write!(f, "power {power}"),
            Self::ZoomPosition(p) => write!(f, "zoom 0x{p:04X}"),
            Self::FocusPosition(p) => write!(f, "focus 0x{p:04X}"),
            Self::FocusMode(mode) => write!(f, "focus mode {mode:?}"),
            Self::WhiteBalance(wb) => write!(f, "white balance {wb}"),
            Self::AeMode(mode) => write!(f, "AE {mode}"),
            Self::PanTiltPosition { pan, tilt } => write!(f, "pan {pan} tilt {tilt}"),
            Self::PanTiltMaxSpeed { pan, tilt } => write!(f, "max speed {pan}/{tilt}"),
            Self::Version(v) => write!(
                f,
                "vendor 0x{:04X} model 0x{:04X} rom 0x{:04X} sockets {}",
                v.vendor, v.model, v.rom, v.sockets
            ),
        }
    }
}
