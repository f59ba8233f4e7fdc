//! VISCA command definitions

use std::fmt;

use bytes::{BufMut, BytesMut};
use visca_types::{FocusMode, PowerState, Speeds, WhiteBalance};

use crate::{
    address::Address,
    constants::category,
    error::{Error, Result},
    frame::Frame,
    nibble,
};

/// Highest direct zoom position
pub const ZOOM_POSITION_MAX: u16 = 0x4000;

/// Highest direct focus position
pub const FOCUS_POSITION_MAX: u16 = 0xC000;

/// Highest preset slot
pub const PRESET_MAX: u8 = 0x7F;

/// Pan/tilt drive direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanTiltDirection {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    Stop,
}

impl PanTiltDirection {
    /// Pan and tilt direction bytes
    fn codes(self) -> (u8, u8) {
        match self {
            Self::Up => (0x03, 0x01),
            Self::Down => (0x03, 0x02),
            Self::Left => (0x01, 0x03),
            Self::Right => (0x02, 0x03),
            Self::UpLeft => (0x01, 0x01),
            Self::UpRight => (0x02, 0x01),
            Self::DownLeft => (0x01, 0x02),
            Self::DownRight => (0x02, 0x02),
            Self::Stop => (0x03, 0x03),
        }
    }
}

/// Variable-speed zoom drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoomDrive {
    Stop,
    Tele(u8),
    Wide(u8),
}

/// Variable-speed focus drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusDrive {
    Stop,
    Far(u8),
    Near(u8),
}

/// Preset memory operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetAction {
    Reset,
    Set,
    Recall,
}

impl PresetAction {
    fn code(self) -> u8 {
        match self {
            Self::Reset => 0x00,
            Self::Set => 0x01,
            Self::Recall => 0x02,
        }
    }
}

/// Actions that continuously drive the same mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionGroup {
    PanTilt,
    Zoom,
    Focus,
}

/// What a completed action changes in the camera's settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEffect {
    Power(PowerState),
    WhiteBalance(WhiteBalance),
    FocusMode(FocusMode),
    Preset(u8),
    /// Camera moved away from any preset
    PresetCleared,
    ZoomPosition(u16),
    FocusPosition(u16),
}

/// Camera command
///
/// Every variant encodes to one `8x 01 ... FF` frame.
///
/// # Examples
///
/// ```
/// use visca_core::{Action, Address, PanTiltDirection};
///
/// let action = Action::PanTilt {
///     direction: PanTiltDirection::Right,
///     pan_speed: 10,
///     tilt_speed: 10,
/// };
/// let frame = action.encode(Address::DEFAULT).unwrap();
/// assert_eq!(frame.to_bytes().as_ref(), &[0x81, 0x01, 0x06, 0x01, 0x0A, 0x0A, 0x02, 0x03, 0xFF]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Power(PowerState),
    PanTilt {
        direction: PanTiltDirection,
        pan_speed: u8,
        tilt_speed: u8,
    },
    AbsolutePosition {
        pan: i16,
        tilt: i16,
        pan_speed: u8,
        tilt_speed: u8,
    },
    Home,
    Reset,
    Zoom(ZoomDrive),
    ZoomTo(u16),
    Focus(FocusDrive),
    FocusTo(u16),
    FocusMode(FocusMode),
    FocusOnePush,
    WhiteBalance(WhiteBalance),
    Preset {
        action: PresetAction,
        slot: u8,
    },
}

impl Action {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Power(PowerState::On) => "CAM_Power_On",
            Self::Power(PowerState::Off) => "CAM_Power_Off",
            Self::PanTilt { .. } => "Pan-tiltDrive",
            Self::AbsolutePosition { .. } => "Pan-tiltDrive_Absolute",
            Self::Home => "Pan-tiltDrive_Home",
            Self::Reset => "Pan-tiltDrive_Reset",
            Self::Zoom(_) => "CAM_Zoom",
            Self::ZoomTo(_) => "CAM_Zoom_Direct",
            Self::Focus(_) => "CAM_Focus",
            Self::FocusTo(_) => "CAM_Focus_Direct",
            Self::FocusMode(_) => "CAM_Focus_Mode",
            Self::FocusOnePush => "CAM_Focus_OnePush",
            Self::WhiteBalance(_) => "CAM_WB",
            Self::Preset { .. } => "CAM_Memory",
        }
    }

    /// Mechanism this action drives, if it is a directional action
    pub fn motion_group(&self) -> Option<MotionGroup> {
        match self {
            Self::PanTilt { .. } => Some(MotionGroup::PanTilt),
            Self::Zoom(_) => Some(MotionGroup::Zoom),
            Self::Focus(_) => Some(MotionGroup::Focus),
            _ => None,
        }
    }

    /// Directional actions are only meaningful while the operator holds a key
    pub fn is_directional(&self) -> bool {
        self.motion_group().is_some()
    }

    /// Settings change applied once the camera completes the action
    pub fn effect(&self) -> Option<StateEffect> {
        match *self {
            Self::Power(power) => Some(StateEffect::Power(power)),
            Self::WhiteBalance(wb) => Some(StateEffect::WhiteBalance(wb)),
            Self::FocusMode(mode) => Some(StateEffect::FocusMode(mode)),
            Self::Preset {
                action: PresetAction::Recall | PresetAction::Set,
                slot,
            } => Some(StateEffect::Preset(slot)),
            Self::PanTilt {
                direction: PanTiltDirection::Stop,
                ..
            } => None,
            Self::PanTilt { .. } | Self::AbsolutePosition { .. } | Self::Home | Self::Reset => {
                Some(StateEffect::PresetCleared)
            }
            Self::ZoomTo(position) => Some(StateEffect::ZoomPosition(position)),
            Self::FocusTo(position) => Some(StateEffect::FocusPosition(position)),
            _ => None,
        }
    }

    /// Range-check every parameter
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::PanTilt {
                pan_speed,
                tilt_speed,
                ..
            }
            | Self::AbsolutePosition {
                pan_speed,
                tilt_speed,
                ..
            } => {
                check("pan_speed", pan_speed as u16, Speeds::PAN_MAX as u16)?;
                check("tilt_speed", tilt_speed as u16, Speeds::TILT_MAX as u16)
            }
            Self::Zoom(ZoomDrive::Tele(speed) | ZoomDrive::Wide(speed)) => {
                check("zoom_speed", speed as u16, Speeds::ZOOM_MAX as u16)
            }
            Self::Focus(FocusDrive::Far(speed) | FocusDrive::Near(speed)) => {
                check("focus_speed", speed as u16, Speeds::FOCUS_MAX as u16)
            }
            Self::ZoomTo(position) => check("zoom_position", position, ZOOM_POSITION_MAX),
            Self::FocusTo(position) => check("focus_position", position, FOCUS_POSITION_MAX),
            Self::Preset { slot, .. } => check("preset", slot as u16, PRESET_MAX as u16),
            _ => Ok(()),
        }
    }

    /// Encode into a command frame for `address`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when a speed, position or preset slot is
    /// out of range. Nothing is encoded in that case.
    pub fn encode(&self, address: Address) -> Result<Frame> {
        self.validate()?;

        let mut body = BytesMut::with_capacity(14);
        body.put_u8(category::COMMAND);

        match *self {
            Self::Power(power) => body.put_slice(&[0x04, 0x00, power.code()]),
            Self::PanTilt {
                direction,
                pan_speed,
                tilt_speed,
            } => {
                let (pan_dir, tilt_dir) = direction.codes();
                body.put_slice(&[0x06, 0x01, pan_speed, tilt_speed, pan_dir, tilt_dir]);
            }
            Self::AbsolutePosition {
                pan,
                tilt,
                pan_speed,
                tilt_speed,
            } => {
                body.put_slice(&[0x06, 0x02, pan_speed, tilt_speed]);
                nibble::put(&mut body, pan as u16, 4);
                nibble::put(&mut body, tilt as u16, 4);
            }
            Self::Home => body.put_slice(&[0x06, 0x04]),
            Self::Reset => body.put_slice(&[0x06, 0x05]),
            Self::Zoom(drive) => {
                let code = match drive {
                    ZoomDrive::Stop => 0x00,
                    ZoomDrive::Tele(speed) => 0x20 | speed,
                    ZoomDrive::Wide(speed) => 0x30 | speed,
                };
                body.put_slice(&[0x04, 0x07, code]);
            }
            Self::ZoomTo(position) => {
                body.put_slice(&[0x04, 0x47]);
                nibble::put(&mut body, position, 4);
            }
            Self::Focus(drive) => {
                let code = match drive {
                    FocusDrive::Stop => 0x00,
                    FocusDrive::Far(speed) => 0x20 | speed,
                    FocusDrive::Near(speed) => 0x30 | speed,
                };
                body.put_slice(&[0x04, 0x08, code]);
            }
            Self::FocusTo(position) => {
                body.put_slice(&[0x04, 0x48]);
                nibble::put(&mut body, position, 4);
            }
            Self::FocusMode(mode) => body.put_slice(&[0x04, 0x38, mode.code()]),
            Self::FocusOnePush => body.put_slice(&[0x04, 0x18, 0x01]),
            Self::WhiteBalance(wb) => body.put_slice(&[0x04, 0x35, wb.code()]),
            Self::Preset { action, slot } => body.put_slice(&[0x04, 0x3F, action.code(), slot]),
        }

        Ok(Frame::new(address.command_header(), body.freeze()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PanTilt {
                direction,
                pan_speed,
                tilt_speed,
            } => write!(f, "{}({:?}, {}/{})", self.name(), direction, pan_speed, tilt_speed),
            Self::Preset { action, slot } => write!(f, "{}({:?} {})", self.name(), action, slot),
            _ => f.write_str(self.name()),
        }
    }
}

fn check(name: &'static str, value: u16, max: u16) -> Result<()> {
    if value > max {
        return Err(Error::parameter(name, value, 0, max as i64));
    }
    Ok(())
}

/// Cancel frame for a command running on `socket`
pub fn cancel_frame(address: Address, socket: crate::socket::Socket) -> Frame {
    Frame::new(
        address.command_header(),
        bytes::Bytes::copy_from_slice(&[category::CANCEL | socket.get()]),
    )
}

/// Broadcast address-set frame; the first camera takes address 1
pub fn address_set_frame() -> Frame {
    Frame::new(
        Address::BROADCAST.command_header(),
        bytes::Bytes::from_static(&[category::ADDRESS_SET, 0x01]),
    )
}

/// Interface clear frame
pub fn if_clear_frame(address: Address) -> Frame {
    Frame::new(
        address.command_header(),
        bytes::Bytes::from_static(&[category::COMMAND, 0x00, 0x01]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;
    use pretty_assertions::assert_eq;

    fn encode(action: Action) -> Vec<u8> {
        action.encode(Address::DEFAULT).unwrap().to_bytes().to_vec()
    }

    #[test]
    fn test_pan_right_frame() {
        let bytes = encode(Action::PanTilt {
            direction: PanTiltDirection::Right,
            pan_speed: 10,
            tilt_speed: 10,
        });
        assert_eq!(bytes, vec![0x81, 0x01, 0x06, 0x01, 0x0A, 0x0A, 0x02, 0x03, 0xFF]);
    }

    #[test]
    fn test_power_frames() {
        assert_eq!(encode(Action::Power(PowerState::On)), vec![0x81, 0x01, 0x04, 0x00, 0x02, 0xFF]);
        assert_eq!(encode(Action::Power(PowerState::Off)), vec![0x81, 0x01, 0x04, 0x00, 0x03, 0xFF]);
    }

    #[test]
    fn test_zoom_and_focus_speed_nibble() {
        assert_eq!(encode(Action::Zoom(ZoomDrive::Tele(7))), vec![0x81, 0x01, 0x04, 0x07, 0x27, 0xFF]);
        assert_eq!(encode(Action::Zoom(ZoomDrive::Wide(0))), vec![0x81, 0x01, 0x04, 0x07, 0x30, 0xFF]);
        assert_eq!(encode(Action::Focus(FocusDrive::Near(3))), vec![0x81, 0x01, 0x04, 0x08, 0x33, 0xFF]);
    }

    #[test]
    fn test_zoom_direct_nibbles() {
        assert_eq!(
            encode(Action::ZoomTo(0x1A2B)),
            vec![0x81, 0x01, 0x04, 0x47, 0x01, 0x0A, 0x02, 0x0B, 0xFF]
        );
    }

    #[test]
    fn test_absolute_position_negative_pan() {
        let bytes = encode(Action::AbsolutePosition {
            pan: -1,
            tilt: 0x10,
            pan_speed: 24,
            tilt_speed: 20,
        });
        assert_eq!(
            bytes,
            vec![
                0x81, 0x01, 0x06, 0x02, 0x18, 0x14, 0x0F, 0x0F, 0x0F, 0x0F, 0x00, 0x00, 0x01,
                0x00, 0xFF
            ]
        );
    }

    #[test]
    fn test_preset_recall() {
        let bytes = encode(Action::Preset {
            action: PresetAction::Recall,
            slot: 3,
        });
        assert_eq!(bytes, vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x03, 0xFF]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let result = Action::PanTilt {
            direction: PanTiltDirection::Up,
            pan_speed: 25,
            tilt_speed: 1,
        }
        .encode(Address::DEFAULT);
        assert!(matches!(
            result,
            Err(Error::InvalidParameter { name: "pan_speed", value: 25, .. })
        ));

        assert!(Action::Zoom(ZoomDrive::Tele(8)).encode(Address::DEFAULT).is_err());
        assert!(Action::ZoomTo(0x4001).encode(Address::DEFAULT).is_err());
        assert!(Action::Preset { action: PresetAction::Set, slot: 0x80 }
            .encode(Address::DEFAULT)
            .is_err());
    }

    #[test]
    fn test_motion_groups() {
        assert!(Action::Zoom(ZoomDrive::Stop).is_directional());
        assert!(!Action::Home.is_directional());
        assert_eq!(
            Action::Focus(FocusDrive::Far(1)).motion_group(),
            Some(MotionGroup::Focus)
        );
    }

    #[test]
    fn test_effects() {
        assert_eq!(
            Action::Power(PowerState::On).effect(),
            Some(StateEffect::Power(PowerState::On))
        );
        assert_eq!(Action::Home.effect(), Some(StateEffect::PresetCleared));
        assert_eq!(
            Action::PanTilt {
                direction: PanTiltDirection::Stop,
                pan_speed: 1,
                tilt_speed: 1
            }
            .effect(),
            None
        );
    }

    #[test]
    fn test_special_frames() {
        let socket = Socket::new(2).unwrap();
        assert_eq!(cancel_frame(Address::DEFAULT, socket).to_bytes().as_ref(), &[0x81, 0x22, 0xFF]);
        assert_eq!(address_set_frame().to_bytes().as_ref(), &[0x88, 0x30, 0x01, 0xFF]);
        assert_eq!(if_clear_frame(Address::BROADCAST).to_bytes().as_ref(), &[0x88, 0x01, 0x00, 0x01, 0xFF]);
    }
}
