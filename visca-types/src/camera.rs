//! Camera settings and the cached camera state

use std::fmt;

use chrono::{DateTime, Utc};

use crate::{connection::ConnectionState, speed::Speeds};

/// Camera power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// VISCA value byte
    pub fn code(self) -> u8 {
        match self {
            Self::On => 0x02,
            Self::Off => 0x03,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Self::On),
            0x03 => Some(Self::Off),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

/// White balance mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteBalance {
    Auto,
    Indoor,
    Outdoor,
    OnePush,
    Atw,
    Manual,
}

impl WhiteBalance {
    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0x00,
            Self::Indoor => 0x01,
            Self::Outdoor => 0x02,
            Self::OnePush => 0x03,
            Self::Atw => 0x04,
            Self::Manual => 0x05,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Auto),
            0x01 => Some(Self::Indoor),
            0x02 => Some(Self::Outdoor),
            0x03 => Some(Self::OnePush),
            0x04 => Some(Self::Atw),
            0x05 => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Indoor => "Indoor",
            Self::Outdoor => "Outdoor",
            Self::OnePush => "One Push",
            Self::Atw => "ATW",
            Self::Manual => "Manual",
        }
    }
}

impl fmt::Display for WhiteBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Focus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Auto,
    Manual,
}

impl FocusMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0x02,
            Self::Manual => 0x03,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Self::Auto),
            0x03 => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Auto-exposure mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeMode {
    FullAuto,
    Manual,
    ShutterPriority,
    IrisPriority,
    Bright,
}

impl AeMode {
    pub fn code(self) -> u8 {
        match self {
            Self::FullAuto => 0x00,
            Self::Manual => 0x03,
            Self::ShutterPriority => 0x0A,
            Self::IrisPriority => 0x0B,
            Self::Bright => 0x0D,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::FullAuto),
            0x03 => Some(Self::Manual),
            0x0A => Some(Self::ShutterPriority),
            0x0B => Some(Self::IrisPriority),
            0x0D => Some(Self::Bright),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FullAuto => "Full Auto",
            Self::Manual => "Manual",
            Self::ShutterPriority => "Shutter Priority",
            Self::IrisPriority => "Iris Priority",
            Self::Bright => "Bright",
        }
    }
}

impl fmt::Display for AeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A setting with a confirmed value and an optional optimistic one
///
/// The pending value is what the last issued command will set once the
/// camera completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracked<T> {
    pub confirmed: Option<T>,
    pub pending: Option<T>,
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self {
            confirmed: None,
            pending: None,
        }
    }
}

impl<T: Copy + PartialEq> Tracked<T> {
    /// Best known value, pending first
    pub fn current(&self) -> Option<T> {
        self.pending.or(self.confirmed)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record an optimistic value
    pub fn propose(&mut self, value: T) {
        self.pending = Some(value);
    }

    /// Record a value the camera confirmed
    pub fn confirm(&mut self, value: T) {
        self.confirmed = Some(value);
        if self.pending == Some(value) {
            self.pending = None;
        }
    }

    /// Drop an optimistic value whose command failed
    pub fn discard(&mut self, value: T) {
        if self.pending == Some(value) {
            self.pending = None;
        }
    }

    pub fn clear(&mut self) {
        self.confirmed = None;
        self.pending = None;
    }
}

/// Last known state of one camera
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraState {
    pub power: Tracked<PowerState>,
    pub white_balance: Tracked<WhiteBalance>,
    pub focus_mode: Tracked<FocusMode>,
    /// Last preset recalled or stored; cleared by movement
    pub preset: Tracked<u8>,
    pub ae_mode: Option<AeMode>,
    pub zoom_position: Option<u16>,
    pub focus_position: Option<u16>,
    pub pan_tilt_position: Option<(i16, i16)>,
    pub speeds: Speeds,
    pub connection: ConnectionState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CameraState {
    pub fn new(speeds: Speeds) -> Self {
        Self {
            speeds,
            ..Self::default()
        }
    }

    /// Stamp the state as changed now
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let power = self
            .power
            .current()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "UNKNOWN".into());
        let wb = self
            .white_balance
            .current()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "Unknown".into());
        write!(
            f,
            "Camera[{}, power={}, wb={}, {}]",
            self.connection, power, wb, self.speeds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tracked_optimistic_then_confirm() {
        let mut power = Tracked::default();
        power.propose(PowerState::On);
        assert_eq!(power.current(), Some(PowerState::On));
        assert!(power.is_pending());

        power.confirm(PowerState::On);
        assert_eq!(power.confirmed, Some(PowerState::On));
        assert!(!power.is_pending());
    }

    #[test]
    fn test_tracked_discard_reverts() {
        let mut wb = Tracked::default();
        wb.confirm(WhiteBalance::Auto);
        wb.propose(WhiteBalance::Indoor);

        wb.discard(WhiteBalance::Indoor);
        assert_eq!(wb.current(), Some(WhiteBalance::Auto));
    }

    #[test]
    fn test_tracked_discard_keeps_newer_proposal() {
        let mut wb = Tracked::default();
        wb.propose(WhiteBalance::Indoor);
        wb.propose(WhiteBalance::Outdoor);

        wb.discard(WhiteBalance::Indoor);
        assert_eq!(wb.current(), Some(WhiteBalance::Outdoor));
    }

    #[test]
    fn test_codes_round_trip() {
        for wb in [
            WhiteBalance::Auto,
            WhiteBalance::Indoor,
            WhiteBalance::Outdoor,
            WhiteBalance::OnePush,
            WhiteBalance::Atw,
            WhiteBalance::Manual,
        ] {
            assert_eq!(WhiteBalance::from_code(wb.code()), Some(wb));
        }
        assert_eq!(PowerState::from_code(0x02), Some(PowerState::On));
        assert_eq!(PowerState::from_code(0x04), None);
        assert_eq!(AeMode::from_code(0x0B), Some(AeMode::IrisPriority));
    }
}
