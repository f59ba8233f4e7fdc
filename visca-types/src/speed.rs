//! Operator speed settings

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Axis selector for speed adjustments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeedAxis {
    Pan,
    Tilt,
    Zoom,
    Focus,
}

impl SpeedAxis {
    /// Highest speed accepted on this axis
    pub fn max(self) -> u8 {
        match self {
            Self::Pan => Speeds::PAN_MAX,
            Self::Tilt => Speeds::TILT_MAX,
            Self::Zoom => Speeds::ZOOM_MAX,
            Self::Focus => Speeds::FOCUS_MAX,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pan => "pan_speed",
            Self::Tilt => "tilt_speed",
            Self::Zoom => "zoom_speed",
            Self::Focus => "focus_speed",
        }
    }
}

impl FromStr for SpeedAxis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pan" => Ok(Self::Pan),
            "tilt" => Ok(Self::Tilt),
            "zoom" => Ok(Self::Zoom),
            "focus" => Ok(Self::Focus),
            other => Err(Error::Parse(format!("unknown speed axis '{}'", other))),
        }
    }
}

/// Speeds used for directional actions
///
/// Pan and tilt accept 0-24, zoom and focus accept 0-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Speeds {
    pub pan: u8,
    pub tilt: u8,
    pub zoom: u8,
    pub focus: u8,
}

impl Speeds {
    pub const PAN_MAX: u8 = 24;
    pub const TILT_MAX: u8 = 24;
    pub const ZOOM_MAX: u8 = 7;
    pub const FOCUS_MAX: u8 = 7;

    /// Create a validated speed set
    pub fn new(pan: u8, tilt: u8, zoom: u8, focus: u8) -> Result<Self> {
        let speeds = Self { pan, tilt, zoom, focus };
        speeds.validate()?;
        Ok(speeds)
    }

    /// Speed for one axis
    pub fn get(&self, axis: SpeedAxis) -> u8 {
        match axis {
            SpeedAxis::Pan => self.pan,
            SpeedAxis::Tilt => self.tilt,
            SpeedAxis::Zoom => self.zoom,
            SpeedAxis::Focus => self.focus,
        }
    }

    /// Check every axis against its range
    pub fn validate(&self) -> Result<()> {
        for axis in [SpeedAxis::Pan, SpeedAxis::Tilt, SpeedAxis::Zoom, SpeedAxis::Focus] {
            let value = self.get(axis);
            if value > axis.max() {
                return Err(Error::Validation(format!(
                    "{} {} out of range 0..={}",
                    axis.name(),
                    value,
                    axis.max()
                )));
            }
        }
        Ok(())
    }

    /// Return a copy with one axis moved by `delta`, clamped to its range
    pub fn step(mut self, axis: SpeedAxis, delta: i8) -> Self {
        let next = (self.get(axis) as i16 + delta as i16).clamp(0, axis.max() as i16) as u8;
        match axis {
            SpeedAxis::Pan => self.pan = next,
            SpeedAxis::Tilt => self.tilt = next,
            SpeedAxis::Zoom => self.zoom = next,
            SpeedAxis::Focus => self.focus = next,
        }
        self
    }
}

impl Default for Speeds {
    fn default() -> Self {
        Self {
            pan: 5,
            tilt: 5,
            zoom: 5,
            focus: 5,
        }
    }
}

impl fmt::Display for Speeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pan: {}  Tilt: {}  Zoom: {}  Focus: {}",
            self.pan, self.tilt, self.zoom, self.focus
        )
    }
}
