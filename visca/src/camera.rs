//! Operator-level camera facade

use std::fmt;

use visca_core::{Action, Address, FocusDrive, Inquiry, InquiryValue, PanTiltDirection, PresetAction, ZoomDrive};
use visca_types::{AeMode, CameraState, FocusMode, PowerState, SpeedAxis, Speeds, WhiteBalance};

use crate::client::Client;
use crate::error::{Error, Result};

/// One camera on a client's link
///
/// Movement actions use the camera's current operator speeds.
///
/// # Examples
///
/// ```no_run
/// use visca::{Address, Client, Config, SpeedAxis};
///
/// #[tokio::main]
/// async fn main() -> visca::Result<()> {
///     let client = Client::spawn(Config::new("192.168.1.32:8234"))?;
///     let camera = client.camera(Address::DEFAULT);
///
///     camera.increase_speed(SpeedAxis::Pan).await?;
///     camera.left().await?;
///     camera.stop().await?;
///     println!("{}", camera.status().await?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Camera {
    client: Client,
    address: Address,
}

/// Result of a full status refresh
///
/// Fields the camera refused to report (for example while powered off)
/// are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraStatus {
    pub power: Option<PowerState>,
    pub zoom_position: Option<u16>,
    pub focus_position: Option<u16>,
    pub focus_mode: Option<FocusMode>,
    pub white_balance: Option<WhiteBalance>,
    pub ae_mode: Option<AeMode>,
    pub pan_tilt_position: Option<(i16, i16)>,
}

impl CameraStatus {
    fn record(&mut self, value: InquiryValue) {
        match value {
            InquiryValue::Power(p) => self.power = Some(p),
            InquiryValue::ZoomPosition(p) => self.zoom_position = Some(p),
            InquiryValue::FocusPosition(p) => self.focus_position = Some(p),
            InquiryValue::FocusMode(m) => self.focus_mode = Some(m),
            InquiryValue::WhiteBalance(wb) => self.white_balance = Some(wb),
            InquiryValue::AeMode(m) => self.ae_mode = Some(m),
            InquiryValue::PanTiltPosition { pan, tilt } => self.pan_tilt_position = Some((pan, tilt)),
            InquiryValue::PanTiltMaxSpeed { .. } | InquiryValue::Version(_) => {}
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "-".into(), |v| v.to_string())
        }

        write!(
            f,
            "Power: {}, Zoom: {}, Focus: {} ({}), WB: {}, AE: {}",
            show(self.power),
            show(self.zoom_position.map(|p| format!("0x{p:04X}"))),
            show(self.focus_position.map(|p| format!("0x{p:04X}"))),
            show(self.focus_mode.map(|m| format!("{m:?}"))),
            show(self.white_balance),
            show(self.ae_mode),
        )?;
        if let Some((pan, tilt)) = self.pan_tilt_position {
            write!(f, ", Pan/Tilt: {pan}/{tilt}")?;
        }
        Ok(())
    }
}

impl Camera {
    pub(crate) fn new(client: Client, address: Address) -> Self {
        Self { client, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Cached state
    pub fn state(&self) -> Option<CameraState> {
        self.client.camera_state(self.address)
    }

    /// Current operator speeds
    pub fn speeds(&self) -> Speeds {
        self.state().map(|s| s.speeds).unwrap_or_default()
    }

    async fn run(&self, action: Action) -> Result<()> {
        self.client.execute(self.address, action).await
    }

    async fn drive(&self, direction: PanTiltDirection) -> Result<()> {
        let speeds = self.speeds();
        self.run(Action::PanTilt {
            direction,
            pan_speed: speeds.pan,
            tilt_speed: speeds.tilt,
        })
        .await
    }

    pub async fn up(&self) -> Result<()> {
        self.drive(PanTiltDirection::Up).await
    }

    pub async fn down(&self) -> Result<()> {
        self.drive(PanTiltDirection::Down).await
    }

    pub async fn left(&self) -> Result<()> {
        self.drive(PanTiltDirection::Left).await
    }

    pub async fn right(&self) -> Result<()> {
        self.drive(PanTiltDirection::Right).await
    }

    /// Stop pan/tilt movement
    pub async fn stop(&self) -> Result<()> {
        self.drive(PanTiltDirection::Stop).await
    }

    pub async fn home(&self) -> Result<()> {
        self.run(Action::Home).await
    }

    pub async fn zoom_in(&self) -> Result<()> {
        self.run(Action::Zoom(ZoomDrive::Tele(self.speeds().zoom))).await
    }

    pub async fn zoom_out(&self) -> Result<()> {
        self.run(Action::Zoom(ZoomDrive::Wide(self.speeds().zoom))).await
    }

    pub async fn zoom_stop(&self) -> Result<()> {
        self.run(Action::Zoom(ZoomDrive::Stop)).await
    }

    pub async fn focus_near(&self) -> Result<()> {
        self.run(Action::Focus(FocusDrive::Near(self.speeds().focus))).await
    }

    pub async fn focus_far(&self) -> Result<()> {
        self.run(Action::Focus(FocusDrive::Far(self.speeds().focus))).await
    }

    pub async fn focus_stop(&self) -> Result<()> {
        self.run(Action::Focus(FocusDrive::Stop)).await
    }

    pub async fn autofocus(&self) -> Result<()> {
        self.run(Action::FocusMode(FocusMode::Auto)).await
    }

    pub async fn power_on(&self) -> Result<()> {
        self.run(Action::Power(PowerState::On)).await
    }

    pub async fn power_off(&self) -> Result<()> {
        self.run(Action::Power(PowerState::Off)).await
    }

    /// Ask the camera for its power state, then flip it
    ///
    /// Returns the new power state.
    pub async fn toggle_power(&self) -> Result<PowerState> {
        let current = match self.client.query(self.address, Inquiry::Power).await? {
            InquiryValue::Power(power) => power,
            other => {
                return Err(Error::InvalidResponse(format!(
                    "power inquiry answered with {other}"
                )));
            }
        };
        let next = current.toggled();
        self.run(Action::Power(next)).await?;
        Ok(next)
    }

    pub async fn white_balance_auto(&self) -> Result<()> {
        self.run(Action::WhiteBalance(WhiteBalance::Auto)).await
    }

    pub async fn white_balance_indoor(&self) -> Result<()> {
        self.run(Action::WhiteBalance(WhiteBalance::Indoor)).await
    }

    pub async fn white_balance_outdoor(&self) -> Result<()> {
        self.run(Action::WhiteBalance(WhiteBalance::Outdoor)).await
    }

    pub async fn recall_preset(&self, slot: u8) -> Result<()> {
        self.run(Action::Preset {
            action: PresetAction::Recall,
            slot,
        })
        .await
    }

    pub async fn set_preset(&self, slot: u8) -> Result<()> {
        self.run(Action::Preset {
            action: PresetAction::Set,
            slot,
        })
        .await
    }

    /// Pan/tilt reset
    pub async fn reset(&self) -> Result<()> {
        self.run(Action::Reset).await
    }

    pub async fn clear_interface(&self) -> Result<()> {
        self.client.clear_interface(self.address).await
    }

    /// Raise one operator speed by a step, clamped to its range
    pub async fn increase_speed(&self, axis: SpeedAxis) -> Result<Speeds> {
        self.step_speed(axis, 1).await
    }

    /// Lower one operator speed by a step, clamped to its range
    pub async fn decrease_speed(&self, axis: SpeedAxis) -> Result<Speeds> {
        self.step_speed(axis, -1).await
    }

    async fn step_speed(&self, axis: SpeedAxis, delta: i8) -> Result<Speeds> {
        let speeds = self.speeds().step(axis, delta);
        self.client.set_speeds(self.address, speeds).await?;
        Ok(speeds)
    }

    /// Run every status inquiry
    ///
    /// # Errors
    ///
    /// Link and timeout errors abort the refresh. Inquiries the camera
    /// rejects leave their field empty.
    pub async fn status(&self) -> Result<CameraStatus> {
        let mut status = CameraStatus::default();
        for inquiry in Inquiry::STATUS {
            match self.client.query(self.address, inquiry).await {
                Ok(value) => status.record(value),
                Err(Error::Camera(error)) => {
                    tracing::debug!(address = %self.address, %inquiry, %error, "status field unavailable")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(status)
    }
}
