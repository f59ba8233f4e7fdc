//! Type definitions for visca

pub mod camera;
pub mod connection;
pub mod error;
pub mod speed;

pub use camera::{AeMode, CameraState, FocusMode, PowerState, Tracked, WhiteBalance};
pub use connection::ConnectionState;
pub use error::{Error, Result};
pub use speed::{SpeedAxis, Speeds};
