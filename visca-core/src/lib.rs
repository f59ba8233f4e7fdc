//! # visca-core
//!
//! Core protocol implementation for VISCA pan-tilt-zoom cameras.
//!
//! This crate provides the sans-IO protocol primitives:
//! - Camera addressing and frame structure
//! - Command and inquiry encoding with range checks
//! - Reply classification and inquiry reply decoding
//! - A streaming frame parser that resynchronizes on line noise
//! - The two-slot socket table

pub mod address;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod inquiry;
pub mod nibble;
pub mod parser;
pub mod socket;

pub use address::Address;
pub use command::{
    Action, FocusDrive, MotionGroup, PanTiltDirection, PresetAction, StateEffect, ZoomDrive,
    address_set_frame, cancel_frame, if_clear_frame,
};
pub use error::{CameraError, Error, HexBytes, Result};
pub use frame::{Frame, FrameKind, Reply};
pub use inquiry::{Inquiry, InquiryValue, VersionInfo};
pub use parser::FrameParser;
pub use socket::{Socket, SocketTable};

/// Default TCP port of VISCA-over-IP serial bridges
pub const DEFAULT_PORT: u16 = 8234;

/// Default connection string
pub const DEFAULT_CONNECTION: &str = "192.168.1.32:8234";
