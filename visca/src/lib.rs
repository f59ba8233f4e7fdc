//! # visca
//!
//! Control engine for VISCA PTZ cameras over serial, raw TCP and RFC 2217
//! links.
//!
//! ## Features
//!
//! - One engine task per link; clients are cheap clonable handles
//! - Socket-aware dispatch with retries, cancellation and motion supersession
//! - Automatic reconnect with capped exponential backoff
//! - Camera state snapshots and a broadcast stream of status events
//!
//! ## Quick Start
//!
//! ```no_run
//! use visca::{Address, Client, Config, StatusEvent};
//!
//! #[tokio::main]
//! async fn main() -> visca::Result<()> {
//!     let client = Client::spawn(Config::new("192.168.1.32:8234"))?;
//!     let mut events = client.subscribe();
//!
//!     let camera = client.camera(Address::DEFAULT);
//!     camera.power_on().await?;
//!     camera.right().await?;
//!     camera.stop().await?;
//!
//!     while let Ok(event) = events.try_recv() {
//!         if let StatusEvent::CameraChanged { state, .. } = event {
//!             println!("{}", state);
//!         }
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod backoff;
pub mod camera;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
mod engine;
pub mod error;
pub mod event;
pub mod state;

// Re-exports
pub use backoff::{Backoff, BackoffConfig};
pub use camera::{Camera, CameraStatus};
pub use client::{Client, CommandHandle};
pub use config::Config;
pub use dispatcher::CommandId;
pub use error::{ConnectionError, Error, Result};
pub use event::{EventReceiver, EventSender, StatusEvent};
pub use state::Snapshot;

// Re-export protocol and transport types
pub use visca_core::{
    Action, Address, CameraError, FocusDrive, Frame, Inquiry, InquiryValue, PanTiltDirection,
    PresetAction, ZoomDrive,
};
pub use visca_transport::{LinkOptions, MemoryLink, NetMode, Transport};
pub use visca_types::{
    AeMode, CameraState, ConnectionState, FocusMode, PowerState, SpeedAxis, Speeds, WhiteBalance,
};
