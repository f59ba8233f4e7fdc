//! High-level error types

use visca_core::CameraError;

use crate::dispatcher::CommandId;

pub type Result<T> = std::result::Result<T, Error>;

/// Connection manager failures, published as status events
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Camera link unreachable: {0}")]
    Unreachable(String),

    #[error("Gave up after {attempts} failed connection attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] visca_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] visca_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] visca_types::Error),

    #[error("Camera rejected the request: {0}")]
    Camera(#[from] CameraError),

    #[error("No answer after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Link failed while the request was outstanding: {0}")]
    IoFailure(String),

    #[error("Camera not connected")]
    NotConnected,

    #[error("Request queue full")]
    QueueFull,

    #[error("Command canceled")]
    Canceled,

    #[error("Command replaced by a newer one")]
    Superseded,

    #[error("Unknown command {0}")]
    UnknownCommand(CommandId),

    #[error("Engine shut down")]
    Shutdown,

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Invalid response from camera: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Errors the camera itself reported
    pub fn camera_error(&self) -> Option<CameraError> {
        match self {
            Self::Camera(e) => Some(*e),
            _ => None,
        }
    }
}
