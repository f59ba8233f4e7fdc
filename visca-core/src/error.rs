//! Error types for visca-core

use std::fmt;

use crate::constants::error_codes;

/// Result type alias for visca-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Parameter outside its documented range
    #[error("Invalid parameter {name}: {value} (expected {min}..={max})")]
    InvalidParameter {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Camera address outside 1-8
    #[error("Invalid camera address: {0}")]
    InvalidAddress(u8),

    /// Socket number outside 1-2
    #[error("Invalid socket number: {0}")]
    InvalidSocket(u8),

    /// Frame could not be parsed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Reply class not known to this implementation
    #[error("Unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// Frame exceeded the protocol limit
    #[error("Frame too long: {len} bytes (max: {max} bytes)")]
    FrameTooLong {
        len: usize,
        max: usize,
    },

    /// Reply payload did not match the inquiry
    #[error("Unexpected reply for {inquiry}: {detail}")]
    UnexpectedReply {
        inquiry: &'static str,
        detail: String,
    },
}

impl Error {
    /// Check if the error came from reading the byte stream
    ///
    /// Stream errors are recovered by resynchronizing, never surfaced.
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_) | Self::UnknownFrameType(_) | Self::FrameTooLong { .. }
        )
    }

    pub(crate) fn parameter(name: &'static str, value: impl Into<i64>, min: i64, max: i64) -> Self {
        Self::InvalidParameter {
            name,
            value: value.into(),
            min,
            max,
        }
    }
}

/// Error reported by the camera in an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CameraError {
    #[error("message length error")]
    MessageLength,

    #[error("syntax error")]
    SyntaxError,

    #[error("command buffer full")]
    CommandBufferFull,

    #[error("command canceled")]
    Canceled,

    #[error("no such socket")]
    NoSocket,

    #[error("command not executable")]
    NotExecutable,

    #[error("camera error code 0x{0:02X}")]
    Other(u8),
}

impl CameraError {
    pub fn from_code(code: u8) -> Self {
        match code {
            error_codes::MESSAGE_LENGTH => Self::MessageLength,
            error_codes::SYNTAX => Self::SyntaxError,
            error_codes::BUFFER_FULL => Self::CommandBufferFull,
            error_codes::CANCELED => Self::Canceled,
            error_codes::NO_SOCKET => Self::NoSocket,
            error_codes::NOT_EXECUTABLE => Self::NotExecutable,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::MessageLength => error_codes::MESSAGE_LENGTH,
            Self::SyntaxError => error_codes::SYNTAX,
            Self::CommandBufferFull => error_codes::BUFFER_FULL,
            Self::Canceled => error_codes::CANCELED,
            Self::NoSocket => error_codes::NO_SOCKET,
            Self::NotExecutable => error_codes::NOT_EXECUTABLE,
            Self::Other(code) => code,
        }
    }
}

/// Hex formatting helper for log fields
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(1).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&hex::encode_upper(chunk))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_codes() {
        assert_eq!(CameraError::from_code(0x03), CameraError::CommandBufferFull);
        assert_eq!(CameraError::from_code(0x41), CameraError::NotExecutable);
        assert_eq!(CameraError::from_code(0x7E), CameraError::Other(0x7E));
        assert_eq!(CameraError::Canceled.code(), 0x04);
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(HexBytes(&[0x81, 0x01, 0xFF]).to_string(), "81 01 FF");
        assert_eq!(HexBytes(&[]).to_string(), "");
    }

    #[test]
    fn test_stream_errors() {
        assert!(Error::UnknownFrameType(0x70).is_stream_error());
        assert!(!Error::InvalidAddress(9).is_stream_error());
    }
}
