//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("RFC 2217 negotiation failed: {0}")]
    Negotiation(String),

    #[error("Failed to open {target}: {reason}")]
    Open { target: String, reason: String },
}

impl Error {
    /// Check if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout | Self::ReadTimeout)
            || matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }

    /// Check if the link is certainly gone
    ///
    /// Fatal errors end the connection at once. Others count towards the
    /// I/O failure threshold.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotConnected | Self::ConnectionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::ReadTimeout.is_timeout());
        assert!(Error::Io(io::Error::from(io::ErrorKind::TimedOut)).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());

        assert!(Error::ConnectionClosed.is_fatal());
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::WouldBlock)).is_fatal());
        assert!(!Error::Negotiation("refused".into()).is_fatal());
    }
}
