//! Link state as seen by callers

use std::fmt;

/// Connection manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not started, or explicitly disconnected
    #[default]
    Idle,

    /// Opening the transport and waiting for the handshake inquiry
    Connecting,

    /// Link is up
    Connected,

    /// Link lost, waiting out the backoff delay
    ReconnectWait,

    /// Gave up after the configured number of reconnect attempts
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectWait => "reconnect-wait",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
