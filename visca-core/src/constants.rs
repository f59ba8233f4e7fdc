//! Protocol constants

/// Frame terminator
pub const TERMINATOR: u8 = 0xFF;

/// Largest VISCA message, terminator included
pub const MAX_FRAME_LEN: usize = 16;

/// Broadcast address
pub const BROADCAST_ADDRESS: u8 = 8;

/// Command sockets per camera
pub const MAX_SOCKETS: usize = 2;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default ack timeout (milliseconds)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 500;

/// Default completion timeout (seconds)
pub const DEFAULT_COMPLETION_TIMEOUT: u64 = 10;

/// Retransmissions before a request times out
pub const MAX_RETRIES: u32 = 2;

/// Message categories (first body byte of outgoing frames)
pub mod category {
    /// Command
    pub const COMMAND: u8 = 0x01;

    /// Inquiry
    pub const INQUIRY: u8 = 0x09;

    /// Cancel (low nibble carries the socket)
    pub const CANCEL: u8 = 0x20;

    /// Address set (broadcast only)
    pub const ADDRESS_SET: u8 = 0x30;
}

/// Reply classes (high nibble of the first body byte of incoming frames)
pub mod reply {
    /// Address set reply
    pub const ADDRESS_SET: u8 = 0x30;

    /// Network change notification
    pub const NETWORK_CHANGE: u8 = 0x38;

    /// Ack
    pub const ACK: u8 = 0x40;

    /// Completion / inquiry reply
    pub const COMPLETION: u8 = 0x50;

    /// Error
    pub const ERROR: u8 = 0x60;
}

/// Error reply codes
pub mod error_codes {
    pub const MESSAGE_LENGTH: u8 = 0x01;
    pub const SYNTAX: u8 = 0x02;
    pub const BUFFER_FULL: u8 = 0x03;
    pub const CANCELED: u8 = 0x04;
    pub const NO_SOCKET: u8 = 0x05;
    pub const NOT_EXECUTABLE: u8 = 0x41;
}
