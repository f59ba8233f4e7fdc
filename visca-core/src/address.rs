//! Camera addressing

use std::fmt;

use crate::{
    constants::BROADCAST_ADDRESS,
    error::{Error, Result},
};

/// Camera address on a VISCA daisy chain
///
/// Addresses 1-7 select a single camera, 8 is broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u8);

impl Address {
    /// Broadcast address
    pub const BROADCAST: Self = Self(BROADCAST_ADDRESS);

    /// First camera on the chain
    pub const DEFAULT: Self = Self(1);

    pub fn new(value: u8) -> Result<Self> {
        if (1..=BROADCAST_ADDRESS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidAddress(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == BROADCAST_ADDRESS
    }

    /// Header byte of frames sent to this camera
    pub fn command_header(self) -> u8 {
        0x80 | self.0
    }

    /// Header byte of frames this camera sends back
    pub fn reply_header(self) -> u8 {
        (self.0 + 8) << 4
    }

    /// Recover the sender from a reply header
    pub fn from_reply_header(header: u8) -> Option<Self> {
        if header & 0x80 == 0 {
            return None;
        }
        if header & 0x0F == BROADCAST_ADDRESS {
            return Some(Self::BROADCAST);
        }
        if header & 0x0F != 0 {
            return None;
        }
        let value = (header >> 4) - 8;
        Self::new(value).ok().filter(|a| !a.is_broadcast())
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            f.write_str("broadcast")
        } else {
            write!(f, "cam{}", self.0)
        }
    }
}
