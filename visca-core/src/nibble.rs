//! Nibble packing
//!
//! VISCA carries wide values as a run of bytes holding one 4-bit digit each,
//! most significant first:
//!
//! ```text
//! 0x1A2B  ->  01 0A 02 0B
//! ```

use bytes::BufMut;

use crate::error::{Error, Result};

/// Append `value` as `digits` nibble bytes
pub fn put(buf: &mut impl BufMut, value: u16, digits: usize) {
    for i in (0..digits).rev() {
        buf.put_u8(((value >> (i * 4)) & 0x0F) as u8);
    }
}

/// Split `value` into `digits` nibble bytes
pub fn split(value: u16, digits: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(digits);
    put(&mut out, value, digits);
    out
}

/// Join nibble bytes back into a value
///
/// # Errors
///
/// Fails when a byte carries anything above its low nibble or when more
/// than four digits are supplied.
pub fn join(digits: &[u8]) -> Result<u16> {
    if digits.len() > 4 {
        return Err(Error::MalformedFrame(format!(
            "{} nibble digits do not fit in 16 bits",
            digits.len()
        )));
    }

    digits.iter().try_fold(0u16, |acc, &digit| {
        if digit > 0x0F {
            return Err(Error::MalformedFrame(format!(
                "byte 0x{digit:02X} is not a nibble digit"
            )));
        }
        Ok((acc << 4) | digit as u16)
    })
}
