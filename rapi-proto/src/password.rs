//! Password challenge encoding for legacy (desktop-manager) connections.
//!
//! The password is sent as UTF-16LE including its terminating NUL, each
//! byte XOR'd with a one-byte key, prefixed by a `u16` little-endian byte
//! count. The device answers with a single byte: nonzero means accepted.

use crate::error::{Error, Result};

/// Encodes `password` into a ready-to-send challenge frame.
pub fn encode(password: &str, key: u8) -> Result<Vec<u8>> {
    let units: Vec<u16> = password.encode_utf16().chain(std::iter::once(0)).collect();
    let len = units
        .len()
        .checked_mul(2)
        .and_then(|n| u16::try_from(n).ok())
        .ok_or(Error::StringTooLong { units: units.len() })?;

    let mut frame = Vec::with_capacity(2 + usize::from(len));
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend(
        units
            .iter()
            .flat_map(|u| u.to_le_bytes())
            .map(|b| b ^ key),
    );
    Ok(frame)
}

/// Interprets the device's one-byte reply.
pub const fn accepted(reply: u8) -> bool {
    reply != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_nul_and_key() {
        let frame = encode("ab", 0x10).unwrap();
        assert_eq!(
            frame,
            [6, 0, b'a' ^ 0x10, 0x10, b'b' ^ 0x10, 0x10, 0x10, 0x10]
        );
    }

    #[test]
    fn zero_key_is_plain_utf16() {
        let frame = encode("x", 0).unwrap();
        assert_eq!(frame, [4, 0, b'x', 0, 0, 0]);
    }

    #[test]
    fn oversized_password_is_rejected() {
        let long = "p".repeat(40_000);
        assert!(matches!(
            encode(&long, 1),
            Err(Error::StringTooLong { .. })
        ));
    }

    #[test]
    fn reply_byte() {
        assert!(accepted(1));
        assert!(accepted(0xFF));
        assert!(!accepted(0));
    }
}
