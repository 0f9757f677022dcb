//! Extranonce2: the miner-rolled field inside the coinbase scriptSig.
//!
//! Unlike the teacher's client-side `Extranonce2Template` (a range generator
//! for dividing search space among boards), the pool only ever needs to
//! parse a miner-supplied value and serialize it back into the coinbase —
//! the miner owns the rolling.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Extranonce2Error {
    #[error("invalid extranonce2 size: {0} (must be 1-8 bytes)")]
    InvalidSize(u8),
    #[error("value {0} exceeds maximum for size {1} bytes")]
    ValueTooLarge(u64, u8),
    #[error("odd-length or non-hex extranonce2: {0}")]
    InvalidHex(String),
}

/// A specific extranonce2 value with fixed size, as submitted by a miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extranonce2 {
    value: u64,
    size: u8,
}

impl Extranonce2 {
    pub fn new(value: u64, size: u8) -> Result<Self, Extranonce2Error> {
        if size == 0 || size > 8 {
            return Err(Extranonce2Error::InvalidSize(size));
        }
        let max = Self::max_for_size(size);
        if value > max {
            return Err(Extranonce2Error::ValueTooLarge(value, size));
        }
        Ok(Self { value, size })
    }

    /// Parse the hex string a miner sends in `mining.submit`, validating it
    /// is exactly `size` bytes.
    pub fn from_hex(hex_str: &str, size: u8) -> Result<Self, Extranonce2Error> {
        if hex_str.len() != size as usize * 2 {
            return Err(Extranonce2Error::InvalidHex(hex_str.to_string()));
        }
        let bytes = hex::decode(hex_str)
            .map_err(|_| Extranonce2Error::InvalidHex(hex_str.to_string()))?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(&bytes);
        Self::new(u64::from_le_bytes(buf), size)
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    fn max_for_size(size: u8) -> u64 {
        if size >= 8 {
            u64::MAX
        } else {
            (1u64 << (size * 8)) - 1
        }
    }

    pub fn extend_vec(&self, vec: &mut Vec<u8>) {
        vec.extend_from_slice(&self.value.to_le_bytes()[..self.size as usize]);
    }
}

impl From<Extranonce2> for Vec<u8> {
    fn from(ext: Extranonce2) -> Vec<u8> {
        ext.value.to_le_bytes()[..ext.size as usize].to_vec()
    }
}

impl fmt::Display for Extranonce2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Must match `from_hex`'s byte order exactly: the wire hex is the
        // raw little-endian byte sequence `from_hex` decodes, not a
        // big-endian rendering of `value` as an integer.
        write!(f, "{}", hex::encode(&self.value.to_le_bytes()[..self.size as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_and_to_bytes() {
        let ext = Extranonce2::new(0x1234, 4).unwrap();
        assert_eq!(Vec::<u8>::from(ext), vec![0x34, 0x12, 0, 0]);
    }

    #[test]
    fn from_hex_roundtrips_with_display() {
        let ext = Extranonce2::new(0xabcd, 4).unwrap();
        let hex_str = ext.to_string();
        let parsed = Extranonce2::from_hex(&hex_str, 4).unwrap();
        assert_eq!(ext, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(matches!(
            Extranonce2::from_hex("abcd", 4),
            Err(Extranonce2Error::InvalidHex(_))
        ));
    }

    #[test]
    fn value_too_large_for_size() {
        assert!(matches!(
            Extranonce2::new(0x100, 1),
            Err(Extranonce2Error::ValueTooLarge(0x100, 1))
        ));
    }
}
