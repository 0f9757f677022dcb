//! Wire-level primitives: varint, endian packing, pushdata, double-SHA-256,
//! and the difficulty/target conversions shared by the session engine and
//! submitter.
//!
//! Every integer operation here is endian-explicit; nothing depends on host
//! byte order.

use bitcoin::hashes::{Hash, sha256d};
use bitcoin::pow::{CompactTarget, Target};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::Difficulty;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("varint truncated")]
    VarintTruncated,
}

/// Bitcoin's canonical difficulty-1 target, the expansion of `0x1d00ffff`.
pub fn diff1_target() -> Target {
    Target::from(CompactTarget::from_consensus(0x1d00ffff))
}

/// Encode `n` as a Bitcoin CompactSize ("varint").
pub fn varint(n: u64) -> Vec<u8> {
    let mut out = Vec::new();
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
    out
}

/// Decode a CompactSize from the front of `data`, returning (value, bytes consumed).
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), CodecError> {
    let first = *data.first().ok_or(CodecError::VarintTruncated)?;
    match first {
        0..=0xfc => Ok((first as u64, 1)),
        0xfd => {
            let b = data.get(1..3).ok_or(CodecError::VarintTruncated)?;
            Ok((u16::from_le_bytes(b.try_into().unwrap()) as u64, 3))
        }
        0xfe => {
            let b = data.get(1..5).ok_or(CodecError::VarintTruncated)?;
            Ok((u32::from_le_bytes(b.try_into().unwrap()) as u64, 5))
        }
        0xff => {
            let b = data.get(1..9).ok_or(CodecError::VarintTruncated)?;
            Ok((u64::from_le_bytes(b.try_into().unwrap()), 9))
        }
    }
}

pub fn u32le(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

pub fn u64le(v: u64) -> [u8; 8] {
    v.to_le_bytes()
}

/// BIP-62 pushdata prefix for a data push of `bytes`: bare length for ≤0x4b,
/// OP_PUSHDATA1/2/4 otherwise. Returns the prefix only; caller appends `bytes`.
pub fn pushdata_prefix(len: usize) -> Vec<u8> {
    match len {
        0..=0x4b => vec![len as u8],
        0x4c..=0xff => vec![0x4c, len as u8],
        0x100..=0xffff => {
            let mut v = vec![0x4d];
            v.extend_from_slice(&(len as u16).to_le_bytes());
            v
        }
        _ => {
            let mut v = vec![0x4e];
            v.extend_from_slice(&(len as u32).to_le_bytes());
            v
        }
    }
}

pub fn pushdata(bytes: &[u8]) -> Vec<u8> {
    let mut out = pushdata_prefix(bytes.len());
    out.extend_from_slice(bytes);
    out
}

/// Double-SHA-256, returned in the order SHA-256 produces it (no reversal).
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// `double_sha256` via `bitcoin`'s hash engine, used where a `sha256d::Hash`
/// type (rather than raw bytes) is convenient — e.g. legacy txid computation.
pub fn double_sha256_hash(data: &[u8]) -> sha256d::Hash {
    sha256d::Hash::hash(data)
}

/// Interpret a double-SHA-256 digest as a little-endian 256-bit integer for
/// comparison against a target. Bitcoin's convention: the hash bytes, taken
/// little-endian, are the value compared against the target.
pub fn hash_as_target(hash: &[u8; 32]) -> Target {
    Target::from_le_bytes(*hash)
}

/// `target_from_nbits`: decode a compact `nbits` value into a `Target`.
pub fn target_from_nbits(bits: u32) -> Target {
    Target::from(CompactTarget::from_consensus(bits))
}

/// `target_from_difficulty`: `floor(DIFF1_TARGET / max(d, epsilon))`.
///
/// For `d < 1.0` this widens the target past `DIFF1_TARGET`; `Difficulty`
/// already encodes that via its `from_f64` path, so this is a thin wrapper.
pub fn target_from_difficulty(d: f64) -> Target {
    Difficulty::from_f64(d).to_target()
}

/// Inverse of `target_from_difficulty`, used by submit handling to log the
/// difficulty a winning share actually cleared.
pub fn difficulty_from_target(t: Target) -> f64 {
    Difficulty::from_target(t).as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, vec![0x00])]
    #[test_case(0xfc, vec![0xfc])]
    #[test_case(0xfd, vec![0xfd, 0xfd, 0x00])]
    #[test_case(0xffff, vec![0xfd, 0xff, 0xff])]
    #[test_case(0x1_0000, vec![0xfe, 0x00, 0x00, 0x01, 0x00])]
    #[test_case(0x1_0000_0000, vec![0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00])]
    fn varint_matches_known_encoding(n: u64, expected: Vec<u8>) {
        assert_eq!(varint(n), expected);
    }

    #[test]
    fn varint_bijective_over_sample() {
        for n in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, u32::MAX as u64, u64::MAX] {
            let encoded = varint(n);
            let (decoded, used) = read_varint(&encoded).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(used, encoded.len());
        }
    }

    #[test]
    fn pushdata_prefix_thresholds() {
        assert_eq!(pushdata_prefix(0x4b), vec![0x4b]);
        assert_eq!(pushdata_prefix(0x4c), vec![0x4c, 0x4c]);
        assert_eq!(pushdata_prefix(0x100), vec![0x4d, 0x00, 0x01]);
    }

    #[test]
    fn nbits_canonical_diff1() {
        let target = target_from_nbits(0x1d00ffff);
        assert_eq!(target, diff1_target());
    }

    #[test]
    fn nbits_monotonically_decreasing() {
        // Larger mantissa at the same exponent -> larger (easier) target.
        let easy = target_from_nbits(0x1d00ffff);
        let harder = target_from_nbits(0x1d007fff);
        assert!(harder < easy);
    }

    #[test]
    fn target_from_difficulty_roundtrips() {
        for d in [1.0, 2.0, 1024.0, 1_000_000.0] {
            let t = target_from_difficulty(d);
            let back = difficulty_from_target(t);
            assert!((back - d).abs() / d < 1e-6, "d={d} back={back}");
        }
    }
}
