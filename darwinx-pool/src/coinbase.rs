//! Segwit coinbase construction: BIP-34 height push, lane tag, extranonce
//! placeholders, payout output, witness commitment output — split at the
//! placeholder boundaries into `coinb1`/`coinb2` per §4.2.
//!
//! The split is computed by tracking byte offsets as the scriptSig is
//! assembled, not by scanning the serialized transaction for a placeholder
//! pattern: the builder controls the entire layout, so the offsets are known
//! exactly and a scan would only risk a false match against a coincidentally
//! zero-valued byte run elsewhere in the tx. See DESIGN.md.

use bitcoin::ScriptBuf;
use bitcoin::script::Builder as ScriptBuilder;
use thiserror::Error;

use crate::codec::{double_sha256, pushdata, pushdata_prefix, varint};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinbaseError {
    #[error("extranonce size must be 1-8 bytes, got {0}")]
    InvalidExtranonceSize(u8),
    #[error("template missing default_witness_commitment")]
    BadTemplate,
}

/// A lane tag used to partition the coinbase search space, per §9's note on
/// the (external) lane-tagging proxy; the core still stamps a tag so a
/// front proxy can demultiplex without the pool needing to know about it.
pub type LaneTag = [u8; 1];

pub const LANES: [LaneTag; 4] = [*b"A", *b"B", *b"C", *b"D"];

/// All the byte pieces needed to assemble the real coinbase (segwit, for
/// block submission and for `mining.notify`) or its legacy (witness-free)
/// counterpart (for the coinbase txid that feeds the merkle branch).
#[derive(Debug, Clone)]
pub struct CoinbaseTemplate {
    /// Everything from tx version through the combined
    /// `len(extranonce1+extranonce2)` pushdata opcode, inclusive. extranonce1
    /// and extranonce2 share that single push operand; there is no second
    /// opcode between them. Segwit-encoded (includes marker + flag).
    pub coinb1: Vec<u8>,
    /// Everything from `sequence` through `locktime`, inclusive. Segwit
    /// encoded (includes the witness stack).
    pub coinb2: Vec<u8>,
    pub extranonce1_size: u8,
    pub extranonce2_size: u8,

    legacy_prefix: Vec<u8>,
    legacy_suffix: Vec<u8>,
}

impl CoinbaseTemplate {
    /// Assemble the full coinbase (segwit form) once extranonce1 (session)
    /// and extranonce2 (miner-rolled) are known.
    pub fn full_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut out = self.coinb1.clone();
        out.extend_from_slice(extranonce1);
        out.extend_from_slice(extranonce2);
        out.extend_from_slice(&self.coinb2);
        out
    }

    /// Legacy (no marker/flag/witness) coinbase txid, the leaf used in
    /// merkle branch folding.
    pub fn legacy_txid(&self, extranonce1: &[u8], extranonce2: &[u8]) -> [u8; 32] {
        let mut buf = self.legacy_prefix.clone();
        buf.extend_from_slice(extranonce1);
        buf.extend_from_slice(extranonce2);
        buf.extend_from_slice(&self.legacy_suffix);
        double_sha256(&buf)
    }
}

pub struct CoinbaseParams<'a> {
    pub height: u64,
    pub lane_tag: LaneTag,
    pub job_seq: u32,
    pub extranonce1_size: u8,
    pub extranonce2_size: u8,
    pub payout_script: &'a ScriptBuf,
    pub coinbase_value_sats: u64,
    pub witness_commitment_script: &'a ScriptBuf,
}

pub fn build_coinbase(params: CoinbaseParams<'_>) -> Result<CoinbaseTemplate, CoinbaseError> {
    if !(1..=8).contains(&params.extranonce1_size) {
        return Err(CoinbaseError::InvalidExtranonceSize(params.extranonce1_size));
    }
    if !(1..=8).contains(&params.extranonce2_size) {
        return Err(CoinbaseError::InvalidExtranonceSize(params.extranonce2_size));
    }

    let bip34_height_push = ScriptBuilder::new()
        .push_int(params.height as i64)
        .into_script()
        .into_bytes();

    let mut tag_bytes = Vec::with_capacity(1 + 4);
    tag_bytes.extend_from_slice(&params.lane_tag);
    tag_bytes.extend_from_slice(&params.job_seq.to_le_bytes());
    let tag_push = pushdata(&tag_bytes);

    let mut prefix_before_en1 = bip34_height_push;
    prefix_before_en1.extend_from_slice(&tag_push);

    // extranonce1 and extranonce2 are written back-to-back as the operand of
    // a single pushdata opcode, sized for their combined length — there is
    // no second opcode between them, so the script only ever has one push
    // covering both pieces.
    let en_push_prefix =
        pushdata_prefix(params.extranonce1_size as usize + params.extranonce2_size as usize);
    let en1_placeholder = vec![0u8; params.extranonce1_size as usize];
    let en2_placeholder = vec![0u8; params.extranonce2_size as usize];

    let scriptsig_len =
        prefix_before_en1.len() + en_push_prefix.len() + en1_placeholder.len() + en2_placeholder.len();

    let version_bytes = 2i32.to_le_bytes();
    let marker_flag = [0x00u8, 0x01u8];
    let txin_count = varint(1);
    let mut outpoint = [0u8; 36];
    outpoint[32..].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
    let scriptsig_len_varint = varint(scriptsig_len as u64);
    let sequence = 0xffff_ffffu32.to_le_bytes();
    let txout_count = varint(2);

    let payout_txout = {
        let mut v = Vec::new();
        v.extend_from_slice(&params.coinbase_value_sats.to_le_bytes());
        v.extend_from_slice(&varint(params.payout_script.len() as u64));
        v.extend_from_slice(params.payout_script.as_bytes());
        v
    };
    let commitment_txout = {
        let mut v = Vec::new();
        v.extend_from_slice(&0u64.to_le_bytes());
        v.extend_from_slice(&varint(params.witness_commitment_script.len() as u64));
        v.extend_from_slice(params.witness_commitment_script.as_bytes());
        v
    };
    let witness_stack = {
        let mut v = Vec::new();
        v.extend_from_slice(&varint(1)); // one witness item
        v.extend_from_slice(&varint(32)); // 32-byte reserved value
        v.extend_from_slice(&[0u8; 32]);
        v
    };
    let locktime = 0u32.to_le_bytes();

    let mut coinb1 = Vec::new();
    coinb1.extend_from_slice(&version_bytes);
    coinb1.extend_from_slice(&marker_flag);
    coinb1.extend_from_slice(&txin_count);
    coinb1.extend_from_slice(&outpoint);
    coinb1.extend_from_slice(&scriptsig_len_varint);
    coinb1.extend_from_slice(&prefix_before_en1);
    coinb1.extend_from_slice(&en_push_prefix);

    let mut coinb2 = Vec::new();
    coinb2.extend_from_slice(&sequence);
    coinb2.extend_from_slice(&txout_count);
    coinb2.extend_from_slice(&payout_txout);
    coinb2.extend_from_slice(&commitment_txout);
    coinb2.extend_from_slice(&witness_stack);
    coinb2.extend_from_slice(&locktime);

    let mut legacy_prefix = Vec::new();
    legacy_prefix.extend_from_slice(&version_bytes);
    legacy_prefix.extend_from_slice(&txin_count);
    legacy_prefix.extend_from_slice(&outpoint);
    legacy_prefix.extend_from_slice(&scriptsig_len_varint);
    legacy_prefix.extend_from_slice(&prefix_before_en1);
    legacy_prefix.extend_from_slice(&en_push_prefix);

    let mut legacy_suffix = Vec::new();
    legacy_suffix.extend_from_slice(&sequence);
    legacy_suffix.extend_from_slice(&txout_count);
    legacy_suffix.extend_from_slice(&payout_txout);
    legacy_suffix.extend_from_slice(&commitment_txout);
    legacy_suffix.extend_from_slice(&locktime);

    Ok(CoinbaseTemplate {
        coinb1,
        coinb2,
        extranonce1_size: params.extranonce1_size,
        extranonce2_size: params.extranonce2_size,
        legacy_prefix,
        legacy_suffix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::OP_RETURN;
    use bitcoin::script::Builder as ScriptBuilder;

    fn sample_template() -> CoinbaseTemplate {
        let payout = ScriptBuilder::new()
            .push_opcode(bitcoin::opcodes::all::OP_PUSHBYTES_0)
            .push_slice([0xaa; 20])
            .into_script();
        let commitment = ScriptBuilder::new()
            .push_opcode(OP_RETURN)
            .push_slice([0xbb; 36])
            .into_script();

        build_coinbase(CoinbaseParams {
            height: 210_000,
            lane_tag: *b"A",
            job_seq: 7,
            extranonce1_size: 4,
            extranonce2_size: 4,
            payout_script: &payout,
            coinbase_value_sats: 5_000_000_000,
            witness_commitment_script: &commitment,
        })
        .unwrap()
    }

    #[test]
    fn split_recombines_to_full_coinbase() {
        let tmpl = sample_template();
        let en1 = [0x11, 0x22, 0x33, 0x44];
        let en2 = [0x55, 0x66, 0x77, 0x88];

        let mut expected = tmpl.coinb1.clone();
        expected.extend_from_slice(&en1);
        expected.extend_from_slice(&en2);
        expected.extend_from_slice(&tmpl.coinb2);

        assert_eq!(tmpl.full_coinbase(&en1, &en2), expected);
    }

    #[test]
    fn legacy_txid_excludes_witness() {
        let tmpl = sample_template();
        let en1 = [0u8; 4];
        let en2 = [0u8; 4];

        let full = tmpl.full_coinbase(&en1, &en2);
        // marker+flag present right after the 4-byte version in the segwit form.
        assert_eq!(&full[4..6], &[0x00, 0x01]);

        let legacy = tmpl.legacy_txid(&en1, &en2);
        assert_eq!(legacy, double_sha256(&{
            let mut v = tmpl.legacy_prefix.clone();
            v.extend_from_slice(&en1);
            v.extend_from_slice(&en2);
            v.extend_from_slice(&tmpl.legacy_suffix);
            v
        }));
    }

    #[test]
    fn declared_scriptsig_len_matches_written_bytes() {
        let tmpl = sample_template();
        let en1 = [0x11, 0x22, 0x33, 0x44];
        let en2 = [0x55, 0x66, 0x77, 0x88];
        let full = tmpl.full_coinbase(&en1, &en2);

        // version(4) + marker+flag(2) + txin_count(1) + outpoint(36)
        let mut cursor = 4 + 2 + 1 + 36;
        let (scriptsig_len, varint_len) = read_varint(&full[cursor..]);
        cursor += varint_len;
        let scriptsig = &full[cursor..cursor + scriptsig_len as usize];
        cursor += scriptsig_len as usize;

        // sequence immediately follows scriptSig; 0xffff_ffff by construction.
        assert_eq!(&full[cursor..cursor + 4], &0xffff_ffffu32.to_le_bytes());
        // scriptSig must end with extranonce1 || extranonce2, not be
        // truncated by an undeclared pushdata opcode in between.
        assert!(scriptsig.ends_with(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]));
    }

    fn read_varint(buf: &[u8]) -> (u64, usize) {
        match buf[0] {
            0xfd => (u16::from_le_bytes([buf[1], buf[2]]) as u64, 3),
            0xfe => (u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as u64, 5),
            n => (n as u64, 1),
        }
    }

    #[test]
    fn rejects_oversized_extranonce() {
        let payout = ScriptBuilder::new().into_script();
        let commitment = ScriptBuilder::new().into_script();
        let err = build_coinbase(CoinbaseParams {
            height: 100,
            lane_tag: *b"A",
            job_seq: 0,
            extranonce1_size: 9,
            extranonce2_size: 4,
            payout_script: &payout,
            coinbase_value_sats: 0,
            witness_commitment_script: &commitment,
        })
        .unwrap_err();
        assert_eq!(err, CoinbaseError::InvalidExtranonceSize(9));
    }
}
