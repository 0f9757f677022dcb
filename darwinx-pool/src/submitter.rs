//! Block assembly and submission (§4.7): reassembles the full block body
//! from a winning job and its extranonces, calls `submitblock`, and records
//! the outcome on the ledger.

use std::sync::Arc;

use thiserror::Error;

use crate::codec::varint;
use crate::job::Job;
use crate::ledger::{Ledger, LedgerError};
use crate::rpc::{RpcClient, RpcError};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("rpc error submitting block: {0}")]
    Rpc(#[from] RpcError),
    #[error("ledger error recording block: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    Rejected(String),
}

/// Serializes `header || varint(tx_count) || coinbase || tx...` as a hex
/// string ready for `submitblock`.
pub fn assemble_block_hex(header: &[u8; 80], job: &Job, extranonce1: &[u8], extranonce2: &[u8]) -> String {
    let coinbase = job.coinbase.full_coinbase(extranonce1, extranonce2);
    let tx_count = 1 + job.template.transactions.len();

    let mut body = Vec::with_capacity(80 + 8 + coinbase.len() + job.template.transactions.len() * 256);
    body.extend_from_slice(header);
    body.extend_from_slice(&varint(tx_count as u64));
    body.extend_from_slice(&coinbase);
    for tx in &job.template.transactions {
        body.extend_from_slice(&tx.data);
    }

    hex::encode(body)
}

pub struct Submitter {
    rpc: Arc<RpcClient>,
    ledger: Arc<Ledger>,
}

impl Submitter {
    pub fn new(rpc: Arc<RpcClient>, ledger: Arc<Ledger>) -> Self {
        Self { rpc, ledger }
    }

    /// Submits a winning share's block and records it on the ledger,
    /// closing the round it belonged to. The submission is attempted even
    /// if the node later rejects it (e.g. stale tip) — the rejection itself
    /// is recorded rather than dropped.
    pub async fn submit(
        &self,
        job: &Job,
        extranonce1: &[u8],
        extranonce2: &[u8],
        header: &[u8; 80],
        round_id: i64,
    ) -> Result<SubmitStatus, SubmitError> {
        let block_hex = assemble_block_hex(header, job, extranonce1, extranonce2);
        let header_hash_be = {
            let digest = crate::codec::double_sha256(header);
            let mut be = digest;
            be.reverse();
            hex::encode(be)
        };

        let status = match self.rpc.submit_block(&block_hex).await {
            Ok(()) => SubmitStatus::Accepted,
            Err(RpcError::Node { message, .. }) => SubmitStatus::Rejected(message),
            Err(other) => return Err(other.into()),
        };

        let ledger_status = match &status {
            SubmitStatus::Accepted => "submitted".to_string(),
            SubmitStatus::Rejected(message) => format!("error:{message}"),
        };

        self.ledger
            .record_block_candidate(
                round_id,
                job.template.height as i64,
                &header_hash_be,
                &hex::encode(job.template.prev_hash_be),
                &ledger_status,
                job.template.coinbase_value_sats as i64,
            )
            .await?;

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coinbase::{CoinbaseParams, build_coinbase};
    use crate::job::Job;
    use crate::merkle::compute_branch;
    use crate::template::{Template, TemplateTx};
    use bitcoin::ScriptBuf;

    fn sample_job() -> Job {
        let payout = ScriptBuf::from_bytes(vec![0u8, 0x14].into_iter().chain([0xaa; 20]).collect());
        let commitment = ScriptBuf::from_bytes(vec![0x6a, 0x02, 0xaa, 0xbb]);
        let coinbase = build_coinbase(CoinbaseParams {
            height: 1,
            lane_tag: *b"A",
            job_seq: 0,
            extranonce1_size: 4,
            extranonce2_size: 4,
            payout_script: &payout,
            coinbase_value_sats: 5_000_000_000,
            witness_commitment_script: &commitment,
        })
        .unwrap();

        let template = Arc::new(Template {
            height: 1,
            version: 0x2000_0000,
            prev_hash_be: [0x11; 32],
            curtime: 1_700_000_000,
            nbits: 0x1d00ffff,
            coinbase_value_sats: 5_000_000_000,
            default_witness_commitment: Some(commitment),
            transactions: vec![TemplateTx { data: vec![0xde, 0xad, 0xbe, 0xef], txid_be: [0x22; 32] }],
            network_difficulty: 1.0,
            job_seq: 1,
        });

        let merkle_branch = compute_branch(&[[0u8; 32], {
            let mut t = [0x22; 32];
            t.reverse();
            t
        }]);

        Job {
            id: "job-1".into(),
            template,
            coinbase,
            merkle_branch,
            version: 0x2000_0000,
            nbits: 0x1d00ffff,
            ntime: 1_700_000_000,
            lane: *b"A",
            score: None,
        }
    }

    #[test]
    fn assembled_block_contains_header_and_all_tx_payloads() {
        let job = sample_job();
        let header = [0u8; 80];
        let hex_body = assemble_block_hex(&header, &job, &[0u8; 4], &[0u8; 4]);
        let bytes = hex::decode(&hex_body).unwrap();

        assert_eq!(&bytes[0..80], &header[..]);
        assert!(bytes.windows(4).any(|w| w == [0xde, 0xad, 0xbe, 0xef]));
    }
}
