//! Job builder and the active-jobs registry (§4.4).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitcoin::ScriptBuf;
use bitcoin::pow::Target;
use parking_lot::RwLock;
use rand::Rng;

use crate::coinbase::{CoinbaseError, CoinbaseParams, CoinbaseTemplate, LANES, LaneTag, build_coinbase};
use crate::codec::target_from_nbits;
use crate::merkle::compute_branch;
use crate::template::Template;

/// Scored metadata attached by the (optional) DarwinX scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobScore {
    pub score: f64,
    pub hash_norm: f64,
    pub entropy: f64,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub template: Arc<Template>,
    pub coinbase: CoinbaseTemplate,
    /// Sibling hashes in internal byte order; reverse to BE hex at the wire boundary.
    pub merkle_branch: Vec<[u8; 32]>,
    pub version: u32,
    pub nbits: u32,
    pub ntime: u32,
    pub lane: LaneTag,
    pub score: Option<JobScore>,
}

impl Job {
    pub fn net_target(&self) -> Target {
        target_from_nbits(self.nbits)
    }

    pub fn prev_hash_internal(&self) -> [u8; 32] {
        let mut v = self.template.prev_hash_be;
        v.reverse();
        v
    }

    pub fn merkle_root(&self, extranonce1: &[u8], extranonce2: &[u8]) -> [u8; 32] {
        let legacy_txid = self.coinbase.legacy_txid(extranonce1, extranonce2);
        crate::merkle::fold_branch(legacy_txid, &self.merkle_branch)
    }

    /// Assemble the 80-byte header for a candidate submission.
    pub fn header_bytes(&self, extranonce1: &[u8], extranonce2: &[u8], nonce: u32) -> [u8; 80] {
        let merkle_root = self.merkle_root(extranonce1, extranonce2);

        let mut header = [0u8; 80];
        header[0..4].copy_from_slice(&self.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_hash_internal());
        header[36..68].copy_from_slice(&merkle_root);
        header[68..72].copy_from_slice(&self.ntime.to_le_bytes());
        header[72..76].copy_from_slice(&self.nbits.to_le_bytes());
        header[76..80].copy_from_slice(&nonce.to_le_bytes());
        header
    }
}

pub struct JobBuilderParams<'a> {
    pub template: Arc<Template>,
    pub payout_script: &'a ScriptBuf,
    pub extranonce1_size: u8,
    pub extranonce2_size: u8,
}

/// Builds jobs from a template, rotating round-robin across `LANES` and
/// computing the merkle branch once per template (shared by all lanes,
/// since the branch only depends on the set of non-coinbase txids).
pub struct JobBuilder {
    lane_cursor: AtomicU64,
    seq_counter: AtomicU64,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            lane_cursor: AtomicU64::new(0),
            seq_counter: AtomicU64::new(0),
        }
    }

    fn next_lane(&self) -> LaneTag {
        let idx = self.lane_cursor.fetch_add(1, Ordering::Relaxed) as usize % LANES.len();
        LANES[idx]
    }

    pub fn build(&self, params: JobBuilderParams<'_>) -> Result<Job, CoinbaseError> {
        let template = params.template;
        let lane = self.next_lane();
        let job_seq = self.seq_counter.fetch_add(1, Ordering::Relaxed) as u32;

        let witness_commitment = template
            .default_witness_commitment
            .clone()
            .ok_or(CoinbaseError::BadTemplate)?;

        let coinbase = build_coinbase(CoinbaseParams {
            height: template.height,
            lane_tag: lane,
            job_seq,
            extranonce1_size: params.extranonce1_size,
            extranonce2_size: params.extranonce2_size,
            payout_script: params.payout_script,
            coinbase_value_sats: template.coinbase_value_sats,
            witness_commitment_script: &witness_commitment,
        })?;

        let mut leaves = Vec::with_capacity(template.transactions.len() + 1);
        // Placeholder coinbase leaf at index 0; the real leaf substitutes in
        // at header-assembly time once extranonce1/2 are known.
        leaves.push([0u8; 32]);
        for tx in &template.transactions {
            let mut internal = tx.txid_be;
            internal.reverse();
            leaves.push(internal);
        }
        let merkle_branch = compute_branch(&leaves);

        let job_id = format!("{:08x}-{}-{:04x}", template.job_seq, lane_char(&lane), job_seq);

        Ok(Job {
            id: job_id,
            version: template.version,
            nbits: template.nbits,
            ntime: template.curtime,
            template,
            coinbase,
            merkle_branch,
            lane,
            score: None,
        })
    }
}

fn lane_char(lane: &LaneTag) -> char {
    lane[0] as char
}

/// Bounded registry of jobs currently valid for submission.
///
/// Many writers (one job builder call per template refresh), many readers
/// (session tasks resolving `job_id` on submit). Plain oldest-first FIFO
/// eviction once `max_entries` is exceeded — stale jobs past a `prev_hash`
/// boundary are already rejected at share-validation time via `get`
/// returning `None`, so eviction only needs to bound memory, not track
/// round boundaries itself.
pub struct ActiveJobs {
    max_entries: usize,
    inner: RwLock<Inner>,
}

struct Inner {
    jobs: HashMap<String, Arc<Job>>,
    order: VecDeque<String>,
}

impl ActiveJobs {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: RwLock::new(Inner {
                jobs: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn insert(&self, job: Job) -> Arc<Job> {
        let arc = Arc::new(job);
        let mut inner = self.inner.write();
        inner.order.push_back(arc.id.clone());
        inner.jobs.insert(arc.id.clone(), arc.clone());

        while inner.jobs.len() > self.max_entries {
            let Some(oldest_id) = inner.order.pop_front() else {
                break;
            };
            inner.jobs.remove(&oldest_id);
        }

        arc
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<Job>> {
        self.inner.read().jobs.get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A random, per-session extranonce1 of `size` bytes.
pub fn generate_extranonce1(size: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; size as usize];
    rand::thread_rng().fill(bytes.as_mut_slice());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateTx;

    fn template_with(n_tx: usize, prev_hash: [u8; 32]) -> Arc<Template> {
        Arc::new(Template {
            height: 210_000,
            version: 0x2000_0000,
            prev_hash_be: prev_hash,
            curtime: 1_700_000_000,
            nbits: 0x1d00ffff,
            coinbase_value_sats: 5_000_000_000,
            default_witness_commitment: Some(ScriptBuf::from_bytes(vec![0x6a, 0x02, 0xaa, 0xbb])),
            transactions: (0..n_tx)
                .map(|i| TemplateTx {
                    data: vec![0u8; 10],
                    txid_be: [i as u8; 32],
                })
                .collect(),
            network_difficulty: 1.0,
            job_seq: 1,
        })
    }

    #[test]
    fn builder_assigns_unique_ids_and_rotates_lanes() {
        let builder = JobBuilder::new();
        let payout = ScriptBuf::from_bytes(vec![0u8, 0x14].into_iter().chain([0xaa; 20]).collect());
        let template = template_with(3, [0u8; 32]);

        let job_a = builder
            .build(JobBuilderParams {
                template: template.clone(),
                payout_script: &payout,
                extranonce1_size: 4,
                extranonce2_size: 4,
            })
            .unwrap();
        let job_b = builder
            .build(JobBuilderParams {
                template,
                payout_script: &payout,
                extranonce1_size: 4,
                extranonce2_size: 4,
            })
            .unwrap();

        assert_ne!(job_a.id, job_b.id);
        assert_ne!(job_a.lane, job_b.lane);
    }

    #[test]
    fn active_jobs_evicts_beyond_capacity() {
        let registry = ActiveJobs::new(2);
        let builder = JobBuilder::new();
        let payout = ScriptBuf::from_bytes(vec![0u8, 0x14].into_iter().chain([0xaa; 20]).collect());
        let template = template_with(0, [0u8; 32]);

        for _ in 0..3 {
            let job = builder
                .build(JobBuilderParams {
                    template: template.clone(),
                    payout_script: &payout,
                    extranonce1_size: 4,
                    extranonce2_size: 4,
                })
                .unwrap();
            registry.insert(job);
        }

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn header_bytes_has_correct_length_and_fields() {
        let builder = JobBuilder::new();
        let payout = ScriptBuf::from_bytes(vec![0u8, 0x14].into_iter().chain([0xaa; 20]).collect());
        let template = template_with(2, [0x11; 32]);
        let job = builder
            .build(JobBuilderParams {
                template,
                payout_script: &payout,
                extranonce1_size: 4,
                extranonce2_size: 4,
            })
            .unwrap();

        let header = job.header_bytes(&[0u8; 4], &[0u8; 4], 42);
        assert_eq!(header.len(), 80);
        assert_eq!(&header[76..80], &42u32.to_le_bytes());
    }
}
