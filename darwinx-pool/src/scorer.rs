//! DarwinX scorer (optional path, §4.5): a bounded ranked pool of prebuilt
//! jobs, prioritized by header-hash magnitude and merkle-root entropy.
//! Provides no soundness guarantee for mining — it is a prioritizer only.

use std::sync::Arc;

use rand::Rng;

use crate::codec::double_sha256;
use crate::job::Job;

#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    pub pool_size: usize,
    pub weight_hash: f64,
    pub weight_entropy: f64,
    pub ntime_drift_seconds: u32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            weight_hash: 0.5,
            weight_entropy: 0.5,
            ntime_drift_seconds: 600,
        }
    }
}

/// A job paired with the score it was ranked under, exposed to the stats
/// surface via `Scorer::top`.
#[derive(Debug, Clone)]
pub struct ScoredJob {
    pub job: Arc<Job>,
    pub score: f64,
    pub hash_norm: f64,
    pub entropy: f64,
}

pub struct Scorer {
    config: ScorerConfig,
    pool: parking_lot::RwLock<Vec<ScoredJob>>,
}

impl Scorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            config,
            pool: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Score a candidate job against a trial extranonce2 and ntime, and add
    /// it to the pool, evicting the lowest-scored entry if at capacity.
    pub fn offer(&self, job: Arc<Job>, extranonce1: &[u8], extranonce2: &[u8]) {
        let scored = score_job(&self.config, job, extranonce1, extranonce2);

        let mut pool = self.pool.write();
        pool.push(scored);
        pool.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        pool.truncate(self.config.pool_size);
    }

    /// Pop the highest-scored job, if any.
    pub fn lease_best(&self) -> Option<ScoredJob> {
        let mut pool = self.pool.write();
        if pool.is_empty() { None } else { Some(pool.remove(0)) }
    }

    /// Top-N scored jobs currently held, for the stats API — mirrors the
    /// `top_list` snapshot the original engine exposed.
    pub fn top(&self, n: usize) -> Vec<ScoredJob> {
        self.pool.read().iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pool.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.config.pool_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn score_job(config: &ScorerConfig, job: Arc<Job>, extranonce1: &[u8], extranonce2: &[u8]) -> ScoredJob {
    let drift = config.ntime_drift_seconds;
    let trial_ntime = if drift == 0 {
        job.ntime
    } else {
        let offset = rand::thread_rng().gen_range(0..=(2 * drift));
        job.ntime.wrapping_add(offset).wrapping_sub(drift)
    };

    let merkle_root = job.merkle_root(extranonce1, extranonce2);
    let mut header = job.header_bytes(extranonce1, extranonce2, 0);
    header[68..72].copy_from_slice(&trial_ntime.to_le_bytes());
    let digest = double_sha256(&header);

    let hash_norm = hash_norm_from_digest(&digest);
    let entropy = shannon_byte_entropy(&merkle_root) / 8.0;
    let score = config.weight_hash * (1.0 - hash_norm) + config.weight_entropy * (1.0 - entropy);

    ScoredJob {
        job,
        score,
        hash_norm,
        entropy,
    }
}

/// Approximates `H_int / (2^256 - 1)` using only the most-significant 8
/// bytes of the little-endian digest (the bytes that dominate ordering);
/// this is a ranking signal, not a probability, so the lost precision in
/// the low 24 bytes doesn't matter (§9).
fn hash_norm_from_digest(digest: &[u8; 32]) -> f64 {
    let mut be = *digest;
    be.reverse();
    let top8: [u8; 8] = be[0..8].try_into().unwrap();
    u64::from_be_bytes(top8) as f64 / (u64::MAX as f64 + 1.0)
}

fn shannon_byte_entropy(data: &[u8]) -> f64 {
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_uniform_bytes_is_near_max() {
        let data: Vec<u8> = (0..=255u8).collect();
        let ent = shannon_byte_entropy(&data);
        assert!((ent - 8.0).abs() < 1e-9);
    }

    #[test]
    fn entropy_of_constant_bytes_is_zero() {
        let data = vec![7u8; 32];
        assert_eq!(shannon_byte_entropy(&data), 0.0);
    }

    #[test]
    fn hash_norm_of_zero_digest_is_zero() {
        assert_eq!(hash_norm_from_digest(&[0u8; 32]), 0.0);
    }

    #[test]
    fn hash_norm_of_max_digest_is_near_one() {
        assert!(hash_norm_from_digest(&[0xff; 32]) > 0.999);
    }
}
