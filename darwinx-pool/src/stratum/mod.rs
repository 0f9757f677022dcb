pub mod session;
pub mod wire;

use std::sync::Arc;

use bitcoin::ScriptBuf;

use crate::job::{ActiveJobs, JobBuilder};
use crate::ledger::Ledger;
use crate::scorer::Scorer;
use crate::submitter::Submitter;
use crate::template::TemplateManager;
use crate::vardiff::VarDiffConfig;

/// Shared, read-mostly state every session handler needs. One instance per
/// running pool, `Arc`-cloned into each connection task.
pub struct PoolContext {
    pub active_jobs: Arc<ActiveJobs>,
    pub job_builder: Arc<JobBuilder>,
    pub template_manager: Arc<TemplateManager>,
    pub ledger: Arc<Ledger>,
    pub submitter: Arc<Submitter>,
    pub scorer: Option<Arc<Scorer>>,
    pub payout_script: Arc<ScriptBuf>,
    pub extranonce1_size: u8,
    pub extranonce2_size: u8,
    pub vardiff_config: VarDiffConfig,
    /// Maximum allowed drift, in seconds, between a submitted `ntime` and the
    /// session's view of current time (§4.6, ±2h by convention).
    pub max_ntime_drift_secs: u32,
    /// Carries the current template's `job_seq` every time the refresh loop
    /// observes a genuinely new template (including, but not limited to, a
    /// `prev_hash` change). Connection tasks subscribe and push a fresh
    /// `clean=true` job whenever the value changes, so a long-lived miner
    /// never keeps hashing a stale template (§4.3/§4.6).
    pub template_notify: tokio::sync::watch::Sender<u64>,
}
