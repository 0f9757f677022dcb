//! Per-connection Stratum session state machine (§4.6).
//!
//! `Connected -> Subscribed -> Authorized -> Working`. A session only ever
//! moves forward; a submit before `Authorized` or a job lookup miss is
//! handled without panicking, since the other end of the wire is untrusted
//! input.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use bitcoin::ScriptBuf;
use serde_json::{Value, json};

use crate::address::looks_like_address;
use crate::codec::{hash_as_target, target_from_difficulty};
use crate::job::{Job, JobBuilderParams, JobScore, generate_extranonce1};
use crate::vardiff::{Adjustment, VarDiff};

use super::PoolContext;
use super::wire::{self, Request};
use crate::tracing::prelude::*;

/// Cap on `Session::seen_shares`, FIFO-evicted like `ActiveJobs` so a
/// long-lived high-rate connection doesn't grow its dedup set without bound.
const MAX_SEEN_SHARES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Subscribed,
    Authorized,
    Working,
}

/// What a submitted share turned out to be, for the caller (the connection
/// task) to log and, on `Block`, hand off to the submitter. Variants map
/// onto the rejection policy table in §7.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareOutcome {
    Accepted,
    Block { header: [u8; 80], job: Arc<Job>, extranonce2_hex: String, round_id: i64 },
    StaleJob,
    DuplicateShare,
    BadNtime,
    LowDifficulty,
    Malformed,
}

/// A winning share waiting for the connection task to hand off to the
/// submitter, stashed by `handle_submit` since `Session::handle`'s return
/// type is just the wire responses to write back.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub header: [u8; 80],
    pub job: Arc<Job>,
    pub extranonce1: Vec<u8>,
    pub extranonce2_hex: String,
    pub round_id: i64,
}

pub struct Session {
    ctx: Arc<PoolContext>,
    state: SessionState,
    extranonce1: Vec<u8>,
    username: Option<String>,
    miner_id: Option<i64>,
    vardiff: VarDiff,
    current_job: Option<Arc<Job>>,
    seen_shares: HashSet<(String, String, u32, u32)>,
    seen_shares_order: VecDeque<(String, String, u32, u32)>,
    pending_block: Option<PendingBlock>,
}

impl Session {
    pub fn new(ctx: Arc<PoolContext>) -> Self {
        let extranonce1 = generate_extranonce1(ctx.extranonce1_size);
        let vardiff = VarDiff::new(ctx.vardiff_config);
        Self {
            ctx,
            state: SessionState::Connected,
            extranonce1,
            username: None,
            miner_id: None,
            vardiff,
            current_job: None,
            seen_shares: HashSet::new(),
            seen_shares_order: VecDeque::new(),
            pending_block: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Takes the most recently discovered block candidate, if any, for the
    /// caller to hand to the submitter. Clears it so it is only returned once.
    pub fn take_pending_block(&mut self) -> Option<PendingBlock> {
        self.pending_block.take()
    }

    /// Dispatch one parsed request, returning every line that should be
    /// written back to the miner (in order): the RPC reply, then any
    /// notifications it provokes (`set_difficulty`, `mining.notify`).
    pub async fn handle(&mut self, req: &Request) -> Vec<Value> {
        match req.method.as_str() {
            "mining.subscribe" => self.handle_subscribe(req.id.clone()),
            "mining.authorize" => self.handle_authorize(req.id.clone(), &req.params).await,
            "mining.extranonce.subscribe" => {
                vec![wire::ok_response(req.id.clone(), json!(true))]
            }
            "mining.submit" => self.handle_submit(req.id.clone(), &req.params).await,
            _ => vec![wire::unknown_method_response(req.id.clone())],
        }
    }

    fn handle_subscribe(&mut self, id: Option<Value>) -> Vec<Value> {
        self.state = SessionState::Subscribed;

        let subscribe_result = json!([
            ["mining.set_difficulty", "mining.notify"],
            hex::encode(&self.extranonce1),
            self.ctx.extranonce2_size,
        ]);

        let mut out = vec![wire::ok_response(id, subscribe_result)];
        out.push(wire::notify("mining.set_difficulty", json!([self.vardiff.current()])));
        if let Some(job_line) = self.push_current_template_as_job(true) {
            out.push(job_line);
        }
        out
    }

    async fn handle_authorize(&mut self, id: Option<Value>, params: &[Value]) -> Vec<Value> {
        let Some((username, _password)) = parse_authorize_params(params) else {
            return vec![wire::err_response(id, 24, "Unauthorized")];
        };

        let address = username.split('.').next().unwrap_or(&username);
        if !looks_like_address(address) {
            return vec![wire::err_response(id, 24, "Unauthorized")];
        }

        match self.ctx.ledger.upsert_miner(&username, address).await {
            Ok(miner_id) => {
                self.miner_id = Some(miner_id);
                self.username = Some(username);
                self.state = SessionState::Authorized;
                vec![wire::ok_response(id, json!(true))]
            }
            Err(_) => vec![wire::err_response(id, 24, "Unauthorized")],
        }
    }

    async fn handle_submit(&mut self, id: Option<Value>, params: &[Value]) -> Vec<Value> {
        if self.state != SessionState::Authorized && self.state != SessionState::Working {
            return vec![wire::err_response(id, 24, "Unauthorized")];
        }

        let now = std::time::Instant::now();
        if self.vardiff.flood_exceeded(now) {
            // Drop without recording: protects the process from a runaway
            // miner independent of vardiff's own rate-target convergence.
            return vec![wire::false_response(id)];
        }

        let Some(submit) = parse_submit_params(params) else {
            return vec![wire::false_response(id)];
        };

        let outcome = self.validate_and_score_share(&submit).await;

        let response = match &outcome {
            ShareOutcome::Accepted | ShareOutcome::Block { .. } => wire::ok_response(id, json!(true)),
            ShareOutcome::StaleJob => wire::err_response(id, 21, "Stale job"),
            ShareOutcome::DuplicateShare | ShareOutcome::BadNtime | ShareOutcome::Malformed => {
                wire::false_response(id)
            }
            ShareOutcome::LowDifficulty => wire::false_response(id),
        };

        if let ShareOutcome::Block { header, job, extranonce2_hex, round_id } = outcome {
            self.pending_block = Some(PendingBlock {
                header,
                job,
                extranonce1: self.extranonce1.clone(),
                extranonce2_hex,
                round_id,
            });
        }

        let mut out = vec![response];
        if self.vardiff.record_share(now) != Adjustment::Unchanged {
            out.push(wire::notify("mining.set_difficulty", json!([self.vardiff.current()])));
        }
        out
    }

    /// Records a share key for duplicate detection, evicting the oldest
    /// entry once `MAX_SEEN_SHARES` is exceeded. Returns `false` if the key
    /// was already present (a duplicate).
    fn remember_share(&mut self, key: (String, String, u32, u32)) -> bool {
        if !self.seen_shares.insert(key.clone()) {
            return false;
        }
        self.seen_shares_order.push_back(key);
        while self.seen_shares_order.len() > MAX_SEEN_SHARES {
            let Some(oldest) = self.seen_shares_order.pop_front() else {
                break;
            };
            self.seen_shares.remove(&oldest);
        }
        true
    }

    async fn validate_and_score_share(&mut self, submit: &SubmitParams) -> ShareOutcome {
        let Some(job) = self.ctx.active_jobs.get(&submit.job_id) else {
            return ShareOutcome::StaleJob;
        };

        let Ok(extranonce2) =
            crate::extranonce2::Extranonce2::from_hex(&submit.extranonce2_hex, self.ctx.extranonce2_size)
        else {
            return ShareOutcome::Malformed;
        };
        let extranonce2_bytes: Vec<u8> = extranonce2.into();

        // Key on the decoded bytes, not the submitted hex string, so
        // resubmitting the same share with different hex letter-casing still
        // hits the dedup filter.
        let key = (
            submit.job_id.clone(),
            hex::encode(&extranonce2_bytes),
            submit.ntime,
            submit.nonce,
        );
        if !self.remember_share(key) {
            return ShareOutcome::DuplicateShare;
        }

        let now = now_unix();
        let drift = self.ctx.max_ntime_drift_secs as i64;
        if (submit.ntime as i64 - now as i64).unsigned_abs() as i64 > drift {
            return ShareOutcome::BadNtime;
        }

        let mut header = job.header_bytes(&self.extranonce1, &extranonce2_bytes, submit.nonce);
        header[68..72].copy_from_slice(&submit.ntime.to_le_bytes());
        header[72..76].copy_from_slice(&job.nbits.to_le_bytes());
        let digest = crate::codec::double_sha256(&header);
        let hash_value = hash_as_target(&digest);

        let session_target = target_from_difficulty(self.vardiff.current());
        let is_block = hash_value <= job.net_target();
        // A block-worthy share always counts as valid, even on a session
        // target stricter than the network target (diff_min/diff_max
        // misconfigured above network difficulty, or a low-difficulty
        // chain) -- otherwise it would be rejected as low-difficulty before
        // `is_block` is ever acted on, below.
        let is_valid = hash_value <= session_target || is_block;

        let round = self.ctx.ledger.open_round().await.ok();
        if let (Some(miner_id), Some(round)) = (self.miner_id, &round) {
            let _ = self
                .ctx
                .ledger
                .record_share(miner_id, round.id, self.vardiff.current(), is_valid, &hex::encode(digest))
                .await;
        }

        if !is_valid {
            return ShareOutcome::LowDifficulty;
        }

        self.state = SessionState::Working;

        if is_block {
            let Some(round) = round else {
                // `open_round()` failed (e.g. the ledger's connection was
                // busy) for a genuine block-worthy share. There's no round
                // to attach it to, so it can't be submitted through the
                // normal path; surface it loudly rather than silently
                // downgrading it to an ordinary accepted share.
                error!(
                    job_id = %submit.job_id,
                    hash = %hex::encode(digest),
                    "block-worthy share found but no round was open to submit it against"
                );
                return ShareOutcome::Accepted;
            };
            ShareOutcome::Block {
                header,
                job: job.clone(),
                extranonce2_hex: submit.extranonce2_hex.clone(),
                round_id: round.id,
            }
        } else {
            ShareOutcome::Accepted
        }
    }

    /// Builds a fresh job from the current template and emits it as a
    /// `mining.notify` line, or `None` if no template has been fetched yet.
    ///
    /// Leases from the (optional) DarwinX scorer pool first -- dropping any
    /// leased candidate still scoped to a stale template -- and only builds
    /// a fresh job itself when the scorer is disabled or has nothing usable
    /// queued (§4.5: the scorer is a prioritizer, never the sole source of
    /// jobs).
    pub fn push_current_template_as_job(&mut self, clean: bool) -> Option<Value> {
        let template = self.ctx.template_manager.current()?;

        let job = match self.lease_scored_job(template.job_seq) {
            Some((job, score)) => {
                let mut job = (*job).clone();
                job.score = Some(score);
                job
            }
            None => self
                .ctx
                .job_builder
                .build(JobBuilderParams {
                    template,
                    payout_script: &self.ctx.payout_script,
                    extranonce1_size: self.ctx.extranonce1_size,
                    extranonce2_size: self.ctx.extranonce2_size,
                })
                .ok()?,
        };

        let arc = self.ctx.active_jobs.insert(job);
        self.current_job = Some(arc.clone());

        Some(wire::notify(
            "mining.notify",
            wire::mining_notify_params(
                &arc.id,
                &arc.template.prev_hash_be,
                &arc.coinbase.coinb1,
                &arc.coinbase.coinb2,
                &arc.merkle_branch,
                arc.version,
                arc.nbits,
                arc.ntime,
                clean,
            ),
        ))
    }

    /// Pops scored candidates off the scorer pool until one matches the
    /// current template's `job_seq`, discarding any leftover from a
    /// template that has since rolled over.
    fn lease_scored_job(&self, current_job_seq: u64) -> Option<(Arc<Job>, JobScore)> {
        let scorer = self.ctx.scorer.as_ref()?;
        loop {
            let scored = scorer.lease_best()?;
            if scored.job.template.job_seq == current_job_seq {
                return Some((
                    scored.job,
                    JobScore {
                        score: scored.score,
                        hash_norm: scored.hash_norm,
                        entropy: scored.entropy,
                    },
                ));
            }
        }
    }
}

struct SubmitParams {
    #[allow(dead_code)]
    worker: String,
    job_id: String,
    extranonce2_hex: String,
    ntime: u32,
    nonce: u32,
}

fn parse_authorize_params(params: &[Value]) -> Option<(String, String)> {
    let username = params.first()?.as_str()?.to_string();
    let password = params.get(1).and_then(Value::as_str).unwrap_or("").to_string();
    if username.is_empty() {
        return None;
    }
    Some((username, password))
}

fn parse_submit_params(params: &[Value]) -> Option<SubmitParams> {
    Some(SubmitParams {
        worker: params.first()?.as_str()?.to_string(),
        job_id: params.get(1)?.as_str()?.to_string(),
        extranonce2_hex: params.get(2)?.as_str()?.to_string(),
        ntime: u32::from_str_radix(params.get(3)?.as_str()?, 16).ok()?,
        nonce: u32::from_str_radix(params.get(4)?.as_str()?, 16).ok()?,
    })
}

fn now_unix() -> u32 {
    crate::ledger::now_ts() as u32
}
