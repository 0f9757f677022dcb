//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pool-wide summary snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct PoolStats {
    pub miners_online: i64,
    pub shares_last_24h: i64,
    pub current_round_id: i64,
    pub network_difficulty: f64,
}

/// Per-miner summary, keyed by the `username` passed to `mining.authorize`.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct MinerSummary {
    pub username: String,
    pub total_accepted: i64,
    pub total_rejected: i64,
    pub balance_sats: i64,
}

/// A single entry from the (optional) DarwinX scorer's ranked pool.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct ScoredJobSummary {
    pub job_id: String,
    pub score: f64,
    pub hash_norm: f64,
    pub entropy: f64,
}
