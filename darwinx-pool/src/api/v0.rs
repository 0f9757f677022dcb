//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the pool's stats surface stabilizes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{MinerSummary, PoolStats, ScoredJobSummary};
use crate::ledger::now_ts as now_unix;

const DAY_SECS: i64 = 24 * 60 * 60;
const SCORER_TOP_N: usize = 10;

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_stats))
        .routes(routes!(get_miner))
        .routes(routes!(get_scorer_top))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Pool-wide summary: miners online, shares in the last 24h, current round.
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "stats",
    responses(
        (status = OK, description = "Pool summary", body = PoolStats),
        (status = INTERNAL_SERVER_ERROR, description = "Ledger query failed"),
    ),
)]
async fn get_stats(State(state): State<SharedState>) -> Result<Json<PoolStats>, StatusCode> {
    let now = now_unix();
    let miners_online = state
        .ledger
        .miners_online_since(now - DAY_SECS)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let shares_last_24h = state
        .ledger
        .shares_since(now - DAY_SECS)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let round = state
        .ledger
        .open_round()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(PoolStats {
        miners_online,
        shares_last_24h,
        current_round_id: round.id,
        network_difficulty: round.network_difficulty,
    }))
}

/// Return a single miner's share/payout summary, or 404 if never seen.
#[utoipa::path(
    get,
    path = "/api/miners/{username}",
    tag = "miners",
    params(
        ("username" = String, Path, description = "Worker username from mining.authorize"),
    ),
    responses(
        (status = OK, description = "Miner summary", body = MinerSummary),
        (status = NOT_FOUND, description = "Miner not found"),
    ),
)]
async fn get_miner(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> Result<Json<MinerSummary>, StatusCode> {
    let summary = state
        .ledger
        .miner_summary(&username)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(MinerSummary {
        username,
        total_accepted: summary.0,
        total_rejected: summary.1,
        balance_sats: summary.2,
    }))
}

/// Top-N currently ranked scorer candidates, mirroring the original
/// engine's `top_list` snapshot. Empty when the scorer is disabled.
#[utoipa::path(
    get,
    path = "/api/scorer/top",
    tag = "scorer",
    responses(
        (status = OK, description = "Top scored candidate jobs", body = [ScoredJobSummary]),
    ),
)]
async fn get_scorer_top(State(state): State<SharedState>) -> Json<Vec<ScoredJobSummary>> {
    let Some(scorer) = &state.scorer else {
        return Json(Vec::new());
    };

    Json(
        scorer
            .top(SCORER_TOP_N)
            .into_iter()
            .map(|scored| ScoredJobSummary {
                job_id: scored.job.id.clone(),
                score: scored.score,
                hash_norm: scored.hash_norm,
                entropy: scored.entropy,
            })
            .collect(),
    )
}
