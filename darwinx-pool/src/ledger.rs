//! Share/round ledger (§4.8): miners, shares, rounds, blocks, with the
//! single-open-round invariant enforced on every write path that touches
//! round status.
//!
//! Schema matches §6 with one addition: `rounds.prev_hash` /
//! `network_difficulty` are kept live via `on_new_template` rather than set
//! once at round creation (SPEC_FULL supplement #2).

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, query, query_as};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct Ledger {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoundRow {
    pub id: i64,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
    pub prev_hash: Option<String>,
    pub network_difficulty: f64,
    pub status: String,
    pub block_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoundShareTotal {
    pub username: String,
    pub difficulty_sum: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockRow {
    pub id: i64,
    pub height: i64,
    pub hash: String,
    pub found_ts: i64,
    pub status: String,
    pub template_prev_hash: String,
    pub reward_sats: i64,
}

impl Ledger {
    pub async fn open(database_path: &str) -> Result<Self, LedgerError> {
        let url = if database_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{database_path}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        let ledger = Self { pool };
        ledger.bootstrap_schema().await?;
        Ok(ledger)
    }

    async fn bootstrap_schema(&self) -> Result<(), LedgerError> {
        query(
            "CREATE TABLE IF NOT EXISTS miners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                address TEXT NOT NULL,
                first_seen_ts INTEGER NOT NULL,
                last_seen_ts INTEGER NOT NULL,
                difficulty REAL NOT NULL DEFAULT 0,
                total_accepted INTEGER NOT NULL DEFAULT 0,
                total_rejected INTEGER NOT NULL DEFAULT 0,
                balance_sats INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE TABLE IF NOT EXISTS rounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_ts INTEGER NOT NULL,
                end_ts INTEGER,
                prev_hash TEXT,
                network_difficulty REAL NOT NULL DEFAULT 1.0,
                status TEXT NOT NULL DEFAULT 'open',
                block_hash TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        query(
            "CREATE TABLE IF NOT EXISTS shares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                miner_id INTEGER NOT NULL REFERENCES miners(id),
                round_id INTEGER NOT NULL REFERENCES rounds(id),
                received_ts INTEGER NOT NULL,
                difficulty REAL NOT NULL,
                valid INTEGER NOT NULL,
                pow_hash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        query("CREATE INDEX IF NOT EXISTS idx_shares_round ON shares(round_id)")
            .execute(&self.pool)
            .await?;

        query(
            "CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                height INTEGER NOT NULL,
                hash TEXT UNIQUE NOT NULL,
                found_ts INTEGER NOT NULL,
                status TEXT NOT NULL,
                template_prev_hash TEXT NOT NULL,
                reward_sats INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The single currently-open round, creating one (first-ever boot) if
    /// none exists yet — mirrors `get_open_round_id()`.
    pub async fn open_round(&self) -> Result<RoundRow, LedgerError> {
        if let Some(row) = query_as::<_, RoundRow>(
            "SELECT id, start_ts, end_ts, prev_hash, network_difficulty, status, block_hash
             FROM rounds WHERE status = 'open' ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row);
        }

        let now = now_ts();
        let id = query("INSERT INTO rounds (start_ts, status) VALUES (?, 'open')")
            .bind(now)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(RoundRow {
            id,
            start_ts: now,
            end_ts: None,
            prev_hash: None,
            network_difficulty: 1.0,
            status: "open".into(),
            block_hash: None,
        })
    }

    /// Called on every template refresh. If the open round has no recorded
    /// `prev_hash` yet (bootstrap) or matches the new one, just refreshes
    /// `network_difficulty` in place. If it genuinely differs — a block
    /// boundary was crossed without this pool's submitter closing the round
    /// — the stale round is marked `found` (block_hash left null, since we
    /// didn't produce it) and a fresh round is opened. See DESIGN.md.
    pub async fn on_new_template(&self, prev_hash_be_hex: &str, network_difficulty: f64) -> Result<(), LedgerError> {
        let current = self.open_round().await?;

        match &current.prev_hash {
            None => {
                query("UPDATE rounds SET prev_hash = ?, network_difficulty = ? WHERE id = ?")
                    .bind(prev_hash_be_hex)
                    .bind(network_difficulty)
                    .bind(current.id)
                    .execute(&self.pool)
                    .await?;
            }
            Some(existing) if existing == prev_hash_be_hex => {
                query("UPDATE rounds SET network_difficulty = ? WHERE id = ?")
                    .bind(network_difficulty)
                    .bind(current.id)
                    .execute(&self.pool)
                    .await?;
            }
            Some(_) => {
                query("UPDATE rounds SET status = 'found', end_ts = ? WHERE id = ?")
                    .bind(now_ts())
                    .bind(current.id)
                    .execute(&self.pool)
                    .await?;
                query(
                    "INSERT INTO rounds (start_ts, prev_hash, network_difficulty, status) VALUES (?, ?, ?, 'open')",
                )
                .bind(now_ts())
                .bind(prev_hash_be_hex)
                .bind(network_difficulty)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    pub async fn upsert_miner(&self, username: &str, address: &str) -> Result<i64, LedgerError> {
        let now = now_ts();
        query(
            "INSERT INTO miners (username, address, first_seen_ts, last_seen_ts)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET last_seen_ts = excluded.last_seen_ts",
        )
        .bind(username)
        .bind(address)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = query("SELECT id FROM miners WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("id")?)
    }

    pub async fn record_share(
        &self,
        miner_id: i64,
        round_id: i64,
        difficulty: f64,
        valid: bool,
        pow_hash_hex: &str,
    ) -> Result<(), LedgerError> {
        query(
            "INSERT INTO shares (miner_id, round_id, received_ts, difficulty, valid, pow_hash)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(miner_id)
        .bind(round_id)
        .bind(now_ts())
        .bind(difficulty)
        .bind(valid)
        .bind(pow_hash_hex)
        .execute(&self.pool)
        .await?;

        let column = if valid { "total_accepted" } else { "total_rejected" };
        query(&format!("UPDATE miners SET {column} = {column} + 1 WHERE id = ?"))
            .bind(miner_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a block candidate and transitions the open round to `found`.
    pub async fn record_block_candidate(
        &self,
        round_id: i64,
        height: i64,
        hash_be_hex: &str,
        template_prev_hash_be_hex: &str,
        status: &str,
        reward_sats: i64,
    ) -> Result<(), LedgerError> {
        query(
            "INSERT INTO blocks (height, hash, found_ts, status, template_prev_hash, reward_sats)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(height)
        .bind(hash_be_hex)
        .bind(now_ts())
        .bind(status)
        .bind(template_prev_hash_be_hex)
        .bind(reward_sats)
        .execute(&self.pool)
        .await?;

        query("UPDATE rounds SET status = 'found', end_ts = ?, block_hash = ? WHERE id = ?")
            .bind(now_ts())
            .bind(hash_be_hex)
            .bind(round_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // --- Queries for the (external) payout collaborator, §4.8 / SPEC_FULL #6 ---

    pub async fn matured_rounds(&self) -> Result<Vec<RoundRow>, LedgerError> {
        Ok(query_as::<_, RoundRow>(
            "SELECT id, start_ts, end_ts, prev_hash, network_difficulty, status, block_hash
             FROM rounds WHERE status = 'matured'",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn collect_round_shares(&self, round_id: i64) -> Result<Vec<RoundShareTotal>, LedgerError> {
        let rows = query(
            "SELECT m.username AS username, SUM(s.difficulty) AS difficulty_sum
             FROM shares s JOIN miners m ON m.id = s.miner_id
             WHERE s.round_id = ? AND s.valid = 1
             GROUP BY m.username",
        )
        .bind(round_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RoundShareTotal {
                username: row.get("username"),
                difficulty_sum: row.get("difficulty_sum"),
            })
            .collect())
    }

    pub async fn pending_blocks(&self) -> Result<Vec<BlockRow>, LedgerError> {
        Ok(
            query_as::<_, BlockRow>("SELECT * FROM blocks WHERE status = 'submitted'")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // --- Stats API queries ---

    pub async fn miners_online_since(&self, since_ts: i64) -> Result<i64, LedgerError> {
        let row = query("SELECT COUNT(*) AS n FROM miners WHERE last_seen_ts >= ?")
            .bind(since_ts)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn shares_since(&self, since_ts: i64) -> Result<i64, LedgerError> {
        let row = query("SELECT COUNT(*) AS n FROM shares WHERE received_ts >= ?")
            .bind(since_ts)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn miner_summary(&self, username: &str) -> Result<Option<(i64, i64, i64)>, LedgerError> {
        let row = query("SELECT total_accepted, total_rejected, balance_sats FROM miners WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get("total_accepted"), r.get("total_rejected"), r.get("balance_sats"))))
    }
}

/// Seconds since the Unix epoch, shared by the ledger, session engine, and
/// stats API so clock-error handling only needs to live in one place.
pub fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_ledger() -> Ledger {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let ledger = Ledger { pool };
        ledger.bootstrap_schema().await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn open_round_bootstraps_exactly_one_row() {
        let ledger = memory_ledger().await;
        let a = ledger.open_round().await.unwrap();
        let b = ledger.open_round().await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn new_template_with_same_prev_hash_does_not_open_new_round() {
        let ledger = memory_ledger().await;
        ledger.on_new_template("aa", 1.0).await.unwrap();
        let first = ledger.open_round().await.unwrap();
        ledger.on_new_template("aa", 1.5).await.unwrap();
        let second = ledger.open_round().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.network_difficulty, 1.5);
    }

    #[tokio::test]
    async fn prev_hash_change_closes_old_round_and_opens_one_new_round() {
        let ledger = memory_ledger().await;
        ledger.on_new_template("aa", 1.0).await.unwrap();
        let first = ledger.open_round().await.unwrap();

        ledger.on_new_template("bb", 1.0).await.unwrap();
        let second = ledger.open_round().await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.prev_hash.as_deref(), Some("bb"));

        let row = query_as::<_, RoundRow>("SELECT * FROM rounds WHERE id = ?")
            .bind(first.id)
            .fetch_one(&ledger.pool)
            .await
            .unwrap();
        assert_eq!(row.status, "found");
    }

    #[tokio::test]
    async fn upsert_miner_is_idempotent_by_username() {
        let ledger = memory_ledger().await;
        let a = ledger.upsert_miner("bc1q...worker1", "bc1q...").await.unwrap();
        let b = ledger.upsert_miner("bc1q...worker1", "bc1q...").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn record_share_updates_miner_counters() {
        let ledger = memory_ledger().await;
        let miner_id = ledger.upsert_miner("worker1", "addr").await.unwrap();
        let round = ledger.open_round().await.unwrap();

        ledger.record_share(miner_id, round.id, 1024.0, true, "00".repeat(32).as_str()).await.unwrap();
        ledger.record_share(miner_id, round.id, 1024.0, false, "11".repeat(32).as_str()).await.unwrap();

        let summary = ledger.miner_summary("worker1").await.unwrap().unwrap();
        assert_eq!(summary.0, 1);
        assert_eq!(summary.1, 1);
    }
}
