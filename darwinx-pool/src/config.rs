//! Configuration loading for the pool daemon.
//!
//! Loaded from TOML via `serde` + the `toml` crate. Section names follow
//! spec.md §6 verbatim: `[network]`, `[difficulty]`, `[template]`,
//! `[payout]`, `[rpc]`, plus `[ledger]` (sqlite path) and `[logging]`
//! (mostly a passthrough — `RUST_LOG` still wins if set).

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

const CONFIG_ENV_VAR: &str = "DARWINX_POOL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "darwinx-pool.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub difficulty: DifficultyConfig,
    pub template: TemplateConfig,
    pub payout: PayoutConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub stratum_host: String,
    pub stratum_port: u16,
    #[serde(default = "default_extranonce1_size")]
    pub extranonce1_size: u8,
    #[serde(default = "default_extranonce2_size")]
    pub extranonce2_size: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DifficultyConfig {
    pub diff_min: f64,
    pub diff_max: f64,
    pub initial_difficulty: f64,
    pub vardiff_target_shares_per_min: f64,
    #[serde(default = "default_adjust_every_seconds")]
    pub adjust_every_seconds: u64,
    #[serde(default = "default_adjust_ratio")]
    pub adjust_ratio: f64,
    #[serde(default = "default_max_shares_per_sec")]
    pub max_shares_per_sec: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_gbt_interval_seconds")]
    pub gbt_interval_seconds: u64,
    #[serde(default = "default_ntime_drift_seconds")]
    pub ntime_drift_seconds: u32,
    #[serde(default = "default_active_jobs_capacity")]
    pub active_jobs_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutConfig {
    pub payout_address: String,
    #[serde(default)]
    pub pool_fee_bp: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub rpc_user: Option<String>,
    pub rpc_pass: Option<String>,
    pub rpc_cookie_path: Option<PathBuf>,
    pub rpc_wallet: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub database_path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { database_path: default_ledger_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub systemd: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { systemd: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { listen: default_api_listen() }
    }
}

/// The DarwinX scorer pool filler (§4.5): fully optional, off by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scorer_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_scorer_weight_hash")]
    pub weight_hash: f64,
    #[serde(default = "default_scorer_weight_entropy")]
    pub weight_entropy: f64,
    #[serde(default = "default_scorer_ntime_drift_seconds")]
    pub ntime_drift_seconds: u32,
    #[serde(default = "default_scorer_fill_interval_seconds")]
    pub fill_interval_seconds: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pool_size: default_scorer_pool_size(),
            weight_hash: default_scorer_weight_hash(),
            weight_entropy: default_scorer_weight_entropy(),
            ntime_drift_seconds: default_scorer_ntime_drift_seconds(),
            fill_interval_seconds: default_scorer_fill_interval_seconds(),
        }
    }
}

fn default_scorer_pool_size() -> usize {
    64
}
fn default_scorer_weight_hash() -> f64 {
    0.5
}
fn default_scorer_weight_entropy() -> f64 {
    0.5
}
fn default_scorer_ntime_drift_seconds() -> u32 {
    600
}
fn default_scorer_fill_interval_seconds() -> u64 {
    5
}

fn default_extranonce1_size() -> u8 {
    4
}
fn default_extranonce2_size() -> u8 {
    4
}
fn default_gbt_interval_seconds() -> u64 {
    8
}
fn default_ntime_drift_seconds() -> u32 {
    7200
}
fn default_active_jobs_capacity() -> usize {
    128
}
fn default_adjust_every_seconds() -> u64 {
    60
}
fn default_adjust_ratio() -> f64 {
    2.0
}
fn default_max_shares_per_sec() -> f64 {
    20.0
}
fn default_ledger_path() -> String {
    "darwinx-pool.sqlite".to_string()
}
fn default_api_listen() -> String {
    "127.0.0.1:7785".to_string()
}

impl Config {
    /// Checks `DARWINX_POOL_CONFIG`, falling back to `./darwinx-pool.toml`.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let toml_str = r#"
            [network]
            stratum_host = "0.0.0.0"
            stratum_port = 3333

            [difficulty]
            diff_min = 1.0
            diff_max = 1000000.0
            initial_difficulty = 1024.0
            vardiff_target_shares_per_min = 20.0

            [template]

            [payout]
            payout_address = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"

            [rpc]
            rpc_host = "127.0.0.1"
            rpc_port = 8332
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.extranonce1_size, 4);
        assert_eq!(config.template.gbt_interval_seconds, 8);
        assert_eq!(config.ledger.database_path, "darwinx-pool.sqlite");
        assert!(!config.scorer.enabled);
        assert_eq!(config.scorer.pool_size, 64);
    }

    #[test]
    fn load_from_missing_file_errors() {
        let err = Config::load_from(Path::new("/nonexistent/darwinx-pool.toml"));
        assert!(err.is_err());
    }
}
