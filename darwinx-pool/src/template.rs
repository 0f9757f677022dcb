//! Template manager: polls `getblocktemplate`, caches within a TTL, and
//! surfaces round-boundary events on `prev_hash` change (§4.3).

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitcoin::ScriptBuf;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::codec::{difficulty_from_target, target_from_nbits};
use crate::rpc::{RpcClient, RpcError};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("rpc error fetching template: {0}")]
    Rpc(#[from] RpcError),
    #[error("malformed getblocktemplate response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct TemplateTx {
    pub data: Vec<u8>,
    /// Legacy txid, big-endian (display order), as the node reports it.
    pub txid_be: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct Template {
    pub height: u64,
    pub version: u32,
    pub prev_hash_be: [u8; 32],
    pub curtime: u32,
    pub nbits: u32,
    pub coinbase_value_sats: u64,
    pub default_witness_commitment: Option<ScriptBuf>,
    pub transactions: Vec<TemplateTx>,
    pub network_difficulty: f64,
    pub job_seq: u32,
}

/// Emitted when a refresh observes a new `prev_hash`; consumed by the
/// ledger to open (and annotate) rounds.
#[derive(Debug, Clone)]
pub struct RoundBoundary {
    pub prev_hash_be: [u8; 32],
    pub network_difficulty: f64,
    pub height: u64,
}

pub struct TemplateManager {
    rpc: RpcClient,
    gbt_interval: Duration,
    state: RwLock<Inner>,
}

struct Inner {
    template: Option<Arc<Template>>,
    last_fetch: Option<Instant>,
    job_seq: u32,
}

impl TemplateManager {
    pub fn new(rpc: RpcClient, gbt_interval: Duration) -> Self {
        Self {
            rpc,
            gbt_interval,
            state: RwLock::new(Inner {
                template: None,
                last_fetch: None,
                job_seq: 0,
            }),
        }
    }

    /// Current cached template, if any has ever been fetched.
    pub fn current(&self) -> Option<Arc<Template>> {
        self.state.read().template.clone()
    }

    /// Refresh if the TTL has elapsed; otherwise return the cached template.
    /// On RPC failure, the stale template (if any) is retained and returned
    /// — `TemplateUnavailable` is logged by the caller, not propagated as a
    /// hard error, per §7.
    pub async fn refresh(&self) -> Result<(Arc<Template>, Option<RoundBoundary>), TemplateError> {
        {
            let state = self.state.read();
            if let (Some(tmpl), Some(fetched)) = (&state.template, state.last_fetch) {
                if fetched.elapsed() < self.gbt_interval {
                    return Ok((tmpl.clone(), None));
                }
            }
        }

        match self.fetch_and_parse().await {
            Ok(template) => {
                let mut state = self.state.write();
                let boundary = match &state.template {
                    Some(prev) if prev.prev_hash_be == template.prev_hash_be => None,
                    _ => Some(RoundBoundary {
                        prev_hash_be: template.prev_hash_be,
                        network_difficulty: template.network_difficulty,
                        height: template.height,
                    }),
                };
                let arc = Arc::new(template);
                state.template = Some(arc.clone());
                state.last_fetch = Some(Instant::now());
                Ok((arc, boundary))
            }
            Err(err) => {
                let state = self.state.read();
                if let Some(tmpl) = &state.template {
                    Ok((tmpl.clone(), None))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn fetch_and_parse(&self) -> Result<Template, TemplateError> {
        let raw = self.rpc.get_block_template().await?;
        let job_seq = {
            let mut state = self.state.write();
            state.job_seq = state.job_seq.wrapping_add(1);
            state.job_seq
        };
        parse_template(&raw, job_seq)
    }

    /// Installs a template directly, bypassing RPC. Used by session/server
    /// tests that need `current()` to return something without a live node.
    #[cfg(any(test, feature = "test-util"))]
    pub fn seed_for_test(&self, template: Arc<Template>) {
        let mut state = self.state.write();
        state.template = Some(template);
        state.last_fetch = Some(Instant::now());
    }
}

fn parse_template(raw: &Value, job_seq: u32) -> Result<Template, TemplateError> {
    let err = |field: &str| TemplateError::Malformed(format!("missing or invalid field `{field}`"));

    let height = raw.get("height").and_then(Value::as_u64).ok_or(err("height"))?;
    let version = raw
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(err("version"))? as u32;
    let prev_hash_be = hex_field_32(raw, "previousblockhash").ok_or(err("previousblockhash"))?;
    let curtime = raw.get("curtime").and_then(Value::as_u64).ok_or(err("curtime"))? as u32;
    let bits_str = raw.get("bits").and_then(Value::as_str).ok_or(err("bits"))?;
    let nbits = u32::from_str_radix(bits_str, 16).map_err(|_| err("bits"))?;
    let coinbase_value_sats = raw
        .get("coinbasevalue")
        .and_then(Value::as_u64)
        .ok_or(err("coinbasevalue"))?;

    let default_witness_commitment = raw
        .get("default_witness_commitment")
        .and_then(Value::as_str)
        .map(|hex_str| hex::decode(hex_str).map(ScriptBuf::from_bytes))
        .transpose()
        .map_err(|_| err("default_witness_commitment"))?;

    let transactions = raw
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or(err("transactions"))?
        .iter()
        .map(parse_tx)
        .collect::<Result<Vec<_>, _>>()?;

    let network_difficulty = raw
        .get("difficulty")
        .and_then(Value::as_f64)
        .unwrap_or_else(|| difficulty_from_target(target_from_nbits(nbits)));

    Ok(Template {
        height,
        version,
        prev_hash_be,
        curtime,
        nbits,
        coinbase_value_sats,
        default_witness_commitment,
        transactions,
        network_difficulty,
        job_seq,
    })
}

fn parse_tx(raw: &Value) -> Result<TemplateTx, TemplateError> {
    let data_hex = raw
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| TemplateError::Malformed("transaction missing `data`".into()))?;
    let data = hex::decode(data_hex)
        .map_err(|_| TemplateError::Malformed("transaction `data` is not valid hex".into()))?;
    let txid_be = hex_field_32(raw, "txid")
        .ok_or_else(|| TemplateError::Malformed("transaction missing `txid`".into()))?;
    Ok(TemplateTx { data, txid_be })
}

fn hex_field_32(raw: &Value, field: &str) -> Option<[u8; 32]> {
    let hex_str = raw.get(field)?.as_str()?;
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_template() {
        let raw = serde_json::json!({
            "height": 210000,
            "version": 536870912,
            "previousblockhash": "00".repeat(32),
            "curtime": 1_700_000_000u64,
            "bits": "1d00ffff",
            "coinbasevalue": 5_000_000_000u64,
            "transactions": [],
        });

        let parsed = parse_template(&raw, 1).unwrap();
        assert_eq!(parsed.height, 210000);
        assert_eq!(parsed.nbits, 0x1d00ffff);
        assert!((parsed.network_difficulty - 1.0).abs() < 1e-6);
        assert!(parsed.transactions.is_empty());
    }

    #[test]
    fn rejects_missing_fields() {
        let raw = serde_json::json!({"height": 1});
        assert!(parse_template(&raw, 1).is_err());
    }
}
