//! Stratum v1 wire envelope: newline-delimited JSON-RPC, numeric `id`,
//! `id: null` for notifications (§6).

use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct Request {
    pub id: Option<Value>,
    pub method: String,
    pub params: Vec<Value>,
}

/// Parse one line of input. Returns `None` on anything that isn't a valid
/// Stratum request object — malformed lines are dropped silently (§7's
/// `MalformedLine` policy), not surfaced as an error.
pub fn parse_request(line: &str) -> Option<Request> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let method = value.get("method")?.as_str()?.to_string();
    let params = value
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let id = value.get("id").cloned();
    Some(Request { id, method, params })
}

pub fn ok_response(id: Option<Value>, result: Value) -> Value {
    json!({"id": id, "result": result, "error": Value::Null})
}

/// `result:false` plus a `[code, message, null]` error triple (§7 — used
/// for `StaleJob` and `Unauthorized`, the only rejections that carry a code).
pub fn err_response(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({"id": id, "result": false, "error": [code, message, Value::Null]})
}

/// Bare `result:false` with no error payload, for rejections §7 specifies
/// as "reply false" without a code (`DuplicateShare`, `BadNtime`, `LowDifficulty`).
pub fn false_response(id: Option<Value>) -> Value {
    json!({"id": id, "result": false, "error": Value::Null})
}

/// `{result: null, error: null}` for unrecognized methods (§4.6, §7).
pub fn unknown_method_response(id: Option<Value>) -> Value {
    json!({"id": id, "result": Value::Null, "error": Value::Null})
}

pub fn notify(method: &str, params: Value) -> Value {
    json!({"id": Value::Null, "method": method, "params": params})
}

/// `mining.notify` params: `[job_id, prev_hash_be_hex, coinb1_hex,
/// coinb2_hex, merkle_branch_be_hex[], version_hex, nbits_hex, ntime_hex,
/// clean_bool]`.
pub fn mining_notify_params(
    job_id: &str,
    prev_hash_be: &[u8; 32],
    coinb1: &[u8],
    coinb2: &[u8],
    merkle_branch_internal: &[[u8; 32]],
    version: u32,
    nbits: u32,
    ntime: u32,
    clean: bool,
) -> Value {
    let branch_be_hex: Vec<String> = merkle_branch_internal
        .iter()
        .map(|sibling| {
            let mut be = *sibling;
            be.reverse();
            hex::encode(be)
        })
        .collect();

    json!([
        job_id,
        hex::encode(prev_hash_be),
        hex::encode(coinb1),
        hex::encode(coinb2),
        branch_be_hex,
        format!("{:08x}", version),
        format!("{:08x}", nbits),
        format!("{:08x}", ntime),
        clean,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_request() {
        let line = r#"{"id":1,"method":"mining.subscribe","params":[]}"#;
        let req = parse_request(line).unwrap();
        assert_eq!(req.method, "mining.subscribe");
        assert_eq!(req.id, Some(json!(1)));
    }

    #[test]
    fn drops_malformed_json() {
        assert!(parse_request("{not json").is_none());
        assert!(parse_request("").is_none());
        assert!(parse_request(r#"{"no_method": true}"#).is_none());
    }

    #[test]
    fn unknown_method_response_has_null_result_and_error() {
        let resp = unknown_method_response(Some(json!(5)));
        assert_eq!(resp["result"], Value::Null);
        assert_eq!(resp["error"], Value::Null);
    }
}
