//! JSON-RPC 1.0 client for the backing full node.
//!
//! HTTP Basic auth (`user:pass`) or a cookie file containing `user:pass` on
//! one line, per §6. Each call site sets its own timeout rather than sharing
//! one client-wide default, since `getblocktemplate` and `submitblock` have
//! different tolerances (§4.9).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

const TEMPLATE_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("malformed RPC response: {0}")]
    InvalidResponse(String),
    #[error("failed to read cookie file {0}: {1}")]
    CookieFile(PathBuf, std::io::Error),
}

#[derive(Debug, Clone)]
pub enum RpcAuth {
    UserPass { user: String, pass: String },
    CookieFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    auth: RpcAuth,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, auth: RpcAuth) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            auth,
        }
    }

    fn credentials(&self) -> Result<(String, String), RpcError> {
        match &self.auth {
            RpcAuth::UserPass { user, pass } => Ok((user.clone(), pass.clone())),
            RpcAuth::CookieFile(path) => read_cookie(path),
        }
    }

    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, RpcError> {
        let (user, pass) = self.credentials()?;
        let body = json!({
            "jsonrpc": "1.0",
            "id": "darwinx-pool",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .basic_auth(user, Some(pass))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        // bitcoind reports JSON-RPC-level errors (wrong params, rejected
        // block, node still in IBD, ...) as a non-2xx HTTP status carrying
        // the real error in the JSON body, so the body has to be parsed
        // before the status is checked — `error_for_status()` up front would
        // discard that body and surface a bare HTTP error instead of the
        // node's actual error code/message.
        let status = response.status();
        let bytes = response.bytes().await?;
        let parsed: Value = serde_json::from_slice(&bytes).map_err(|_| {
            RpcError::InvalidResponse(format!(
                "http {status}: {}",
                String::from_utf8_lossy(&bytes)
            ))
        })?;

        if let Some(error) = parsed.get("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(RpcError::Node { code, message });
        }

        if !status.is_success() {
            return Err(RpcError::InvalidResponse(format!("http {status} with no error field")));
        }

        parsed
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse("missing result field".into()))
    }

    pub async fn get_block_template(&self) -> Result<Value, RpcError> {
        self.call(
            "getblocktemplate",
            json!([{"rules": ["segwit"]}]),
            TEMPLATE_TIMEOUT,
        )
        .await
    }

    pub async fn submit_block(&self, block_hex: &str) -> Result<(), RpcError> {
        let result = self
            .call("submitblock", json!([block_hex]), SUBMIT_TIMEOUT)
            .await?;
        // A successful submission returns JSON null; a rejection reason
        // comes back as a string and should be treated as a node error.
        if let Some(reason) = result.as_str() {
            return Err(RpcError::Node {
                code: -1,
                message: reason.to_string(),
            });
        }
        Ok(())
    }

    pub async fn get_address_info(&self, address: &str) -> Result<Value, RpcError> {
        self.call("getaddressinfo", json!([address]), DEFAULT_TIMEOUT)
            .await
    }

    pub async fn get_block_header(&self, hash: &str, verbose: bool) -> Result<Value, RpcError> {
        self.call(
            "getblockheader",
            json!([hash, verbose]),
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Used only by the (external) payout collaborator; kept here because
    /// §4.9 lists it as an RPC client method. This crate never calls it.
    pub async fn send_many(
        &self,
        from_account: &str,
        amounts: &std::collections::HashMap<String, f64>,
    ) -> Result<Value, RpcError> {
        self.call(
            "sendmany",
            json!([from_account, amounts]),
            DEFAULT_TIMEOUT,
        )
        .await
    }
}

fn read_cookie(path: &Path) -> Result<(String, String), RpcError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| RpcError::CookieFile(path.to_path_buf(), e))?;
    let line = contents.trim();
    line.split_once(':')
        .map(|(u, p)| (u.to_string(), p.to_string()))
        .ok_or_else(|| RpcError::InvalidResponse(format!("malformed cookie file {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_parsing_splits_on_first_colon() {
        let dir = std::env::temp_dir().join("darwinx-pool-test-cookie");
        std::fs::write(&dir, "rpcuser:super:secret\n").unwrap();
        let (user, pass) = read_cookie(&dir).unwrap();
        assert_eq!(user, "rpcuser");
        assert_eq!(pass, "super:secret");
        let _ = std::fs::remove_file(&dir);
    }
}
