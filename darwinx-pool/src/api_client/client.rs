//! HTTP client for the pool's read-only stats API.

use super::types::{MinerSummary, PoolStats};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7785";

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn get_stats(&self) -> anyhow::Result<PoolStats> {
        let url = format!("{}/api/stats", self.base_url);
        let stats = self.http.get(url).send().await?.error_for_status()?.json().await?;
        Ok(stats)
    }

    pub async fn get_miner(&self, username: &str) -> anyhow::Result<MinerSummary> {
        // Push as a path segment rather than formatting it into the URL
        // string directly, so a username containing `/`, `?`, `#`, or other
        // URL-meaningful characters gets percent-encoded instead of
        // corrupting the request path.
        let mut url = reqwest::Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("base url cannot be a base"))?
            .push("api")
            .push("miners")
            .push(username);
        let summary = self.http.get(url).send().await?.error_for_status()?.json().await?;
        Ok(summary)
    }
}
