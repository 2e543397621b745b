//! Producers behind the cache: where analytics results actually come from.

use crate::filters::{DashboardFilters, Namespace};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Computes the uncached result for one endpoint and filter set.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn fetch(&self, namespace: Namespace, filters: &DashboardFilters) -> anyhow::Result<Value>;
}

/// Forwards queries to the analytics query service over HTTP.
///
/// `GET {base_url}/{namespace}?{filters}` must answer with a JSON body.
#[derive(Debug, Clone)]
pub struct UpstreamSource {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("querycache/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url_for(&self, namespace: Namespace) -> String {
        format!("{}/{}", self.base_url, namespace.label())
    }
}

#[async_trait]
impl AnalyticsSource for UpstreamSource {
    async fn fetch(&self, namespace: Namespace, filters: &DashboardFilters) -> anyhow::Result<Value> {
        let url = self.url_for(namespace);
        debug!(url = %url, "querying analytics upstream");

        let response = self
            .client
            .get(&url)
            .query(&filters.query_pairs())
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upstream {url} returned {status}: {}", truncate(&body, 200));
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("Upstream {url} returned invalid JSON"))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
