#![allow(dead_code)]

use async_trait::async_trait;
use querycache::cache::{ComputeCache, TtlPolicy};
use querycache::filters::{DashboardFilters, Namespace};
use querycache::source::AnalyticsSource;
use querycache::state::AppState;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Analytics source that echoes its input and counts invocations.
#[derive(Debug, Default)]
pub struct StubSource {
    calls: AtomicUsize,
    fail: bool,
    hang: bool,
}

pub const ADMIN_TOKEN: &str = "test-admin-token";

impl StubSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Never answers.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsSource for StubSource {
    async fn fetch(&self, namespace: Namespace, filters: &DashboardFilters) -> anyhow::Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            anyhow::bail!("connection to analytics database refused");
        }
        Ok(json!({
            "endpoint": namespace.label(),
            "filters": filters,
            "call": call,
        }))
    }
}

pub fn app_state(source: Arc<StubSource>) -> AppState {
    AppState::new(ComputeCache::new(TtlPolicy::default()), source).with_admin_token(Some(ADMIN_TOKEN))
}
