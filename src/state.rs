//! Application state shared across handlers.

use crate::cache::ComputeCache;
use crate::source::AnalyticsSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct AppState {
    pub cache: ComputeCache,
    pub source: Arc<dyn AnalyticsSource>,
    /// Per-request cap on waiting for a computation; `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    pub started_at: Instant,
    /// Bearer token guarding the cache admin endpoints; `None` disables them.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(cache: ComputeCache, source: Arc<dyn AnalyticsSource>) -> Self {
        Self {
            cache,
            source,
            wait_timeout: None,
            started_at: Instant::now(),
            admin_token: None,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_admin_token(mut self, token: Option<&str>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }
}
