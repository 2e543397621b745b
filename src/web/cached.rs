//! Shared plumbing for handlers that serve memoized computations.

use crate::cache::TtlClass;
use crate::filters::{DashboardFilters, Namespace};
use crate::state::AppState;
use crate::web::error::ApiError;
use crate::web::routes::{cache_control, with_cache_control};
use axum::http::HeaderValue;
use axum::response::Response;
use serde_json::Value;
use std::future::Future;

/// Response header reporting `HIT`, `MISS` or `COALESCED`.
pub const X_CACHE: &str = "x-cache";

/// Serve `producer`'s result for `namespace` + `filters` through the cache.
///
/// Applies the configured wait deadline and the namespace's TTL class.
pub async fn respond_cached<F, Fut>(
    state: &AppState,
    namespace: Namespace,
    filters: &DashboardFilters,
    producer: F,
) -> Result<Response, ApiError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    let key = filters.cache_key(namespace)?;
    let ttl_class = namespace.ttl_class();
    let fetched = state
        .cache
        .fetch(key, ttl_class, state.wait_timeout, producer)
        .await?;

    let mut response = with_cache_control(fetched.value.as_ref(), header_for(ttl_class));
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(fetched.source.as_str()));
    Ok(response)
}

/// Browser caching never outlives the server-side TTL of the class.
fn header_for(ttl_class: TtlClass) -> &'static str {
    match ttl_class {
        TtlClass::Metrics => cache_control::METRICS,
        TtlClass::OneHour => cache_control::HOURLY,
        TtlClass::Long | TtlClass::Static | TtlClass::VeryStatic => cache_control::REFERENCE,
    }
}
