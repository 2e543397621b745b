//! Health and cache administration handlers.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, trace};
use ts_rs::TS;

use crate::cache::{CacheStats, TtlClass};
use crate::filters::Namespace;
use crate::state::AppState;
use crate::web::error::ApiError;
use crate::web::middleware::admin::AdminToken;

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TtlEntry {
    class: TtlClass,
    seconds: u64,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    stats: CacheStats,
    #[ts(optional)]
    max_entries: Option<usize>,
    ttls: Vec<TtlEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub namespace: Option<String>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct ClearResponse {
    removed: usize,
}

/// Health check endpoint
pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT_SHORT"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/cache/stats`
pub(super) async fn cache_stats(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Json<CacheStatsResponse> {
    let policy = state.cache.policy();
    Json(CacheStatsResponse {
        stats: state.cache.stats(),
        max_entries: state.cache.max_entries(),
        ttls: policy
            .entries()
            .map(|(class, ttl)| TtlEntry {
                class,
                seconds: ttl.as_secs(),
            })
            .collect(),
    })
}

/// `DELETE /api/cache` or `DELETE /api/cache?namespace=trend-data`
pub(super) async fn clear_cache(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<ClearResponse>, ApiError> {
    let removed = match params.namespace.as_deref() {
        Some(label) => {
            let namespace: Namespace = label
                .parse()
                .map_err(|e: crate::filters::UnknownNamespace| ApiError::bad_request(e.to_string()))?;
            state.cache.invalidate_namespace(namespace.label())
        }
        None => {
            let removed = state.cache.len();
            state.cache.clear();
            removed
        }
    };
    info!(namespace = ?params.namespace, removed, "cache invalidated");
    Ok(Json(ClearResponse { removed }))
}
