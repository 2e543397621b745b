//! Web API router construction and shared response utilities.

use axum::{
    Router,
    http::HeaderValue,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{analytics, status};

/// Cache-Control presets for analytics responses.
///
/// `max-age` never exceeds the server-side TTL of the matching class, so a
/// browser never holds a result the server would already have recomputed.
pub mod cache_control {
    /// Metrics endpoints (5 minute server TTL).
    pub const METRICS: &str = "private, max-age=60, stale-while-revalidate=60";
    /// Hourly aggregates.
    pub const HOURLY: &str = "private, max-age=300, stale-while-revalidate=300";
    /// Brand, category and platform lists.
    pub const REFERENCE: &str = "private, max-age=3600, stale-while-revalidate=600";
    /// Cache administration, never cached.
    pub const ADMIN: &str = "private, no-store, must-revalidate";
}

/// Wraps a JSON response with a `Cache-Control` header.
pub fn with_cache_control<T: serde::Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/analytics/{endpoint}", get(analytics::get_analytics))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/cache/stats", get(status::cache_stats))
        .route("/cache", axum::routing::delete(status::clear_cache))
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut().insert(
                    axum::http::header::CACHE_CONTROL,
                    HeaderValue::from_static(cache_control::ADMIN),
                );
                resp
            },
        ))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .nest("/api", admin_router)
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
}
