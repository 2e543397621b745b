//! Analytics endpoints, one per [`Namespace`].

use axum::extract::{Path, State};
use axum::response::Response;
use std::sync::Arc;

use crate::filters::{DashboardFilters, Namespace};
use crate::state::AppState;
use crate::web::cached::respond_cached;
use crate::web::error::ApiError;
use crate::web::query::DashboardQuery;

/// `GET /api/analytics/{endpoint}?platform=..&brand=..&startDate=..`
pub(super) async fn get_analytics(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    axum_extra::extract::Query(query): axum_extra::extract::Query<DashboardQuery>,
) -> Result<Response, ApiError> {
    let namespace: Namespace = endpoint
        .parse()
        .map_err(|e: crate::filters::UnknownNamespace| ApiError::not_found(e.to_string()))?;
    let filters = DashboardFilters::try_from(query)?;

    let source = Arc::clone(&state.source);
    let producer_filters = filters.clone();
    respond_cached(&state, namespace, &filters, move || async move {
        source.fetch(namespace, &producer_filters).await
    })
    .await
}
