//! JSON error responses for the web API.

use crate::cache::{CacheError, KeyEncodingError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ApiErrorCode {
    BadRequest,
    InvalidFilters,
    Unauthorized,
    Forbidden,
    NotFound,
    ComputeFailed,
    Timeout,
}

impl ApiErrorCode {
    pub const fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest | ApiErrorCode::InvalidFilters => StatusCode::BAD_REQUEST,
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::ComputeFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl From<KeyEncodingError> for ApiError {
    fn from(err: KeyEncodingError) -> Self {
        ApiError::new(ApiErrorCode::InvalidFilters, err.to_string())
    }
}

impl From<CacheError<anyhow::Error>> for ApiError {
    fn from(err: CacheError<anyhow::Error>) -> Self {
        match err {
            CacheError::Key(err) => err.into(),
            CacheError::Producer(err) => {
                // Upstream details stay in the logs, not in the response body.
                error!(error = ?err, "analytics computation failed");
                ApiError::new(ApiErrorCode::ComputeFailed, "Failed to compute analytics")
            }
            CacheError::Timeout { key, waited } => ApiError::new(
                ApiErrorCode::Timeout,
                format!(
                    "Timed out after {} waiting for {}",
                    crate::utils::fmt_duration(waited),
                    key.namespace()
                ),
            ),
        }
    }
}
