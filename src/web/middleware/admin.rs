//! Bearer-token guard for cache administration.
//!
//! Use as an Axum extractor in admin handlers:
//!
//! ```ignore
//! async fn handler(_admin: AdminToken, ...) -> impl IntoResponse { ... }
//! ```

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::warn;

use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode};

/// Proof that the request carried the configured admin token.
pub struct AdminToken;

impl FromRequestParts<AppState> for AdminToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::new(
                ApiErrorCode::Forbidden,
                "Cache administration is disabled",
            ));
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if tokens_match(token, expected) => Ok(AdminToken),
            Some(_) => {
                warn!(path = %parts.uri.path(), "rejected admin request with wrong token");
                Err(ApiError::new(ApiErrorCode::Unauthorized, "Invalid admin token"))
            }
            None => Err(ApiError::new(ApiErrorCode::Unauthorized, "Missing admin token")),
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
