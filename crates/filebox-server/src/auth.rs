use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's owner id, set by the authenticating gateway
pub const OWNER_HEADER: &str = "x-owner-id";

/// Caller identity resolved upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub owner_id: i64,
}

/// Axum extractor that requires a valid [`OWNER_HEADER`] and returns an [`AuthUser`].
///
/// ```ignore
/// async fn my_handler(user: AuthUser, ...) -> Result<..., AppError> { ... }
/// ```
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        owner_from_parts(parts).ok_or(AppError::Unauthorized)
    }
}

fn owner_from_parts(parts: &Parts) -> Option<AuthUser> {
    let owner_id = parts
        .headers
        .get(OWNER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|&id| id > 0)?;
    Some(AuthUser { owner_id })
}
