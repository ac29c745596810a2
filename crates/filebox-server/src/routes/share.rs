use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_file_id;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::share::{Access, SharedFile};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ShareParams {
    id: Option<String>,
}

/// `POST /share?id=` grants a public link for one share window
pub async fn share(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ShareParams>,
) -> Result<Json<Value>, AppError> {
    let file_id = parse_file_id(params.id.as_deref())?;
    let link = state.files.share(user.owner_id, file_id).await?;
    Ok(Json(json!({ "link": link })))
}

/// Public access to a shared file. No authentication.
pub async fn access(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SharedFile>, AppError> {
    let file_id = parse_file_id(Some(&id))?;
    match state.files.access_shared(file_id).await? {
        Access::Granted(record) => Ok(Json(SharedFile::from(record))),
        Access::Denied(reason) => Err(reason.into()),
    }
}

pub async fn unshare(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let file_id = parse_file_id(Some(&id))?;
    state.files.unshare(user.owner_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
