use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use filebox_db::{FileRecord, FileSearch};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_file_id;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::service::UploadedFile;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UploadParams {
    name: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameParams {
    id: Option<String>,
    new_name: Option<String>,
}

/// Search filters as sent by clients. Numbers arrive as strings so that a
/// malformed page parameter falls back to its default instead of failing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    file_name: Option<String>,
    upload_date: Option<String>,
    file_extension: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl SearchParams {
    fn into_search(self) -> Result<FileSearch, AppError> {
        let defaults = FileSearch::default();

        let upload_date = match non_empty(self.upload_date) {
            Some(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                AppError::BadRequest(format!("Invalid uploadDate, expected YYYY-MM-DD: {raw}"))
            })?),
            None => None,
        };

        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(defaults.limit);
        let offset = self
            .offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|&o| o >= 0)
            .unwrap_or(defaults.offset);

        Ok(FileSearch {
            file_name: non_empty(self.file_name),
            upload_date,
            file_extension: non_empty(self.file_extension),
            limit,
            offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let files = state.files.list_files(user.owner_id).await?;
    Ok(Json(json!({ "files": files })))
}

pub async fn get_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    let file_id = parse_file_id(Some(&id))?;
    let record = state.files.get_file(user.owner_id, file_id).await?;
    Ok(Json(record))
}

pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadedFile>), AppError> {
    let name = non_empty(params.name)
        .ok_or_else(|| AppError::BadRequest("File name is required".to_string()))?;
    if body.is_empty() {
        return Err(AppError::BadRequest("File content is required".to_string()));
    }

    let uploaded = state
        .files
        .upload(user.owner_id, name.trim(), body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(uploaded)))
}

pub async fn rename(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<RenameParams>,
) -> Result<&'static str, AppError> {
    let file_id = parse_file_id(Some(&id))?;
    rename_file(&state, user, file_id, params.new_name).await
}

/// `PUT /rename?id=&new_name=`
pub async fn rename_by_query(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RenameParams>,
) -> Result<&'static str, AppError> {
    let file_id = parse_file_id(params.id.as_deref())?;
    rename_file(&state, user, file_id, params.new_name).await
}

async fn rename_file(
    state: &AppState,
    user: AuthUser,
    file_id: i64,
    new_name: Option<String>,
) -> Result<&'static str, AppError> {
    let new_name = non_empty(new_name)
        .ok_or_else(|| AppError::BadRequest("New file name is required".to_string()))?;
    state
        .files
        .rename(user.owner_id, file_id, new_name.trim())
        .await?;
    Ok("File renamed successfully")
}

pub async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let search = params.into_search()?;
    let files = state.files.search(user.owner_id, &search).await?;
    Ok(Json(json!({ "files": files })))
}
