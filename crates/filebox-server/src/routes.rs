pub mod files;
pub mod health;
pub mod share;

use crate::error::AppError;

/// Parse a file id taken from a path segment or query parameter
pub(crate) fn parse_file_id(raw: Option<&str>) -> Result<i64, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("File ID is required".to_string()))?;
    raw.parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid file ID: {raw}")))
}
