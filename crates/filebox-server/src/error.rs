//! Error types for the Filebox server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

use crate::share::ShareDenied;

/// Durable store failure.
///
/// `NotFound` covers both a missing row and a row that failed an ownership or
/// share-stamp guard; everything else means the backend itself broke.
#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Database(Box<sqlx::Error>),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "File not found"),
            StoreError::Database(err) => write!(f, "Database error: {}", err),
            StoreError::Backend(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(Box::new(err))
    }
}

/// Cache failure. Never fails a request; callers log it and treat it as a miss.
#[derive(Debug)]
pub enum CacheError {
    Timeout,
    Backend(String),
    Codec(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Timeout => write!(f, "Cache timed out"),
            CacheError::Backend(msg) => write!(f, "Cache error: {}", msg),
            CacheError::Codec(msg) => write!(f, "Cache codec error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

/// Blob store failure
#[derive(Debug)]
pub enum BlobError {
    Request(String),
    Status(u16),
    Config(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Request(msg) => write!(f, "Blob store request failed: {}", msg),
            BlobError::Status(code) => write!(f, "Blob store returned status {}", code),
            BlobError::Config(msg) => write!(f, "Blob store configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Request(err.to_string())
    }
}

/// Upload failure: either the bytes or the metadata could not be stored
#[derive(Debug)]
pub enum UploadError {
    Blob(BlobError),
    Store(StoreError),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Blob(err) => write!(f, "Upload failed: {}", err),
            UploadError::Store(err) => write!(f, "Saving file metadata failed: {}", err),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Blob(err) => Some(err),
            UploadError::Store(err) => Some(err),
        }
    }
}

impl From<BlobError> for UploadError {
    fn from(err: BlobError) -> Self {
        UploadError::Blob(err)
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        UploadError::Store(err)
    }
}

/// Process start-up error
#[derive(Debug)]
pub enum ServerError {
    Database(Box<sqlx::Error>),
    Migration(Box<sqlx::migrate::MigrateError>),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Database(err) => write!(f, "Database error: {}", err),
            ServerError::Migration(err) => write!(f, "Migration failed: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Database(err) => Some(err.as_ref()),
            ServerError::Migration(err) => Some(err.as_ref()),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(Box::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for ServerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ServerError::Migration(Box::new(err))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<BlobError> for ServerError {
    fn from(err: BlobError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Application error type that converts to HTTP responses
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Denied(ShareDenied),
    Internal(String),
    Store(StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".into()),
            AppError::Denied(reason) => {
                let body = json!({ "error": reason.message(), "reason": reason.as_str() });
                return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
            AppError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "File not found".into())
            }
            AppError::Store(e) => {
                tracing::error!(error = %e, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Store(e) => AppError::Store(e),
            UploadError::Blob(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ShareDenied> for AppError {
    fn from(reason: ShareDenied) -> Self {
        AppError::Denied(reason)
    }
}
