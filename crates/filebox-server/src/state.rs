use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::service::FileService;
use crate::sweeper::ExpirySweeper;

/// Shared application state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileService>,
    pub sweeper: Arc<ExpirySweeper>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(files: Arc<FileService>, sweeper: Arc<ExpirySweeper>) -> Self {
        Self {
            files,
            sweeper,
            started_at: Utc::now(),
        }
    }
}
