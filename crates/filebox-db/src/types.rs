use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;

/// File row returned from SELECT queries.
///
/// Column and JSON names follow the `files` table so that cached snapshots and
/// API responses keep the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FileRecord {
    pub id: i64,
    #[sqlx(rename = "user_id")]
    #[serde(rename = "user_id")]
    pub owner_id: i64,
    pub file_name: String,
    #[sqlx(rename = "upload_date")]
    #[serde(rename = "upload_date")]
    pub uploaded_at: DateTime<Utc>,
    pub file_size: i64,
    #[sqlx(rename = "s3_url")]
    #[serde(rename = "s3_url")]
    pub blob_url: String,
    pub file_extension: String,
    #[sqlx(rename = "shared_user")]
    #[serde(rename = "shared_user")]
    pub shared: bool,
    pub shared_at: Option<DateTime<Utc>>,
    #[sqlx(rename = "expiry_date")]
    #[serde(rename = "expiry_date")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Whether the record's expiry deadline has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Parameters for inserting a freshly uploaded file
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub blob_url: String,
    pub file_extension: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Share state written by share grants and revocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareState {
    /// `shared_user = TRUE`, `shared_at = at`
    Shared(DateTime<Utc>),
    /// `shared_user = FALSE`, `shared_at = NULL`
    Unshared,
}

/// A single-row update: the fields to set plus optional row guards.
///
/// Guards turn the update into a conditional write; a row that fails a guard is
/// reported the same way as a missing row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    /// Only update when the row belongs to this owner
    pub owner_id: Option<i64>,
    /// Only update when the stored `shared_at` equals this stamp
    pub if_shared_at: Option<DateTime<Utc>>,
    pub file_name: Option<String>,
    pub share: Option<ShareState>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl FileUpdate {
    pub fn rename(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn share(state: ShareState) -> Self {
        Self {
            share: Some(state),
            ..Default::default()
        }
    }

    pub fn expiry(expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            expires_at: Some(expires_at),
            ..Default::default()
        }
    }

    pub fn owned_by(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn if_shared_at(mut self, stamp: DateTime<Utc>) -> Self {
        self.if_shared_at = Some(stamp);
        self
    }

    /// True when the update sets no column
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.share.is_none() && self.expires_at.is_none()
    }

    /// Whether `record` passes this update's guards
    pub fn matches(&self, record: &FileRecord) -> bool {
        self.owner_id.is_none_or(|owner| owner == record.owner_id)
            && self
                .if_shared_at
                .is_none_or(|stamp| record.shared_at == Some(stamp))
    }

    /// Apply the update's fields to an in-memory record
    pub fn apply_to(&self, record: &mut FileRecord) {
        if let Some(ref name) = self.file_name {
            record.file_name = name.clone();
        }
        match self.share {
            Some(ShareState::Shared(at)) => {
                record.shared = true;
                record.shared_at = Some(at);
            }
            Some(ShareState::Unshared) => {
                record.shared = false;
                record.shared_at = None;
            }
            None => {}
        }
        if let Some(expires_at) = self.expires_at {
            record.expires_at = expires_at;
        }
    }
}

/// Conjunctive search filters with pagination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSearch {
    /// Case-insensitive substring of the file name
    pub file_name: Option<String>,
    /// Exact (UTC) upload date
    pub upload_date: Option<NaiveDate>,
    /// Exact extension, including the leading dot
    pub file_extension: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for FileSearch {
    fn default() -> Self {
        Self {
            file_name: None,
            upload_date: None,
            file_extension: None,
            limit: 10,
            offset: 0,
        }
    }
}

impl FileSearch {
    /// Whether `record` satisfies every filter (pagination excluded)
    pub fn matches(&self, record: &FileRecord) -> bool {
        let name_ok = self.file_name.as_ref().is_none_or(|needle| {
            record
                .file_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let date_ok = self
            .upload_date
            .is_none_or(|date| record.uploaded_at.date_naive() == date);
        let ext_ok = self
            .file_extension
            .as_ref()
            .is_none_or(|ext| &record.file_extension == ext);
        name_ok && date_ok && ext_ok
    }
}
