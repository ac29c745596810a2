//! Durable metadata store
//!
//! [`MetadataStore`] is the single source of truth for file records. Every
//! operation is a single-row (or single-statement) write or read; no call
//! spans records transactionally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filebox_db::{FileRecord, FileSearch, FileUpdate, NewFile, PgPool};
use tracing::debug;

use crate::error::StoreError;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record, returning its store-assigned id
    async fn create(&self, file: &NewFile) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<FileRecord, StoreError>;

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileRecord>, StoreError>;

    /// Apply `update` to one row and return the row as written.
    /// A missing row or a failed guard is [`StoreError::NotFound`].
    async fn update(&self, id: i64, update: &FileUpdate) -> Result<FileRecord, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Records whose expiry deadline is set and `<= now`
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError>;

    async fn search(
        &self,
        owner_id: i64,
        search: &FileSearch,
    ) -> Result<Vec<FileRecord>, StoreError>;
}

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create(&self, file: &NewFile) -> Result<i64, StoreError> {
        let id = filebox_db::files::create(&self.pool, file).await?;
        debug!(file_id = id, owner_id = file.owner_id, "Created file record");
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<FileRecord, StoreError> {
        filebox_db::files::get(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        Ok(filebox_db::files::list_by_owner(&self.pool, owner_id).await?)
    }

    async fn update(&self, id: i64, update: &FileUpdate) -> Result<FileRecord, StoreError> {
        filebox_db::files::update(&self.pool, id, update)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if filebox_db::files::delete(&self.pool, id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        Ok(filebox_db::files::find_expired(&self.pool, now).await?)
    }

    async fn search(
        &self,
        owner_id: i64,
        search: &FileSearch,
    ) -> Result<Vec<FileRecord>, StoreError> {
        Ok(filebox_db::files::search(&self.pool, owner_id, search).await?)
    }
}
