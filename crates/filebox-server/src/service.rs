//! File metadata read and write paths
//!
//! Writes go to the store first and then invalidate every cache key that can
//! contain the record, before returning. The invalidation runs whatever the
//! write's outcome, since a failed write may still have landed. Reads of the
//! list and per-file views go through the cache; search always reads the
//! store.

use chrono::Duration as ChronoDuration;
use filebox_db::{FileRecord, FileSearch, FileUpdate, NewFile};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::blob::{locator_for_upload, BlobStore};
use crate::cache::{CacheKey, FileCache};
use crate::clock::Clock;
use crate::error::{StoreError, UploadError};
use crate::share::{Access, ShareLinkManager};
use crate::store::MetadataStore;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    #[serde(rename = "fileID")]
    pub file_id: i64,
    #[serde(rename = "fileURL")]
    pub file_url: String,
}

/// Suffix of the last path element from its final dot, or empty when it has
/// no dot. `.bashrc` is its own extension and `trailing.` has extension `.`.
pub fn file_extension(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.rfind('.')
        .map(|idx| base[idx..].to_string())
        .unwrap_or_default()
}

pub struct FileService {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<FileCache>,
    clock: Arc<dyn Clock>,
    shares: ShareLinkManager,
    retention: Option<Duration>,
}

impl FileService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<FileCache>,
        clock: Arc<dyn Clock>,
        shares: ShareLinkManager,
        retention: Option<Duration>,
    ) -> Self {
        Self {
            store,
            blobs,
            cache,
            clock,
            shares,
            retention,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Every file of `owner_id`, from the cache when present
    pub async fn list_files(&self, owner_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        let key = CacheKey::OwnerFiles(owner_id);
        if let Some(files) = self.cache.get_json::<Vec<FileRecord>>(key).await {
            debug!(owner_id, "File list served from cache");
            return Ok(files);
        }

        let files = self.store.list_by_owner(owner_id).await?;
        self.cache.put_json(key, &files).await;
        Ok(files)
    }

    /// One file's metadata. Another owner's file is reported as not found.
    pub async fn get_file(&self, owner_id: i64, file_id: i64) -> Result<FileRecord, StoreError> {
        let key = CacheKey::File(file_id);
        let record = match self.cache.get_json::<FileRecord>(key).await {
            Some(record) => record,
            None => {
                let record = self.store.get(file_id).await?;
                self.cache.put_json(key, &record).await;
                record
            }
        };

        if record.owner_id != owner_id {
            return Err(StoreError::NotFound);
        }
        Ok(record)
    }

    /// Store the uploaded bytes and record their metadata
    pub async fn upload(
        &self,
        owner_id: i64,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedFile, UploadError> {
        let file_size = data.len() as i64;
        let locator = locator_for_upload(owner_id, file_name);
        let blob_url = self.blobs.put(&locator, data).await?;

        let now = self.clock.now();
        let expires_at = self
            .retention
            .and_then(|r| ChronoDuration::from_std(r).ok())
            .map(|r| now + r);

        let file = NewFile {
            owner_id,
            file_name: file_name.to_string(),
            file_size,
            blob_url: blob_url.clone(),
            file_extension: file_extension(file_name),
            uploaded_at: now,
            expires_at,
        };

        let result = self.store.create(&file).await;
        self.cache.invalidate(&[CacheKey::OwnerFiles(owner_id)]).await;
        let file_id = result?;

        info!(file_id, owner_id, file_size, "Uploaded file");
        Ok(UploadedFile {
            file_id,
            file_url: blob_url,
        })
    }

    pub async fn rename(
        &self,
        owner_id: i64,
        file_id: i64,
        new_name: &str,
    ) -> Result<FileRecord, StoreError> {
        let update = FileUpdate::rename(new_name).owned_by(owner_id);
        self.write(owner_id, file_id, &update).await
    }

    /// Search always reads through to the store
    pub async fn search(
        &self,
        owner_id: i64,
        search: &FileSearch,
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.store.search(owner_id, search).await
    }

    pub async fn share(&self, owner_id: i64, file_id: i64) -> Result<String, StoreError> {
        self.shares.grant(file_id, owner_id).await
    }

    pub async fn unshare(&self, owner_id: i64, file_id: i64) -> Result<(), StoreError> {
        let record = self.store.get(file_id).await?;
        if record.owner_id != owner_id {
            return Err(StoreError::NotFound);
        }
        self.shares.revoke(file_id).await
    }

    pub async fn access_shared(&self, file_id: i64) -> Result<Access, StoreError> {
        self.shares.access(file_id).await
    }

    async fn write(
        &self,
        owner_id: i64,
        file_id: i64,
        update: &FileUpdate,
    ) -> Result<FileRecord, StoreError> {
        let result = self.store.update(file_id, update).await;
        self.cache
            .invalidate(&CacheKey::for_file(file_id, owner_id))
            .await;
        result
    }
}
