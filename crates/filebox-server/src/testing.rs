//! In-memory collaborators for unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filebox_db::{FileRecord, FileSearch, FileUpdate, NewFile};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::blob::BlobStore;
use crate::cache::{CacheKey, CacheLayer};
use crate::clock::Clock;
use crate::error::{BlobError, CacheError, StoreError};
use crate::store::MetadataStore;

pub fn sample_file(owner_id: i64, name: &str) -> NewFile {
    let file_extension = name
        .rfind('.')
        .map(|idx| name[idx..].to_string())
        .unwrap_or_default();
    NewFile {
        owner_id,
        file_name: name.to_string(),
        file_size: 1234,
        blob_url: format!("https://blobs.test/bucket/{name}"),
        file_extension,
        uploaded_at: Utc::now(),
        expires_at: None,
    }
}

/// Metadata store over a BTreeMap, with switchable failures
pub struct MemoryStore {
    rows: RwLock<BTreeMap<i64, FileRecord>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
    failing_deletes: RwLock<HashSet<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
            failing_deletes: RwLock::new(HashSet::new()),
        }
    }

    pub async fn insert(&self, file: NewFile) -> i64 {
        self.create(&file).await.unwrap()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn fail_deletes_for(&self, id: i64) {
        self.failing_deletes.write().await.insert(id);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn create(&self, file: &NewFile) -> Result<i64, StoreError> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = FileRecord {
            id,
            owner_id: file.owner_id,
            file_name: file.file_name.clone(),
            uploaded_at: file.uploaded_at,
            file_size: file.file_size,
            blob_url: file.blob_url.clone(),
            file_extension: file.file_extension.clone(),
            shared: false,
            shared_at: None,
            expires_at: file.expires_at,
        };
        self.rows.write().await.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<FileRecord, StoreError> {
        self.check()?;
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        self.check()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: i64, update: &FileUpdate) -> Result<FileRecord, StoreError> {
        self.check()?;
        let mut rows = self.rows.write().await;
        let record = rows
            .get_mut(&id)
            .filter(|r| update.matches(r))
            .ok_or(StoreError::NotFound)?;
        update.apply_to(record);
        Ok(record.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.check()?;
        if self.failing_deletes.read().await.contains(&id) {
            return Err(StoreError::Backend(format!("delete of {id} rejected")));
        }
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        self.check()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        owner_id: i64,
        search: &FileSearch,
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.check()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.owner_id == owner_id && search.matches(r))
            .skip(search.offset.max(0) as usize)
            .take(search.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Blob store that records puts and deletes
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, usize>>,
    deleted: RwLock<Vec<String>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            deleted: RwLock::new(Vec::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Locators passed to successful deletes, in call order
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    pub async fn stored(&self, locator: &str) -> Option<usize> {
        self.objects.read().await.get(locator).copied()
    }

    pub async fn fail_deletes_for(&self, locator: &str) {
        self.failing.write().await.insert(locator.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, locator: &str, data: Vec<u8>) -> Result<String, BlobError> {
        self.objects
            .write()
            .await
            .insert(locator.to_string(), data.len());
        Ok(format!("https://blobs.test/bucket/{locator}"))
    }

    async fn delete(&self, locator: &str) -> Result<(), BlobError> {
        if self.failing.read().await.contains(locator) {
            return Err(BlobError::Status(503));
        }
        self.objects.write().await.remove(locator);
        self.deleted.write().await.push(locator.to_string());
        Ok(())
    }
}

/// Cache whose every operation fails
pub struct FailingCache;

#[async_trait]
impl CacheLayer for FailingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
