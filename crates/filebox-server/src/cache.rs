//! Read-through metadata cache
//!
//! [`CacheLayer`] is the raw key/value capability. [`FileCache`] wraps it with
//! the soft-failure contract the request paths rely on: a cache that errors or
//! stalls behaves like a cache that missed, and failed writes or invalidations
//! are logged, never returned.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::CacheError;

/// Cache key. The two kinds never collide, whatever the ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The "list files" view of one owner
    OwnerFiles(i64),
    /// Metadata of one file
    File(i64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::OwnerFiles(owner_id) => write!(f, "user_files_{}", owner_id),
            CacheKey::File(file_id) => write!(f, "file_metadata_{}", file_id),
        }
    }
}

impl CacheKey {
    /// Every key whose content can include `file_id` owned by `owner_id`
    pub fn for_file(file_id: i64, owner_id: i64) -> [CacheKey; 2] {
        [CacheKey::File(file_id), CacheKey::OwnerFiles(owner_id)]
    }
}

#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct CachedValue {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<CacheKey, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by moka
pub struct MokaCache {
    entries: Cache<CacheKey, CachedValue>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl CacheLayer for MokaCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .get(key)
            .await
            .map(|value| value.bytes.as_ref().clone()))
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let value = CachedValue {
            bytes: Arc::new(value),
            ttl,
        };
        self.entries.insert(*key, value).await;
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

/// Soft-failing JSON cache used by the request paths, the share manager and
/// the sweeper
pub struct FileCache {
    layer: Arc<dyn CacheLayer>,
    ttl: Duration,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl FileCache {
    pub fn new(layer: Arc<dyn CacheLayer>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            layer,
            ttl,
            timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Look up and decode `key`. Errors, timeouts and undecodable entries are
    /// all reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let bytes = match tokio::time::timeout(self.timeout, self.layer.get(&key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Ok(Err(e)) => {
                self.record_error(key, "get", &e);
                return None;
            }
            Err(_) => {
                self.record_error(key, "get", &CacheError::Timeout);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                self.record_error(key, "decode", &CacheError::from(e));
                self.invalidate(&[key]).await;
                None
            }
        }
    }

    /// Encode and store `value` under `key` with the configured TTL
    pub async fn put_json<T: Serialize>(&self, key: CacheKey, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_error(key, "encode", &CacheError::from(e));
                return;
            }
        };

        match tokio::time::timeout(self.timeout, self.layer.set(&key, bytes, self.ttl)).await {
            Ok(Ok(())) => debug!(key = %key, "Cached"),
            Ok(Err(e)) => self.record_error(key, "set", &e),
            Err(_) => self.record_error(key, "set", &CacheError::Timeout),
        }
    }

    /// Attempt to invalidate every key, continuing past failures
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        for key in keys {
            match tokio::time::timeout(self.timeout, self.layer.invalidate(key)).await {
                Ok(Ok(())) => debug!(key = %key, "Invalidated cache entry"),
                Ok(Err(e)) => self.record_error(*key, "invalidate", &e),
                Err(_) => self.record_error(*key, "invalidate", &CacheError::Timeout),
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self, key: CacheKey, op: &'static str, error: &CacheError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, op, error = %error, "Cache operation failed");
    }
}
