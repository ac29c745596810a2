//! Temporary public share links
//!
//! A share grant is the `shared_user`/`shared_at` state of a record, valid for
//! one window from `shared_at`. It ends on whichever comes first: a public
//! access that finds it past the window, or the revocation task scheduled by
//! the grant. Each file has one revocation slot; a newer grant aborts the task
//! in the slot, and every task revokes conditionally on the `shared_at` stamp
//! it was scheduled for, so a stale task can never end a newer grant.

use chrono::{DateTime, SubsecRound, Utc};
use filebox_db::{FileRecord, FileUpdate, ShareState};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, FileCache};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::MetadataStore;

/// Why a public access was refused. A normal negative result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareDenied {
    NotShared,
    Expired,
}

impl ShareDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareDenied::NotShared => "not-shared",
            ShareDenied::Expired => "expired",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ShareDenied::NotShared => "File is not shared or the link has expired",
            ShareDenied::Expired => "The file sharing link has expired",
        }
    }
}

impl fmt::Display for ShareDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of accessing a public link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(FileRecord),
    Denied(ShareDenied),
}

/// Public view of a shared file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedFile {
    pub file_name: String,
    pub s3_url: String,
    pub file_size: i64,
    pub file_type: String,
}

impl From<FileRecord> for SharedFile {
    fn from(r: FileRecord) -> Self {
        Self {
            file_name: r.file_name,
            s3_url: r.blob_url,
            file_size: r.file_size,
            file_type: r.file_extension,
        }
    }
}

/// Share stamps are stored at microsecond precision; truncating before the
/// write keeps the stamp a revocation task captured equal to the stored one.
pub fn share_stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

struct Scheduled {
    stamp: DateTime<Utc>,
    handle: JoinHandle<()>,
}

type Slots = Arc<Mutex<HashMap<i64, Scheduled>>>;

pub struct ShareLinkManager {
    store: Arc<dyn MetadataStore>,
    cache: Arc<FileCache>,
    clock: Arc<dyn Clock>,
    window: Duration,
    public_url: String,
    slots: Slots,
}

impl ShareLinkManager {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        cache: Arc<FileCache>,
        clock: Arc<dyn Clock>,
        window: Duration,
        public_url: &str,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            window,
            public_url: public_url.trim_end_matches('/').to_string(),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn share_url(&self, file_id: i64) -> String {
        format!("{}/share/{}", self.public_url, file_id)
    }

    /// Share `file_id` (owned by `owner_id`) for one window from now.
    /// Re-granting an already shared file restarts the window.
    pub async fn grant(&self, file_id: i64, owner_id: i64) -> Result<String, StoreError> {
        let stamp = share_stamp(self.clock.now());
        let update = FileUpdate::share(ShareState::Shared(stamp)).owned_by(owner_id);
        let result = self.store.update(file_id, &update).await;
        self.cache
            .invalidate(&CacheKey::for_file(file_id, owner_id))
            .await;
        result?;

        self.schedule_revocation(file_id, owner_id, stamp).await;
        info!(file_id, owner_id, shared_at = %stamp, "Granted share link");
        Ok(self.share_url(file_id))
    }

    /// Public read path. Expired grants are revoked eagerly before denying.
    pub async fn access(&self, file_id: i64) -> Result<Access, StoreError> {
        let record = self.store.get(file_id).await?;

        if !record.shared {
            return Ok(Access::Denied(ShareDenied::NotShared));
        }
        let Some(shared_at) = record.shared_at else {
            return Ok(Access::Denied(ShareDenied::Expired));
        };

        if self.is_past_window(shared_at) {
            let task = self.revocation(file_id, record.owner_id, shared_at);
            task.revoke_if_current().await?;
            return Ok(Access::Denied(ShareDenied::Expired));
        }

        Ok(Access::Granted(record))
    }

    /// Unshare unconditionally. Revoking an unshared file is a no-op.
    pub async fn revoke(&self, file_id: i64) -> Result<(), StoreError> {
        if let Some(prev) = self.slots.lock().await.remove(&file_id) {
            prev.handle.abort();
        }

        let update = FileUpdate::share(ShareState::Unshared);
        match self.store.update(file_id, &update).await {
            Ok(record) => {
                self.cache
                    .invalidate(&CacheKey::for_file(file_id, record.owner_id))
                    .await;
                debug!(file_id, "Revoked share link");
                Ok(())
            }
            Err(e) => {
                self.cache.invalidate(&[CacheKey::File(file_id)]).await;
                Err(e)
            }
        }
    }

    /// Number of revocation tasks currently scheduled
    pub async fn pending_revocations(&self) -> usize {
        self.slots.lock().await.len()
    }

    fn is_past_window(&self, shared_at: DateTime<Utc>) -> bool {
        let elapsed = self.clock.now() - shared_at;
        elapsed.to_std().is_ok_and(|elapsed| elapsed > self.window)
    }

    fn revocation(&self, file_id: i64, owner_id: i64, stamp: DateTime<Utc>) -> Revocation {
        Revocation {
            store: self.store.clone(),
            cache: self.cache.clone(),
            slots: self.slots.clone(),
            file_id,
            owner_id,
            stamp,
        }
    }

    async fn schedule_revocation(&self, file_id: i64, owner_id: i64, stamp: DateTime<Utc>) {
        let task = self.revocation(file_id, owner_id, stamp);
        let window = self.window;

        let mut slots = self.slots.lock().await;
        // Grants can reach this point out of order; the slot keeps the newest stamp.
        if let Some(current) = slots.get(&file_id) {
            if current.stamp > stamp {
                debug!(
                    file_id,
                    stale = %stamp,
                    current = %current.stamp,
                    "Newer grant already scheduled, dropping revocation"
                );
                return;
            }
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            task.fire().await;
        });
        if let Some(prev) = slots.insert(file_id, Scheduled { stamp, handle }) {
            debug!(file_id, superseded = %prev.stamp, "Superseding scheduled revocation");
            prev.handle.abort();
        }
    }
}

/// Revocation of one grant, identified by the `shared_at` stamp it was
/// scheduled for
struct Revocation {
    store: Arc<dyn MetadataStore>,
    cache: Arc<FileCache>,
    slots: Slots,
    file_id: i64,
    owner_id: i64,
    stamp: DateTime<Utc>,
}

impl Revocation {
    /// Unshare only while the stored stamp is still this grant's.
    /// Returns whether this call revoked the grant.
    async fn revoke_if_current(&self) -> Result<bool, StoreError> {
        let update = FileUpdate::share(ShareState::Unshared).if_shared_at(self.stamp);
        let result = self.store.update(self.file_id, &update).await;
        self.cache
            .invalidate(&CacheKey::for_file(self.file_id, self.owner_id))
            .await;

        match result {
            Ok(_) => {
                info!(file_id = self.file_id, shared_at = %self.stamp, "Share link expired");
                Ok(true)
            }
            Err(StoreError::NotFound) => {
                debug!(
                    file_id = self.file_id,
                    shared_at = %self.stamp,
                    "Share grant already superseded or revoked"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Body of the scheduled task
    async fn fire(self) {
        if let Err(e) = self.revoke_if_current().await {
            warn!(file_id = self.file_id, error = %e, "Scheduled share revocation failed");
        }

        let mut slots = self.slots.lock().await;
        if slots
            .get(&self.file_id)
            .is_some_and(|s| s.stamp == self.stamp)
        {
            slots.remove(&self.file_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaCache;
    use crate::testing::{sample_file, ManualClock, MemoryStore};

    const WINDOW: Duration = Duration::from_secs(60);

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<FileCache>,
        clock: Arc<ManualClock>,
        shares: ShareLinkManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(FileCache::new(
            Arc::new(MokaCache::new(100)),
            Duration::from_secs(300),
            Duration::from_millis(250),
        ));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let shares = ShareLinkManager::new(
            store.clone(),
            cache.clone(),
            clock.clone(),
            WINDOW,
            "http://localhost:8080/",
        );
        Fixture {
            store,
            cache,
            clock,
            shares,
        }
    }

    async fn shared(f: &Fixture, id: i64) -> bool {
        f.store.get(id).await.unwrap().shared
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_marks_shared_and_returns_url() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;

        let url = f.shares.grant(id, 1).await.unwrap();
        assert_eq!(url, format!("http://localhost:8080/share/{id}"));

        let record = f.store.get(id).await.unwrap();
        assert!(record.shared);
        assert_eq!(record.shared_at, Some(share_stamp(f.clock.now())));
        assert_eq!(f.shares.pending_revocations().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_for_other_owner_is_not_found() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;

        let err = f.shares.grant(id, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(!shared(&f, id).await);
        assert_eq!(f.shares.pending_revocations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_invalidates_file_and_list_keys() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.cache.put_json(CacheKey::File(id), &"stale").await;
        f.cache.put_json(CacheKey::OwnerFiles(1), &"stale").await;

        f.shares.grant(id, 1).await.unwrap();

        assert_eq!(f.cache.get_json::<String>(CacheKey::File(id)).await, None);
        assert_eq!(
            f.cache.get_json::<String>(CacheKey::OwnerFiles(1)).await,
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_within_window() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.shares.grant(id, 1).await.unwrap();

        f.clock.advance(Duration::from_secs(30));
        match f.shares.access(id).await.unwrap() {
            Access::Granted(record) => assert_eq!(record.file_name, "a.txt"),
            other => panic!("expected access, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_after_window_revokes_eagerly() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.shares.grant(id, 1).await.unwrap();

        // Only the wall clock moves; the scheduled task has not fired.
        f.clock.advance(WINDOW + Duration::from_secs(1));
        assert_eq!(
            f.shares.access(id).await.unwrap(),
            Access::Denied(ShareDenied::Expired)
        );
        assert!(!shared(&f, id).await);

        assert_eq!(
            f.shares.access(id).await.unwrap(),
            Access::Denied(ShareDenied::NotShared)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_unshared_and_missing() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;

        assert_eq!(
            f.shares.access(id).await.unwrap(),
            Access::Denied(ShareDenied::NotShared)
        );
        assert!(matches!(
            f.shares.access(id + 100).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_is_idempotent() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.shares.grant(id, 1).await.unwrap();

        f.shares.revoke(id).await.unwrap();
        let once = f.store.get(id).await.unwrap();
        f.shares.revoke(id).await.unwrap();
        let twice = f.store.get(id).await.unwrap();

        assert_eq!(once, twice);
        assert!(!twice.shared);
        assert_eq!(twice.shared_at, None);
        assert_eq!(f.shares.pending_revocations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_revocation_fires_after_window() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.shares.grant(id, 1).await.unwrap();

        tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
        assert!(shared(&f, id).await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!shared(&f, id).await);
        assert_eq!(f.shares.pending_revocations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reshare_outlives_first_grant_deadline() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        f.shares.grant(id, 1).await.unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        f.clock.advance(Duration::from_secs(40));
        f.shares.grant(id, 1).await.unwrap();

        // Past the first grant's deadline, before the second's.
        tokio::time::sleep(Duration::from_secs(30)).await;
        f.clock.advance(Duration::from_secs(30));
        assert!(shared(&f, id).await);
        assert!(matches!(
            f.shares.access(id).await.unwrap(),
            Access::Granted(_)
        ));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!shared(&f, id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_revocation_skips_newer_grant() {
        let f = fixture();
        let id = f.store.insert(sample_file(1, "a.txt")).await;
        let first = share_stamp(f.clock.now());
        f.shares.grant(id, 1).await.unwrap();

        f.clock.advance(Duration::from_secs(10));
        f.shares.grant(id, 1).await.unwrap();

        // A task for the first grant that escaped its abort.
        let stale = f.shares.revocation(id, 1, first);
        assert!(!stale.revoke_if_current().await.unwrap());
        assert!(shared(&f, id).await);

        let current = share_stamp(f.clock.now());
        let task = f.shares.revocation(id, 1, current);
        assert!(task.revoke_if_current().await.unwrap());
        assert!(!shared(&f, id).await);
    }

    /// Store that parks the grant writing `held` right after its write lands
    struct GatedStore {
        inner: Arc<MemoryStore>,
        held: DateTime<Utc>,
        written: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl MetadataStore for GatedStore {
        async fn create(&self, file: &filebox_db::NewFile) -> Result<i64, StoreError> {
            self.inner.create(file).await
        }

        async fn get(&self, id: i64) -> Result<FileRecord, StoreError> {
            self.inner.get(id).await
        }

        async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<FileRecord>, StoreError> {
            self.inner.list_by_owner(owner_id).await
        }

        async fn update(&self, id: i64, update: &FileUpdate) -> Result<FileRecord, StoreError> {
            let result = self.inner.update(id, update).await;
            if update.share == Some(ShareState::Shared(self.held)) {
                self.written.notify_one();
                self.release.notified().await;
            }
            result
        }

        async fn delete(&self, id: i64) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }

        async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
            self.inner.find_expired(now).await
        }

        async fn search(
            &self,
            owner_id: i64,
            search: &filebox_db::FileSearch,
        ) -> Result<Vec<FileRecord>, StoreError> {
            self.inner.search(owner_id, search).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_grant_scheduling_last_keeps_newer_timer() {
        let inner = Arc::new(MemoryStore::new());
        let id = inner.insert(sample_file(1, "a.txt")).await;
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(GatedStore {
            inner: inner.clone(),
            held: share_stamp(clock.now()),
            written: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let cache = Arc::new(FileCache::new(
            Arc::new(MokaCache::new(100)),
            Duration::from_secs(300),
            Duration::from_millis(250),
        ));
        let shares = Arc::new(ShareLinkManager::new(
            store.clone(),
            cache,
            clock.clone(),
            WINDOW,
            "http://localhost:8080",
        ));

        // The first grant writes its stamp, then stalls before scheduling.
        let first = tokio::spawn({
            let shares = shares.clone();
            async move { shares.grant(id, 1).await }
        });
        store.written.notified().await;

        // A second grant runs to completion in the meantime.
        clock.advance(Duration::from_secs(5));
        shares.grant(id, 1).await.unwrap();
        let newest = inner.get(id).await.unwrap().shared_at;
        assert_eq!(newest, Some(share_stamp(clock.now())));

        // The first grant resumes and schedules last.
        store.release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(shares.pending_revocations().await, 1);

        tokio::time::sleep(WINDOW * 5).await;
        let record = inner.get(id).await.unwrap();
        assert!(!record.shared);
        assert_eq!(record.shared_at, None);
        assert_eq!(shares.pending_revocations().await, 0);
    }

    #[test]
    fn test_share_stamp_truncates_to_micros() {
        let now = Utc::now();
        let stamp = share_stamp(now);
        assert_eq!(stamp.timestamp_subsec_nanos() % 1_000, 0);
        assert!(now - stamp < chrono::Duration::microseconds(1));
    }
}
