//! Background expiry sweep
//!
//! Each cycle finds records past their expiry deadline and retires them one
//! by one: blob first, then the record, then every cache key that could hold
//! it. A failure on one record never aborts the cycle. A blob failure leaves
//! the record in place so the next cycle retries it; a record-delete failure
//! after the blob is gone leaves a dangling record, which is logged.

use chrono::{DateTime, Utc};
use filebox_db::FileRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::blob::{locator_from_url, BlobStore};
use crate::cache::{CacheKey, FileCache};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::MetadataStore;

/// Summary of one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub ran_at: Option<DateTime<Utc>>,
    pub scanned: usize,
    pub deleted: usize,
    pub blob_failures: usize,
    pub store_failures: usize,
}

enum Outcome {
    Deleted,
    BlobFailed,
    StoreFailed,
}

pub struct ExpirySweeper {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<FileCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    last_report: RwLock<Option<SweepReport>>,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<FileCache>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            cache,
            clock,
            interval,
            last_report: RwLock::new(None),
        }
    }

    /// Spawn the sweep loop. The first cycle runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweep loop started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Expiry sweep: failed to query expired files");
            }
        }
    }

    /// Run one sweep cycle. Fails only when the expired set cannot be read.
    pub async fn run_cycle(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let expired = self.store.find_expired(now).await?;

        let mut report = SweepReport {
            ran_at: Some(now),
            scanned: expired.len(),
            ..Default::default()
        };

        for record in &expired {
            match self.retire(record).await {
                Outcome::Deleted => report.deleted += 1,
                Outcome::BlobFailed => report.blob_failures += 1,
                Outcome::StoreFailed => report.store_failures += 1,
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                deleted = report.deleted,
                blob_failures = report.blob_failures,
                store_failures = report.store_failures,
                "Expiry sweep: cycle complete"
            );
        } else {
            debug!("Expiry sweep: no expired files");
        }

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }

    async fn retire(&self, record: &FileRecord) -> Outcome {
        let locator = locator_from_url(&record.blob_url);
        if let Err(e) = self.blobs.delete(locator).await {
            warn!(
                file_id = record.id,
                locator,
                error = %e,
                "Expiry sweep: blob delete failed, will retry next cycle"
            );
            return Outcome::BlobFailed;
        }

        let result = self.store.delete(record.id).await;
        self.cache
            .invalidate(&CacheKey::for_file(record.id, record.owner_id))
            .await;

        match result {
            Ok(()) => {
                debug!(file_id = record.id, owner_id = record.owner_id, "Expiry sweep: deleted file");
                Outcome::Deleted
            }
            Err(StoreError::NotFound) => {
                debug!(file_id = record.id, "Expiry sweep: record already gone");
                Outcome::Deleted
            }
            Err(e) => {
                error!(
                    file_id = record.id,
                    locator,
                    error = %e,
                    "Expiry sweep: blob deleted but record delete failed, record now dangling"
                );
                Outcome::StoreFailed
            }
        }
    }
}
