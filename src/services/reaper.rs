//! Reaper — periodically removes expired objects and their metadata.
//!
//! A sweep lists every metadata record, and for each expired one deletes the
//! object first and the record second. If the object cannot be deleted the
//! record is kept so the pair is retried on the next sweep. An object that is
//! already missing counts as deleted, which is how orphaned records get
//! cleaned up. No single record can abort a sweep.

use super::{
    StorageError,
    metadata_store::MetadataStore,
    object_store::{ObjectStore, is_safe_extension},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome counts of a single sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records whose object and metadata are now gone.
    pub removed: usize,
    /// Records that could not be decoded and were left in place.
    pub skipped: usize,
    /// Expired records whose deletion failed.
    pub failed: usize,
}

#[derive(Clone)]
pub struct Reaper {
    metadata: Arc<MetadataStore>,
    objects: Arc<ObjectStore>,
}

impl Reaper {
    pub fn new(metadata: Arc<MetadataStore>, objects: Arc<ObjectStore>) -> Self {
        Self { metadata, objects }
    }

    /// Sweep against the current wall-clock time.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep, treating every record with `expiry <= now` as expired.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match self.metadata.list().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "sweep aborted: cannot list {}: {}",
                    self.metadata.dir().display(),
                    err
                );
                return report;
            }
        };

        for entry in entries {
            let record = match entry.decode() {
                Ok(record) => record,
                Err(err) => {
                    warn!("sweep: skipping undecodable record {}: {}", entry.id, err);
                    report.skipped += 1;
                    continue;
                }
            };
            if !record.is_expired(now) {
                continue;
            }

            let ext = match record.filename.strip_prefix(entry.id.as_str()) {
                Some(ext) if is_safe_extension(ext) => ext,
                _ => {
                    warn!(
                        "sweep: record {} names unexpected file {:?}, skipping",
                        entry.id, record.filename
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            match self.objects.delete(&entry.id, ext).await {
                Ok(()) => {}
                Err(StorageError::NotFound(_)) => {
                    debug!("sweep: object {} already gone", record.filename);
                }
                Err(err) => {
                    warn!("sweep: error removing object {}: {}", record.filename, err);
                    report.failed += 1;
                    continue;
                }
            }

            match self.metadata.delete(&entry.id).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {
                    info!("{} expired, removed", record.filename);
                    report.removed += 1;
                }
                Err(err) => {
                    warn!("sweep: error removing metadata {}: {}", entry.id, err);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Run a sweep every `interval` until `shutdown` flips to `true`.
    ///
    /// The first sweep happens immediately. Sweeps run one after another in
    /// a single task, so they never overlap; ticks missed while a sweep is
    /// running are delayed rather than bunched up.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep().await;
                        debug!(?report, "sweep finished");
                    }
                }
            }
            info!("reaper stopped");
        })
    }
}
