//! StorageManager — validates uploads and persists object + metadata pairs.
//!
//! A store is a two-step write: the metadata record first, then the object
//! payload. If the payload write fails the freshly written record is removed
//! again (best effort). A crash between the two steps leaves an orphaned
//! record, which the reaper later removes once it expires.

use super::{
    StorageError, StorageResult,
    metadata_store::MetadataStore,
    name_generator::NameGenerator,
    object_store::{ObjectStore, StagedObject, extension_of},
    reaper::Reaper,
};
use crate::models::{byte_size::ByteSize, metadata::Metadata, upload::StoredObject};
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::Stream;
use std::{io, path::PathBuf, sync::Arc};
use tracing::{info, warn};

const LIFETIME_HINT: &str = "no form attribute \"lifetime\" or lifetime is not a valid number";

/// Everything needed to open the on-disk stores.
#[derive(Clone, Debug)]
pub struct StorageSettings {
    /// Root holding `uploads/`, `metadata/` and `staging/`.
    pub data_dir: PathBuf,
    pub max_size: ByteSize,
    /// Upper bound on requested lifetimes, in seconds.
    pub max_lifetime: u64,
    pub name_length: usize,
}

#[derive(Clone)]
pub struct StorageManager {
    metadata: Arc<MetadataStore>,
    objects: Arc<ObjectStore>,
    names: Arc<NameGenerator>,
    max_lifetime: u64,
    name_length: usize,
}

/// Record already persisted, waiting for its payload.
struct PendingObject {
    id: String,
    record: Metadata,
}

impl StorageManager {
    pub fn new(
        metadata: Arc<MetadataStore>,
        objects: Arc<ObjectStore>,
        names: Arc<NameGenerator>,
        max_lifetime: u64,
        name_length: usize,
    ) -> Self {
        Self {
            metadata,
            objects,
            names,
            max_lifetime,
            name_length,
        }
    }

    /// Open (and create) the storage directories beneath `settings.data_dir`.
    pub async fn open(settings: &StorageSettings) -> StorageResult<Self> {
        let metadata = MetadataStore::open(settings.data_dir.join("metadata")).await?;
        let objects = ObjectStore::open(
            settings.data_dir.join("uploads"),
            settings.data_dir.join("staging"),
            settings.max_size,
        )
        .await?;

        Ok(Self::new(
            Arc::new(metadata),
            Arc::new(objects),
            Arc::new(NameGenerator::new()),
            settings.max_lifetime,
            settings.name_length,
        ))
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Reaper sharing this manager's stores.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(self.metadata.clone(), self.objects.clone())
    }

    /// Check a raw `lifetime` value: present, a positive integer, and no
    /// larger than the configured maximum, in that order.
    pub fn validate_lifetime(&self, raw: Option<&str>) -> StorageResult<i64> {
        let raw = raw.ok_or_else(|| StorageError::InvalidLifetime(LIFETIME_HINT.into()))?;
        let lifetime: i64 = raw
            .trim()
            .parse()
            .map_err(|_| StorageError::InvalidLifetime(LIFETIME_HINT.into()))?;
        if lifetime <= 0 {
            return Err(StorageError::InvalidLifetime(format!(
                "{}s is not greater than 0s",
                lifetime
            )));
        }
        if lifetime as u64 > self.max_lifetime {
            return Err(StorageError::LifetimeTooLarge {
                requested: lifetime as u64,
                max: self.max_lifetime,
            });
        }
        Ok(lifetime)
    }

    /// Validate `lifetime`, then persist `content` under a fresh id.
    pub async fn store<S>(
        &self,
        content: S,
        lifetime: Option<&str>,
        filename: &str,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let lifetime = self.validate_lifetime(lifetime)?;
        let pending = self.begin(lifetime, filename).await?;
        let ext = ext_of_record(&pending);
        let written = self.objects.write(&pending.id, &ext, content).await;
        self.finish(pending, written).await
    }

    /// Same as [`store`](Self::store) for a payload that was staged before
    /// its `lifetime` was known. The staged file is discarded on any
    /// validation failure.
    pub async fn store_staged(
        &self,
        staged: Option<StagedObject>,
        lifetime: Option<&str>,
        filename: &str,
    ) -> StorageResult<StoredObject> {
        let lifetime = match self.validate_lifetime(lifetime) {
            Ok(lifetime) => lifetime,
            Err(err) => {
                if let Some(staged) = staged {
                    staged.discard();
                }
                return Err(err);
            }
        };
        let staged = staged.ok_or(StorageError::MissingFile)?;

        let pending = match self.begin(lifetime, filename).await {
            Ok(pending) => pending,
            Err(err) => {
                staged.discard();
                return Err(err);
            }
        };
        let ext = ext_of_record(&pending);
        let written = self.objects.commit(staged, &pending.id, &ext).await;
        self.finish(pending, written).await
    }

    /// Metadata for a stored file that is still live.
    ///
    /// `NotFound` when no record exists or its expiry has passed, even if
    /// the reaper has not removed it yet.
    pub async fn lookup(&self, file: &str) -> StorageResult<Metadata> {
        let id = file.split('.').next().unwrap_or_default();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(StorageError::NotFound(file.to_string()));
        }

        let record = self.metadata.get(id).await?;
        if record.filename != file || record.is_expired(Utc::now()) {
            return Err(StorageError::NotFound(file.to_string()));
        }
        Ok(record)
    }

    async fn begin(&self, lifetime: i64, filename: &str) -> StorageResult<PendingObject> {
        let now = Utc::now();
        let expiry = Duration::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| StorageError::InvalidLifetime(format!("{}s is out of range", lifetime)))?;

        // Collisions are not checked: ids are short random names and a
        // clash simply overwrites the older upload.
        let id = self.names.generate(self.name_length);
        let record = Metadata {
            filename: format!("{}{}", id, extension_of(filename)),
            expiry,
        };

        self.metadata.put(&id, &record).await?;
        Ok(PendingObject { id, record })
    }

    async fn finish(
        &self,
        pending: PendingObject,
        written: StorageResult<u64>,
    ) -> StorageResult<StoredObject> {
        let size_bytes = match written {
            Ok(size) => size,
            Err(err) => {
                if let Err(rollback) = self.metadata.delete(&pending.id).await {
                    warn!(
                        "store {}: failed to roll back metadata after payload error: {}",
                        pending.id, rollback
                    );
                }
                return Err(err);
            }
        };

        info!(
            "stored {} ({} bytes), expires {}",
            pending.record.filename,
            size_bytes,
            pending.record.expiry.to_rfc3339()
        );

        Ok(StoredObject {
            file: pending.record.filename,
            expiry: pending.record.expiry,
            id: pending.id,
            size_bytes,
        })
    }
}

fn ext_of_record(pending: &PendingObject) -> String {
    pending
        .record
        .filename
        .strip_prefix(pending.id.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::stream;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    pub(crate) const MAX_LIFETIME: u64 = 3600;

    pub(crate) async fn manager_in(root: &Path, max_size: u64) -> StorageManager {
        let metadata = MetadataStore::open(root.join("metadata")).await.unwrap();
        let objects = ObjectStore::open(
            root.join("uploads"),
            root.join("staging"),
            ByteSize(max_size),
        )
        .await
        .unwrap();
        StorageManager::new(
            Arc::new(metadata),
            Arc::new(objects),
            Arc::new(NameGenerator::with_seed(1)),
            MAX_LIFETIME,
            6,
        )
    }

    async fn setup() -> (TempDir, StorageManager) {
        let tmp = tempdir().unwrap();
        let manager = manager_in(tmp.path(), 1024).await;
        (tmp, manager)
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn nothing_stored(manager: &StorageManager) -> bool {
        let empty = |p: &Path| std::fs::read_dir(p).unwrap().next().is_none();
        empty(manager.metadata().dir())
            && empty(manager.objects().objects_dir())
            && empty(manager.objects().staging_dir())
    }

    #[tokio::test]
    async fn store_writes_object_and_metadata() {
        let (_tmp, manager) = setup().await;
        let before = Utc::now();

        let stored = manager
            .store(body(b"0123456789"), Some("60"), "notes.txt")
            .await
            .unwrap();

        assert_eq!(stored.id.len(), 6);
        assert!(stored.id.bytes().all(|b| b.is_ascii_lowercase()));
        assert_eq!(stored.file, format!("{}.txt", stored.id));
        assert_eq!(stored.size_bytes, 10);

        let elapsed = (stored.expiry - before).num_seconds();
        assert!((60..=61).contains(&elapsed), "expiry offset {}", elapsed);

        let record = manager.metadata().get(&stored.id).await.unwrap();
        assert_eq!(record.filename, stored.file);
        assert_eq!(record.expiry, stored.expiry);

        let path = manager.objects().path_for(&stored.id, ".txt");
        assert_eq!(std::fs::read(path).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn invalid_lifetimes_write_nothing() {
        let (_tmp, manager) = setup().await;
        let too_large = (MAX_LIFETIME + 1).to_string();

        for raw in [None, Some(""), Some("abc"), Some("0"), Some("-5"), Some("1.5")] {
            let err = manager.store(body(b"x"), raw, "a.txt").await.unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidLifetime(_)),
                "{:?} -> {:?}",
                raw,
                err
            );
        }

        let err = manager
            .store(body(b"x"), Some(too_large.as_str()), "a.txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::LifetimeTooLarge {
                requested,
                max: MAX_LIFETIME
            } if requested == MAX_LIFETIME + 1
        ));

        assert!(nothing_stored(&manager));
    }

    #[tokio::test]
    async fn max_lifetime_is_accepted() {
        let (_tmp, manager) = setup().await;
        let max = MAX_LIFETIME.to_string();
        manager
            .store(body(b"x"), Some(max.as_str()), "a")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lifetime_errors_win_over_missing_file() {
        let (_tmp, manager) = setup().await;

        let err = manager.store_staged(None, Some("nope"), "").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidLifetime(_)));

        let err = manager.store_staged(None, Some("10"), "").await.unwrap_err();
        assert!(matches!(err, StorageError::MissingFile));
        assert!(nothing_stored(&manager));
    }

    #[tokio::test]
    async fn staged_upload_is_committed_or_discarded() {
        let (_tmp, manager) = setup().await;

        let staged = manager.objects().stage(body(b"late")).await.unwrap();
        let err = manager
            .store_staged(Some(staged), Some("999999"), "late.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LifetimeTooLarge { .. }));
        assert!(nothing_stored(&manager));

        let staged = manager.objects().stage(body(b"late")).await.unwrap();
        let stored = manager
            .store_staged(Some(staged), Some("5"), "late.bin")
            .await
            .unwrap();
        let path = manager.objects().path_for(&stored.id, ".bin");
        assert_eq!(std::fs::read(path).unwrap(), b"late");
        assert!(manager.metadata().get(&stored.id).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_payload_rolls_back_metadata() {
        let tmp = tempdir().unwrap();
        let manager = manager_in(tmp.path(), 4).await;

        let err = manager
            .store(body(b"way too long"), Some("10"), "big.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::SizeExceeded { .. }));
        assert!(nothing_stored(&manager));
    }

    #[tokio::test]
    async fn lookup_only_answers_for_live_files() {
        let (_tmp, manager) = setup().await;
        let stored = manager
            .store(body(b"live"), Some("100"), "a.png")
            .await
            .unwrap();

        let record = manager.lookup(&stored.file).await.unwrap();
        assert_eq!(record.filename, stored.file);

        assert!(matches!(
            manager.lookup(&format!("{}.jpg", stored.id)).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            manager.lookup("../etc.png").await,
            Err(StorageError::NotFound(_))
        ));

        let expired = Metadata {
            filename: "oldold.png".into(),
            expiry: Utc::now() - Duration::seconds(1),
        };
        manager.metadata().put("oldold", &expired).await.unwrap();
        assert!(matches!(
            manager.lookup("oldold.png").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
