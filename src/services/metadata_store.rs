//! MetadataStore: one JSON record per stored object under `metadata_dir`.
//!
//! Each record lives in its own file (`<id>.json`) so a crash mid-write can
//! damage at most that one record. Writes go to a temporary file which is
//! fsynced and renamed into place. There is no in-memory cache; every read
//! hits the filesystem.

use super::{StorageError, StorageResult, not_found_or_io, object_store::temp_file_in};
use crate::models::metadata::Metadata;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

const RECORD_EXT: &str = "json";

/// Raw record as found on disk during a scan.
#[derive(Debug)]
pub struct MetadataEntry {
    /// Object id, taken from the record file stem.
    pub id: String,
    pub raw: Vec<u8>,
}

impl MetadataEntry {
    pub fn decode(&self) -> serde_json::Result<Metadata> {
        serde_json::from_slice(&self.raw)
    }
}

#[derive(Debug)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXT))
    }

    /// Durably write the record for `id`, replacing any existing one.
    pub async fn put(&self, id: &str, record: &Metadata) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;
        let path = self.record_path(id);

        // Dropping `tmp_path` before `persist` deletes the partial record.
        let (mut file, tmp_path) = temp_file_in(&self.dir)?;
        file.write_all(&json).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tmp_path
            .persist(&path)
            .map_err(|err| StorageError::Io(err.error))?;

        debug!("wrote metadata record {}", path.display());
        Ok(())
    }

    /// Read the record for `id`. Absent and corrupt records are both `NotFound`.
    pub async fn get(&self, id: &str) -> StorageResult<Metadata> {
        let path = self.record_path(id);
        let raw = fs::read(&path)
            .await
            .map_err(|err| not_found_or_io(err, id))?;
        serde_json::from_slice(&raw).map_err(|err| {
            warn!("metadata record {} is corrupt: {}", path.display(), err);
            StorageError::NotFound(id.to_string())
        })
    }

    /// Enumerate every record currently on disk.
    ///
    /// Failing to read the directory itself is an error. A record that
    /// disappears or cannot be read mid-scan is logged and left out.
    pub async fn list(&self) -> StorageResult<Vec<MetadataEntry>> {
        let mut dir = fs::read_dir(&self.dir).await?;
        let mut entries = Vec::new();

        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            let Some(id) = record_id(&path) else {
                continue;
            };
            match fs::read(&path).await {
                Ok(raw) => entries.push(MetadataEntry { id, raw }),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("metadata record {} vanished during scan", path.display());
                }
                Err(err) => warn!("failed to read metadata record {}: {}", path.display(), err),
            }
        }

        Ok(entries)
    }

    /// Remove the record for `id`; `NotFound` if it was already gone.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        fs::remove_file(self.record_path(id))
            .await
            .map_err(|err| not_found_or_io(err, id))
    }
}

/// Id for a record file, or `None` for temp files and anything else.
fn record_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}
