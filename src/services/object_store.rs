//! ObjectStore: uploaded payloads on local disk, addressed by `id + extension`.
//!
//! Payloads are streamed into a staging directory, fsynced, and renamed into
//! `objects_dir/<id><ext>`. Readers therefore only ever see complete files.
//! The staging directory must live on the same filesystem as `objects_dir`.

use super::{StorageError, StorageResult, not_found_or_io};
use crate::models::byte_size::ByteSize;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;

const MAX_EXTENSION_LEN: usize = 16;

/// Payload written to the staging area but not yet addressable.
///
/// The staging file is removed when this value is dropped without being
/// committed, including when the future driving an upload is cancelled.
#[derive(Debug)]
pub struct StagedObject {
    path: TempPath,
    size_bytes: u64,
}

impl StagedObject {
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Remove the staged payload.
    pub fn discard(self) {
        if let Err(err) = self.path.close() {
            debug!("failed to discard staged file: {}", err);
        }
    }
}

/// Create an anonymous `.tmp-*` file in `dir` that is deleted on drop.
pub(crate) fn temp_file_in(dir: &Path) -> io::Result<(File, TempPath)> {
    let (file, path) = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)?
        .into_parts();
    Ok((File::from_std(file), path))
}

#[derive(Debug)]
pub struct ObjectStore {
    objects_dir: PathBuf,
    staging_dir: PathBuf,
    max_size: ByteSize,
}

impl ObjectStore {
    /// Open the store, creating both directories if needed.
    pub async fn open(
        objects_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        max_size: ByteSize,
    ) -> StorageResult<Self> {
        let objects_dir = objects_dir.into();
        let staging_dir = staging_dir.into();
        fs::create_dir_all(&objects_dir).await?;
        fs::create_dir_all(&staging_dir).await?;
        Ok(Self {
            objects_dir,
            staging_dir,
            max_size,
        })
    }

    /// Directory that retrieval serves files from.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn max_size(&self) -> ByteSize {
        self.max_size
    }

    /// Location of the object for `id` and `ext`. Pure lookup, no I/O.
    pub fn path_for(&self, id: &str, ext: &str) -> PathBuf {
        self.objects_dir.join(format!("{}{}", id, ext))
    }

    /// Stream `stream` into the staging area.
    ///
    /// The stream is wrapped with a byte ceiling; going past `max_size`
    /// aborts with `SizeExceeded`. Errors from the source stream become
    /// `MalformedUpload`, errors writing to disk stay `Io`. The staging file
    /// is removed on any error, and if this future is dropped midway.
    pub async fn stage<S>(&self, stream: S) -> StorageResult<StagedObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let (mut file, path) = temp_file_in(&self.staging_dir)?;

        let stream = capped(stream, self.max_size);
        pin_mut!(stream);

        let mut size_bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(StagedObject { path, size_bytes })
    }

    /// Move a staged payload to its addressable location.
    pub async fn commit(&self, staged: StagedObject, id: &str, ext: &str) -> StorageResult<u64> {
        let target = self.path_for(id, ext);
        let size_bytes = staged.size_bytes;
        staged
            .path
            .persist(&target)
            .map_err(|err| StorageError::Io(err.error))?;
        debug!("stored object {} ({} bytes)", target.display(), size_bytes);
        Ok(size_bytes)
    }

    /// Stage and commit in one step. Returns the number of bytes written.
    pub async fn write<S>(&self, id: &str, ext: &str, stream: S) -> StorageResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let staged = self.stage(stream).await?;
        self.commit(staged, id, ext).await
    }

    /// Remove the object; `NotFound` if it is already gone.
    pub async fn delete(&self, id: &str, ext: &str) -> StorageResult<()> {
        let path = self.path_for(id, ext);
        fs::remove_file(&path)
            .await
            .map_err(|err| not_found_or_io(err, &format!("{}{}", id, ext)))
    }
}

/// Wrap an inbound stream so it fails once more than `limit` bytes pass.
fn capped<S>(stream: S, limit: ByteSize) -> impl Stream<Item = StorageResult<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut seen: u64 = 0;
    stream.map(move |chunk: io::Result<Bytes>| -> StorageResult<Bytes> {
        let chunk = chunk.map_err(|err| StorageError::MalformedUpload(err.to_string()))?;
        seen += chunk.len() as u64;
        if seen > limit.bytes() {
            return Err(StorageError::SizeExceeded { limit });
        }
        Ok(chunk)
    })
}

/// Extension of an uploaded file name, including the leading dot.
///
/// Only short ASCII-alphanumeric extensions are kept so the result is always
/// safe inside a path segment; anything else yields an empty extension.
pub fn extension_of(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(pos) if is_safe_extension(&base[pos..]) => base[pos..].to_string(),
        _ => String::new(),
    }
}

/// True for `""` or a dot followed by 1..=16 ASCII alphanumerics.
pub fn is_safe_extension(ext: &str) -> bool {
    if ext.is_empty() {
        return true;
    }
    let Some(rest) = ext.strip_prefix('.') else {
        return false;
    };
    !rest.is_empty()
        && rest.len() <= MAX_EXTENSION_LEN
        && rest.bytes().all(|b| b.is_ascii_alphanumeric())
}
