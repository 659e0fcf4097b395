//! HTTP handlers for uploads and file lookups.
//! Upload bodies are streamed straight into storage; nothing is buffered in
//! memory beyond a single multipart chunk.

use crate::{
    errors::AppError,
    models::{
        byte_size::ByteSize,
        upload::{FileInfoResponse, StoredObject, UploadResponse},
    },
    services::{StorageError, object_store::StagedObject, storage_manager::StorageManager},
};
use axum::{
    Json,
    extract::{
        Path, State,
        multipart::{Multipart, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use futures::StreamExt;
use std::io;

/// `POST /api/v1/upload` with multipart fields `lifetime` and `file`.
///
/// When `lifetime` arrives first the file is validated and stored directly.
/// When `file` comes first it is staged on disk until the whole form has
/// been read, then committed or discarded.
pub async fn upload_file(
    State(storage): State<StorageManager>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|rej| AppError::bad_request(rej.body_text()))?;

    let mut lifetime: Option<String> = None;
    let mut staged: Option<(StagedObject, String)> = None;

    match read_fields(&storage, &mut multipart, &mut lifetime, &mut staged).await {
        Ok(Some(stored)) => return Ok(Json(stored.into())),
        Ok(None) => {}
        Err(err) => {
            if let Some((staged, _)) = staged.take() {
                staged.discard();
            }
            return Err(err);
        }
    }

    let (staged, filename) = match staged {
        Some((staged, filename)) => (Some(staged), filename),
        None => (None, String::new()),
    };
    let stored = storage
        .store_staged(staged, lifetime.as_deref(), &filename)
        .await?;
    Ok(Json(stored.into()))
}

/// Walk the form. Returns the stored object if the file could be written
/// directly, `None` if the caller still has to finish the upload.
async fn read_fields(
    storage: &StorageManager,
    multipart: &mut Multipart,
    lifetime: &mut Option<String>,
    staged: &mut Option<(StagedObject, String)>,
) -> Result<Option<StoredObject>, AppError> {
    let limit = storage.objects().max_size();
    let to_app_error = |err: MultipartError| multipart_error(err, limit);

    while let Some(field) = multipart.next_field().await.map_err(to_app_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("lifetime") => {
                *lifetime = Some(field.text().await.map_err(to_app_error)?);
            }
            // A `file` part without a filename is a plain text field, not an upload.
            Some("file") if staged.is_none() && field.file_name().is_some() => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let body = field.map(|chunk| chunk.map_err(io::Error::other));
                if lifetime.is_some() {
                    let stored = storage
                        .store(body, lifetime.as_deref(), &filename)
                        .await?;
                    return Ok(Some(stored));
                }
                let pending = storage.objects().stage(body).await?;
                *staged = Some((pending, filename));
            }
            _ => {}
        }
    }

    Ok(None)
}

fn multipart_error(err: MultipartError, limit: ByteSize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StorageError::SizeExceeded { limit }.into()
    } else {
        StorageError::MalformedUpload(err.body_text()).into()
    }
}

/// Any method other than POST on the upload route.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

/// `GET /api/v1/info/{file}` — expiry of a stored file that is still live.
pub async fn file_info(
    State(storage): State<StorageManager>,
    Path(file): Path<String>,
) -> Result<Json<FileInfoResponse>, AppError> {
    let record = storage.lookup(&file).await?;
    Ok(Json(FileInfoResponse {
        file: record.filename,
        expiry: record.expiry.timestamp(),
    }))
}
