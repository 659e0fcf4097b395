//! Result of a successful upload and its wire representations.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An object that has been written to storage together with its metadata.
#[derive(Clone, Debug)]
pub struct StoredObject {
    /// Generated identifier (without extension).
    pub id: String,

    /// Public file name: `id` plus the original extension.
    pub file: String,

    /// Absolute expiry of the object.
    pub expiry: DateTime<Utc>,

    /// Number of content bytes written.
    pub size_bytes: u64,
}

/// JSON body returned by `POST /api/v1/upload`.
#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file: String,
    /// Expiry as unix seconds.
    pub expiry: i64,
}

impl From<StoredObject> for UploadResponse {
    fn from(obj: StoredObject) -> Self {
        Self {
            message: "file upload successful",
            file: obj.file,
            expiry: obj.expiry.timestamp(),
        }
    }
}

/// JSON body returned by `GET /api/v1/info/{file}`.
#[derive(Serialize, Debug)]
pub struct FileInfoResponse {
    pub file: String,
    pub expiry: i64,
}
