//! Storage services: id generation, metadata records, object payloads, the
//! orchestrating manager, and the expiry reaper.

pub mod metadata_store;
pub mod name_generator;
pub mod object_store;
pub mod reaper;
pub mod storage_manager;

use crate::models::byte_size::ByteSize;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    InvalidLifetime(String),
    #[error("{requested}s is greater than max lifetime of {max}s")]
    LifetimeTooLarge { requested: u64, max: u64 },
    #[error("no form attribute \"file\"")]
    MissingFile,
    #[error("uploaded file larger than {limit}")]
    SizeExceeded { limit: ByteSize },
    #[error("malformed upload body: {0}")]
    MalformedUpload(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Client-caused failures that map to a 4xx response.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidLifetime(_)
                | StorageError::LifetimeTooLarge { .. }
                | StorageError::MissingFile
                | StorageError::SizeExceeded { .. }
                | StorageError::MalformedUpload(_)
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Map an `io::Error` to `NotFound` when the target is simply absent.
pub(crate) fn not_found_or_io(err: io::Error, what: &str) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(what.to_string())
    } else {
        StorageError::Io(err)
    }
}
