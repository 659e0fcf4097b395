//! Per-object metadata persisted alongside each upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record for a single stored upload.
///
/// Serialized as one JSON document per object (`<id>.json`). The record only
/// carries the absolute expiry, so the reaper never needs to know when the
/// upload happened.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// Stored file name: generated id plus the original extension.
    pub filename: String,

    /// Instant after which the object may be removed.
    pub expiry: DateTime<Utc>,
}

impl Metadata {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}
