//! Health & readiness handlers.
//!
//! - GET /api/v1/health -> simple liveness (`{"ok": true}`)
//! - GET /api/v1/ready  -> readiness that checks each storage directory

use crate::services::{object_store::temp_file_in, storage_manager::StorageManager};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, io, path::Path};
use tokio::{fs, io::AsyncWriteExt};

const READY_MARKER: &[u8] = b"readyz";

/// `GET /api/v1/health`
///
/// Liveness check. Always returns 200 OK and never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { ok: true }))
}

/// `GET /api/v1/ready`
///
/// Performs a best-effort write/read/delete in the metadata, uploads and
/// staging directories. HTTP 200 when all checks pass, 503 otherwise.
pub async fn readyz(State(storage): State<StorageManager>) -> impl IntoResponse {
    let dirs: [(&'static str, &Path); 3] = [
        ("metadata", storage.metadata().dir()),
        ("uploads", storage.objects().objects_dir()),
        ("staging", storage.objects().staging_dir()),
    ];

    let mut checks = HashMap::new();
    for (name, dir) in dirs {
        checks.insert(name, check_dir(dir).await);
    }

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_dir(dir: &Path) -> CheckStatus {
    match write_read_remove(dir).await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(format!("{}: {}", dir.display(), err)),
        },
    }
}

/// Round-trip a marker file through `dir`. The file is removed on every path.
async fn write_read_remove(dir: &Path) -> io::Result<()> {
    let (mut file, path) = temp_file_in(dir)?;
    file.write_all(READY_MARKER).await?;
    file.flush().await?;
    drop(file);

    if fs::read(&path).await? != READY_MARKER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file content mismatch",
        ));
    }
    path.close()
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
