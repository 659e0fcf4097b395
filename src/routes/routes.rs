//! Defines the HTTP surface of the file-drop service.
//!
//! ## Structure
//! - **API endpoints**
//!   - `GET  /api/v1/health`      — liveness
//!   - `GET  /api/v1/ready`       — readiness (storage directories writable)
//!   - `POST /api/v1/upload`      — multipart upload (`lifetime`, `file`)
//!   - `GET  /api/v1/info/{file}` — expiry of a live stored file
//!
//! - **Retrieval**
//!   - `GET /files/{file}` — raw bytes straight from the uploads directory
//!
//! - **Frontend**
//!   - anything else is served from the web root, falling back to
//!     `index.html` so client-side routes resolve.

use crate::{
    errors::AppError,
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{file_info, method_not_allowed, upload_file},
    },
    services::storage_manager::StorageManager,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::{path::Path, time::Duration};
use tower_http::{
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Room for multipart boundaries, part headers and the `lifetime` field on
/// top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router for all routes.
///
/// The router carries shared state (`StorageManager`) to all handlers.
pub fn routes(
    storage: &StorageManager,
    web_root: &Path,
    request_timeout: Duration,
) -> Router<StorageManager> {
    let body_limit = usize::try_from(storage.objects().max_size().bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        .route("/api/v1/health", get(healthz))
        .route("/api/v1/ready", get(readyz))
        .route(
            "/api/v1/upload",
            post(upload_file)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/v1/info/{file}", get(file_info))
        .nest_service("/files", ServeDir::new(storage.objects().objects_dir()));

    if web_root.is_dir() {
        info!("serving static files from {}", web_root.display());
        let index = web_root.join("index.html");
        router = router.fallback_service(
            ServeDir::new(web_root)
                .append_index_html_on_directories(true)
                .fallback(ServeFile::new(index)),
        );
    } else {
        warn!("web root {} does not exist", web_root.display());
    }

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::map_response(timeout_as_json))
        .layer(TraceLayer::new_for_http())
}

/// Give the bare 408 produced by the timeout layer the usual error body.
async fn timeout_as_json(resp: Response) -> Response {
    if resp.status() == StatusCode::REQUEST_TIMEOUT {
        return AppError::request_timeout().into_response();
    }
    resp
}
