//! Defines routes for the drive API.
//!
//! ## Structure
//! - **Folders**
//!   - `POST   /api/folders` -> create folder
//!   - `GET    /api/folders/root` -> list the root
//!   - `GET    /api/folders/{id}` -> list a folder
//!   - `PATCH  /api/folders/{id}` -> rename folder
//!   - `DELETE /api/folders/{id}` -> delete folder subtree
//!
//! - **Files**
//!   - `POST   /api/files` -> single-shot multipart upload
//!   - `GET    /api/files` -> paginated listing
//!   - `GET    /api/files/{id}` -> metadata
//!   - `PATCH  /api/files/{id}` -> rename / move
//!   - `DELETE /api/files/{id}` -> delete file
//!   - `GET    /api/files/{id}/download` -> streamed content
//!
//! - **Resumable uploads**
//!   - `POST   /api/uploads/{upload_id}/chunks` -> stage one chunk
//!   - `GET    /api/uploads/{upload_id}` -> staging status
//!   - `POST   /api/uploads/{upload_id}/merge` -> commit staged chunks
//!   - `DELETE /api/uploads/{upload_id}` -> abandon session

use crate::{
    handlers::{
        file_handlers::{delete_file, download_file, get_file, list_files, update_file, upload_file},
        folder_handlers::{create_folder, delete_folder, list_folder, list_root, rename_folder},
        health_handlers::{healthz, readyz},
        upload_handlers::{cancel_upload, merge_upload, upload_chunk, upload_status},
    },
    services::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Headroom for multipart boundaries and text fields around the file bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build and return the router for all drive routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Folders
        .route("/api/folders", post(create_folder))
        .route("/api/folders/root", get(list_root))
        .route(
            "/api/folders/{id}",
            get(list_folder).patch(rename_folder).delete(delete_folder),
        )
        // Files
        .route("/api/files", post(upload_file).get(list_files))
        .route(
            "/api/files/{id}",
            get(get_file).patch(update_file).delete(delete_file),
        )
        .route("/api/files/{id}/download", get(download_file))
        // Resumable uploads
        .route("/api/uploads/{upload_id}/chunks", post(upload_chunk))
        .route("/api/uploads/{upload_id}/merge", post(merge_upload))
        .route(
            "/api/uploads/{upload_id}",
            get(upload_status).delete(cancel_upload),
        )
}

/// Router with state attached and the request body limit raised to fit the
/// largest accepted file.
pub fn app(service: StorageService) -> Router {
    let body_limit = usize::try_from(service.limits.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}
