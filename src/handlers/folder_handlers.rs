//! HTTP handlers for the folder tree.

use crate::{
    errors::AppError,
    models::folder::{Folder, FolderListing},
    services::StorageService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RenameFolderReq {
    pub name: String,
}

/// POST `/api/folders`
pub async fn create_folder(
    State(service): State<StorageService>,
    Json(req): Json<CreateFolderReq>,
) -> Result<impl IntoResponse, AppError> {
    let folder = service.create_folder(&req.name, req.parent_id).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// GET `/api/folders/root`: top-level folders and files.
pub async fn list_root(
    State(service): State<StorageService>,
) -> Result<Json<FolderListing>, AppError> {
    Ok(Json(service.list_folder(None).await?))
}

/// GET `/api/folders/{id}`: the folder and its direct children.
pub async fn list_folder(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
) -> Result<Json<FolderListing>, AppError> {
    Ok(Json(service.list_folder(Some(id)).await?))
}

/// PATCH `/api/folders/{id}`
pub async fn rename_folder(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameFolderReq>,
) -> Result<Json<Folder>, AppError> {
    Ok(Json(service.rename_folder(id, &req.name).await?))
}

/// DELETE `/api/folders/{id}`: removes the whole subtree.
pub async fn delete_folder(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_folder(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
