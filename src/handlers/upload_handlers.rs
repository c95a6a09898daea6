//! HTTP handlers for resumable uploads.
//!
//! A client slices the file itself, posts each chunk under a shared
//! `upload_id`, then asks for a merge. Chunks may arrive in any order and may
//! be re-sent.

use crate::{
    errors::AppError,
    models::{chunk::UploadStatus, file::File},
    services::{ChunkUpload, MergeRequest, StorageService, cleanup::CleanupReport},
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Body of `POST /api/uploads/{upload_id}/merge`.
#[derive(Debug, Deserialize)]
pub struct MergeReq {
    pub name: String,
    pub size: u64,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub folder_id: Option<Uuid>,
    pub total_chunks: u64,
}

fn default_mime_type() -> String {
    "application/octet-stream".into()
}

/// Acknowledgement for one staged chunk.
#[derive(Debug, Serialize)]
pub struct ChunkAck {
    pub upload_id: String,
    pub chunk_index: i64,
    pub size: i64,
}

/// Multipart fields of a chunk upload, collected in whatever order they arrive.
#[derive(Default)]
struct ChunkForm {
    chunk: Option<Bytes>,
    chunk_index: Option<u64>,
    total_chunks: Option<u64>,
    original_name: Option<String>,
    original_size: Option<u64>,
    folder_id: Option<Uuid>,
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid value for `{}`", name)))
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::bad_request(format!("multipart field `{}` is required", name)))
}

async fn read_chunk_form(mut multipart: Multipart) -> Result<ChunkForm, AppError> {
    let mut form = ChunkForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "chunk" {
            form.chunk = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(e.body_text()))?,
            );
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        match name.as_str() {
            "chunk_index" => form.chunk_index = Some(parse_field(&name, &text)?),
            "total_chunks" => form.total_chunks = Some(parse_field(&name, &text)?),
            "original_name" => form.original_name = Some(text),
            "original_size" => form.original_size = Some(parse_field(&name, &text)?),
            "folder_id" if !text.trim().is_empty() => {
                form.folder_id = Some(parse_field(&name, &text)?)
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST `/api/uploads/{upload_id}/chunks`
pub async fn upload_chunk(
    State(service): State<StorageService>,
    Path(upload_id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_chunk_form(multipart).await?;
    let chunk = ChunkUpload {
        upload_id,
        chunk_index: required(form.chunk_index, "chunk_index")?,
        total_chunks: required(form.total_chunks, "total_chunks")?,
        original_name: required(form.original_name, "original_name")?,
        original_size: required(form.original_size, "original_size")?,
        folder_id: form.folder_id,
        data: required(form.chunk, "chunk")?,
    };

    let staged = service.upload_chunk(chunk).await?;
    Ok((
        StatusCode::CREATED,
        Json(ChunkAck {
            upload_id: staged.upload_id,
            chunk_index: staged.chunk_index,
            size: staged.size,
        }),
    ))
}

/// GET `/api/uploads/{upload_id}`: which chunks are staged so far.
pub async fn upload_status(
    State(service): State<StorageService>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadStatus>, AppError> {
    Ok(Json(service.upload_status(&upload_id).await?))
}

/// POST `/api/uploads/{upload_id}/merge`
pub async fn merge_upload(
    State(service): State<StorageService>,
    Path(upload_id): Path<String>,
    Json(req): Json<MergeReq>,
) -> Result<impl IntoResponse, AppError> {
    let file: File = service
        .merge_chunks(MergeRequest {
            upload_id,
            name: req.name,
            size: req.size,
            mime_type: req.mime_type,
            folder_id: req.folder_id,
            total_chunks: req.total_chunks,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// DELETE `/api/uploads/{upload_id}`: abandon the session.
pub async fn cancel_upload(
    State(service): State<StorageService>,
    Path(upload_id): Path<String>,
) -> Result<Json<CleanupReport>, AppError> {
    Ok(Json(service.cleanup_upload(&upload_id).await?))
}
