//! HTTP handlers for committed files.
//! Downloads stream chunk by chunk; all storage concerns are delegated to
//! `StorageService`.

use crate::{
    errors::AppError,
    models::file::{File, FilePage},
    services::{StorageService, storage_service::DEFAULT_PAGE_SIZE},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::TryStreamExt;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub folder_id: Option<Uuid>,
}

/// Query params accepted by `GET /api/files`.
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub folder_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub continuation_token: Option<String>,
}

/// Body of `PATCH /api/files/{id}`.
///
/// `folder_id: null` moves the file to the root; an absent key leaves it where it is.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateFileReq {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub folder_id: Option<Option<Uuid>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

/// POST `/api/files?folder_id=`: single-shot upload of multipart field `file`.
pub async fn upload_file(
    State(service): State<StorageService>,
    Query(q): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload: Option<(String, String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.bin").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        upload = Some((name, mime_type, data));
        break;
    }

    let (name, mime_type, data) =
        upload.ok_or_else(|| AppError::bad_request("multipart field `file` is required"))?;
    let file = service
        .upload_whole_file(data, &name, &mime_type, q.folder_id)
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// GET `/api/files`: one page of a folder's files, ordered by name.
pub async fn list_files(
    State(service): State<StorageService>,
    Query(q): Query<ListFilesQuery>,
) -> Result<Json<FilePage>, AppError> {
    let page = service
        .list_files(
            q.folder_id,
            q.continuation_token.as_deref(),
            q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

/// GET `/api/files/{id}`: metadata only.
pub async fn get_file(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
) -> Result<Json<File>, AppError> {
    Ok(Json(service.get_file(id).await?))
}

/// PATCH `/api/files/{id}`: rename and/or move.
pub async fn update_file(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFileReq>,
) -> Result<Json<File>, AppError> {
    let mut file = None;
    if let Some(folder_id) = req.folder_id {
        file = Some(service.move_file(id, folder_id).await?);
    }
    if let Some(name) = req.name.as_deref() {
        file = Some(service.rename_file(id, name).await?);
    }
    match file {
        Some(file) => Ok(Json(file)),
        None => Ok(Json(service.get_file(id).await?)),
    }
}

/// DELETE `/api/files/{id}`
pub async fn delete_file(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_file(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/files/{id}/download`: reassembled content as a streaming response.
pub async fn download_file(
    State(service): State<StorageService>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (file, chunks) = service.stream_file(id).await?;
    let file_id = file.id;
    let stream = chunks.inspect_err(move |err| {
        tracing::error!(%file_id, error = %err, "download aborted mid-stream");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &file);
    Ok(response)
}

fn set_file_headers(headers: &mut HeaderMap, file: &File) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size.max(0)));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&file.name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_escapes_quotes_and_unicode() {
        let value = content_disposition("rapport \"final\" é.pdf");
        assert_eq!(
            value,
            "attachment; filename=\"rapport _final_ _.pdf\"; \
             filename*=UTF-8''rapport%20%22final%22%20%C3%A9.pdf"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn patch_body_distinguishes_null_from_absent() {
        let absent: UpdateFileReq = serde_json::from_str(r#"{"name":"a"}"#).unwrap();
        assert_eq!(absent.folder_id, None);

        let root: UpdateFileReq = serde_json::from_str(r#"{"folder_id":null}"#).unwrap();
        assert_eq!(root.folder_id, Some(None));
    }
}
