use crate::{blob::BlobError, services::StorageError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

fn blob_status(err: &BlobError) -> StatusCode {
    match err {
        BlobError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BlobError::ObjectTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        BlobError::RemoteRejected(_) | BlobError::NotFound | BlobError::DeleteUnsupported => {
            StatusCode::BAD_GATEWAY
        }
        BlobError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match err.root() {
            StorageError::SizeLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StorageError::ChunkUploadFailed { source, .. } => blob_status(source),
            StorageError::Blob(source) => blob_status(source),
            StorageError::IncompleteUpload { .. } | StorageError::SizeMismatch { .. } => {
                StatusCode::CONFLICT
            }
            StorageError::InvalidChunk(_)
            | StorageError::InvalidName(_)
            | StorageError::InvalidContinuationToken => StatusCode::BAD_REQUEST,
            StorageError::FileNotFound(_) | StorageError::FolderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StorageError::MissingChunks { .. } | StorageError::CorruptFile { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            StorageError::Sqlx(_) | StorageError::MergeFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        // Database errors carry SQL details; clients get a generic message.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return AppError::internal("internal storage error");
        }
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn database_errors_hide_their_details() {
        let err = AppError::from(StorageError::Sqlx(sqlx::Error::RowNotFound));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal storage error");
    }

    #[test]
    fn storage_errors_map_to_status_codes() {
        let cases = [
            (
                StorageError::SizeLimitExceeded { size: 2, limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                StorageError::FileNotFound(Uuid::nil()),
                StatusCode::NOT_FOUND,
            ),
            (
                StorageError::ChunkUploadFailed {
                    index: 1,
                    source: BlobError::RemoteUnavailable("down".into()),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StorageError::MergeFailed {
                    upload_id: "u".into(),
                    source: Box::new(StorageError::IncompleteUpload {
                        upload_id: "u".into(),
                        expected: 2,
                        actual: 1,
                    }),
                },
                StatusCode::CONFLICT,
            ),
            (
                StorageError::CorruptFile {
                    file_id: Uuid::nil(),
                    expected: 2,
                    actual: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
