//! Single-shot uploads: planning, commit, and rollback on backend failure.

mod common;

use bytes::Bytes;
use chunkdrive::{blob::BlobError, services::StorageError};
use common::{TestDrive, payload};

#[tokio::test]
async fn test_upload_round_trips_bytes() {
    let drive = TestDrive::new().await;
    let data = payload(23);
    let file = drive.upload("notes.txt", &data).await;

    assert_eq!(file.size, 23);
    assert_eq!(file.name, "notes.txt");
    assert_eq!(file.mime_type, "text/plain");
    assert_eq!(file.folder_id, None);

    let downloaded = drive.service.download_file(file.id).await.unwrap();
    assert_eq!(downloaded.data.as_ref(), data.as_slice());
    assert_eq!(downloaded.file, file);
}

#[tokio::test]
async fn test_upload_splits_at_chunk_boundaries() {
    let drive = TestDrive::new().await;
    let file = drive.upload("twelve.bin", &payload(12)).await;

    let chunks = drive
        .service
        .metadata
        .list_file_chunks(file.id)
        .await
        .unwrap();
    let layout: Vec<(i64, i64)> = chunks.iter().map(|c| (c.chunk_index, c.size)).collect();
    assert_eq!(layout, vec![(0, 5), (1, 5), (2, 2)]);
    assert_eq!(drive.blobs.object_count(), 3);
}

#[tokio::test]
async fn test_exact_multiple_has_no_trailing_empty_chunk() {
    let drive = TestDrive::new().await;
    let file = drive.upload("ten.bin", &payload(10)).await;
    let chunks = drive
        .service
        .metadata
        .list_file_chunks(file.id)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.size == 5));
}

#[tokio::test]
async fn test_empty_file_is_one_empty_chunk() {
    let drive = TestDrive::new().await;
    let file = drive.upload("empty.txt", b"").await;

    assert_eq!(file.size, 0);
    assert_eq!(drive.file_chunk_count().await, 1);

    let downloaded = drive.service.download_file(file.id).await.unwrap();
    assert!(downloaded.data.is_empty());
}

#[tokio::test]
async fn test_oversized_file_is_rejected_before_any_upload() {
    let drive = TestDrive::new().await;
    let err = drive
        .service
        .upload_whole_file(Bytes::from(payload(101)), "big.bin", "text/plain", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StorageError::SizeLimitExceeded {
            size: 101,
            limit: 100
        }
    ));
    assert_eq!(drive.blobs.object_count(), 0);
    assert_eq!(drive.file_count().await, 0);
}

#[tokio::test]
async fn test_chunk_failure_leaves_no_metadata_and_discards_objects() {
    let drive = TestDrive::new().await;
    drive.blobs.fail_put_from(2);

    let err = drive
        .service
        .upload_whole_file(Bytes::from(payload(12)), "flaky.bin", "text/plain", None)
        .await
        .unwrap_err();

    match err {
        StorageError::ChunkUploadFailed { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(source, BlobError::RemoteUnavailable(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(drive.file_count().await, 0);
    assert_eq!(drive.file_chunk_count().await, 0);
    assert_eq!(drive.blobs.object_count(), 0);
    assert_eq!(drive.blobs.delete_calls(), 2);
}

#[tokio::test]
async fn test_upload_into_missing_folder_fails_cleanly() {
    let drive = TestDrive::new().await;
    let missing = uuid::Uuid::new_v4();
    let err = drive
        .service
        .upload_whole_file(Bytes::from_static(b"abc"), "a.txt", "text/plain", Some(missing))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::FolderNotFound(id) if id == missing));
    assert_eq!(drive.blobs.object_count(), 0);
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let drive = TestDrive::new().await;
    for name in ["", "a/b.txt", ".."] {
        let err = drive
            .service
            .upload_whole_file(Bytes::from_static(b"abc"), name, "text/plain", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)), "{name:?}");
    }
    assert_eq!(drive.blobs.object_count(), 0);
}
