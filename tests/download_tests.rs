//! Reassembly: ordering, integrity checks, and streaming.

mod common;

use bytes::Bytes;
use chunkdrive::{
    blob::BlobStore,
    models::{chunk::StoredChunk, file::NewFile},
    services::StorageError,
};
use common::{TestDrive, payload};
use futures::StreamExt;

fn new_file(size: i64) -> NewFile {
    NewFile {
        name: "manual.bin".into(),
        folder_id: None,
        size,
        mime_type: "application/octet-stream".into(),
    }
}

#[tokio::test]
async fn test_chunks_are_joined_by_index_not_insertion_order() {
    let drive = TestDrive::new().await;
    let first = drive.blobs.put(Bytes::from_static(b"hello"), "p0").await.unwrap();
    let second = drive.blobs.put(Bytes::from_static(b" wrld"), "p1").await.unwrap();

    let file = drive
        .service
        .metadata
        .insert_file_with_chunks(
            &new_file(10),
            &[
                StoredChunk {
                    index: 1,
                    handle: second,
                    size: 5,
                },
                StoredChunk {
                    index: 0,
                    handle: first,
                    size: 5,
                },
            ],
        )
        .await
        .unwrap();

    let downloaded = drive.service.download_file(file.id).await.unwrap();
    assert_eq!(downloaded.data.as_ref(), b"hello wrld");
}

#[tokio::test]
async fn test_file_without_chunks_is_reported() {
    let drive = TestDrive::new().await;
    let file = drive
        .service
        .metadata
        .insert_file_with_chunks(&new_file(4), &[])
        .await
        .unwrap();

    let err = drive.service.download_file(file.id).await.unwrap_err();
    assert!(matches!(err, StorageError::MissingChunks { file_id } if file_id == file.id));
    assert!(matches!(
        drive.service.stream_file(file.id).await,
        Err(StorageError::MissingChunks { .. })
    ));
}

#[tokio::test]
async fn test_size_disagreement_is_corruption() {
    let drive = TestDrive::new().await;
    let handle = drive.blobs.put(Bytes::from_static(b"abcde"), "p0").await.unwrap();
    let file = drive
        .service
        .metadata
        .insert_file_with_chunks(
            &new_file(10),
            &[StoredChunk {
                index: 0,
                handle,
                size: 5,
            }],
        )
        .await
        .unwrap();

    let err = drive.service.download_file(file.id).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::CorruptFile {
            expected: 10,
            actual: 5,
            ..
        }
    ));

    let (_, mut stream) = drive.service.stream_file(file.id).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"abcde");
    assert!(matches!(
        stream.next().await,
        Some(Err(StorageError::CorruptFile { .. }))
    ));
}

#[tokio::test]
async fn test_unknown_file_is_not_found() {
    let drive = TestDrive::new().await;
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        drive.service.download_file(id).await,
        Err(StorageError::FileNotFound(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_backend_failure_surfaces_on_download() {
    let drive = TestDrive::new().await;
    let file = drive.upload("a.bin", &payload(7)).await;
    drive.blobs.fail_gets(true);

    let err = drive.service.download_file(file.id).await.unwrap_err();
    assert!(matches!(err, StorageError::Blob(_)));
}

#[tokio::test]
async fn test_stream_yields_one_item_per_chunk() {
    let drive = TestDrive::new().await;
    let data = payload(12);
    let file = drive.upload("streamed.bin", &data).await;

    let (meta, stream) = drive.service.stream_file(file.id).await.unwrap();
    assert_eq!(meta.id, file.id);
    let parts: Vec<Bytes> = stream.map(|part| part.unwrap()).collect().await;
    assert_eq!(parts.iter().map(Bytes::len).collect::<Vec<_>>(), vec![5, 5, 2]);
    assert_eq!(parts.concat(), data);
}
