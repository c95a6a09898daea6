//! Cleanup reconciler and the age-based sweep of abandoned sessions.

mod common;

use chunkdrive::blob::MemoryBlobStore;
use common::{CHUNK, TestDrive, payload};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let drive = TestDrive::new().await;
    let data = payload(12);
    for index in 0..3 {
        drive.stage("twice", &data, index).await;
    }

    let first = drive.service.cleanup_upload("twice").await.unwrap();
    assert_eq!(first.cleared_count, 3);
    assert_eq!(first.remote_deleted, 3);

    let second = drive.service.cleanup_upload("twice").await.unwrap();
    assert_eq!(second.upload_id, "twice");
    assert_eq!(second.cleared_count, 0);
    assert_eq!(second.remote_deleted, 0);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn test_remote_delete_failures_are_collected_not_fatal() {
    let drive = TestDrive::new().await;
    let data = payload(10);
    drive.stage("stuck", &data, 0).await;
    drive.stage("stuck", &data, 1).await;
    drive.blobs.fail_deletes(true);

    let report = drive.service.cleanup_upload("stuck").await.unwrap();
    assert_eq!(report.cleared_count, 2);
    assert_eq!(report.remote_deleted, 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("chunk 0:"));
    assert_eq!(drive.temp_chunk_count().await, 0);
    // Orphaned objects stay on the backend.
    assert_eq!(drive.blobs.object_count(), 2);
}

#[tokio::test]
async fn test_backend_without_delete_still_clears_rows() {
    let drive = TestDrive::with_limits(CHUNK, 100, MemoryBlobStore::new(CHUNK).without_delete()).await;
    let data = payload(10);
    drive.stage("append-only", &data, 0).await;
    drive.stage("append-only", &data, 1).await;

    let report = drive.service.cleanup_upload("append-only").await.unwrap();
    assert_eq!(report.cleared_count, 2);
    assert_eq!(report.remote_deleted, 0);
    assert!(report.errors.is_empty());
    assert_eq!(drive.blobs.delete_calls(), 0);
    assert_eq!(drive.temp_chunk_count().await, 0);
}

#[tokio::test]
async fn test_sweep_only_touches_stale_sessions() {
    let drive = TestDrive::new().await;
    let data = payload(10);
    drive.stage("old", &data, 0).await;
    drive.stage("old", &data, 1).await;
    drive.stage("fresh", &data, 0).await;
    drive.age_session("old", 48).await;

    let report = drive.service.sweep_stale_uploads(DAY).await.unwrap();
    assert_eq!(report.sessions, 1);
    assert_eq!(report.cleared_count, 2);
    assert!(report.errors.is_empty());

    let fresh = drive.service.upload_status("fresh").await.unwrap();
    assert_eq!(fresh.received_chunks, vec![0]);
    assert_eq!(drive.blobs.object_count(), 1);

    let again = drive.service.sweep_stale_uploads(DAY).await.unwrap();
    assert_eq!(again.sessions, 0);
}

#[tokio::test]
async fn test_session_with_a_recent_chunk_is_not_stale() {
    let drive = TestDrive::new().await;
    let data = payload(10);
    drive.stage("resumed", &data, 0).await;
    drive.age_session("resumed", 48).await;
    drive.stage("resumed", &data, 1).await;

    let report = drive.service.sweep_stale_uploads(DAY).await.unwrap();
    assert_eq!(report.sessions, 0);
    assert_eq!(drive.temp_chunk_count().await, 2);
}

#[tokio::test]
async fn test_periodic_sweeper_runs_until_cancelled() {
    let drive = TestDrive::new().await;
    let data = payload(10);
    drive.stage("abandoned", &data, 0).await;
    drive.age_session("abandoned", 48).await;

    let cancel = CancellationToken::new();
    let handle = drive
        .service
        .spawn_sweeper(Duration::from_millis(20), DAY, cancel.clone());

    let mut remaining = drive.temp_chunk_count().await;
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        remaining = drive.temp_chunk_count().await;
    }
    assert_eq!(remaining, 0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}
