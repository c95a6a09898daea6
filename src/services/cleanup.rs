//! Reclaims staged chunks of abandoned or failed upload sessions.
//!
//! Remote deletes are best-effort: their failures are collected into the
//! report and never stop the staging rows from being removed.

use super::{error::StorageResult, metadata_store::MetadataStore};
use crate::blob::{BlobStore, DeleteOutcome, delete_best_effort};
use chrono::Utc;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of cleaning one upload session.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub upload_id: String,
    /// Staging rows removed.
    pub cleared_count: u64,
    /// Remote objects the backend confirmed deleted.
    pub remote_deleted: u64,
    /// Remote delete failures, one entry per chunk.
    pub errors: Vec<String>,
}

/// Outcome of an age-based sweep over all sessions.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub sessions: u64,
    pub cleared_count: u64,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct CleanupReconciler {
    metadata: MetadataStore,
    blobs: Arc<dyn BlobStore>,
}

impl CleanupReconciler {
    pub fn new(metadata: MetadataStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    /// Delete every staged chunk of `upload_id`, remote objects first.
    ///
    /// Idempotent: a session with nothing staged reports zero cleared chunks.
    pub async fn reconcile(&self, upload_id: &str) -> StorageResult<CleanupReport> {
        let staged = self.metadata.list_temp_chunks(upload_id).await?;
        let mut report = CleanupReport {
            upload_id: upload_id.to_string(),
            ..Default::default()
        };
        if staged.is_empty() {
            return Ok(report);
        }

        for chunk in &staged {
            match delete_best_effort(self.blobs.as_ref(), &chunk.telegram_file_id).await {
                DeleteOutcome::Deleted => report.remote_deleted += 1,
                DeleteOutcome::Skipped => {}
                DeleteOutcome::Failed(reason) => report
                    .errors
                    .push(format!("chunk {}: {}", chunk.chunk_index, reason)),
            }
        }

        report.cleared_count = self.metadata.delete_temp_chunks(upload_id).await?;
        info!(
            upload_id,
            cleared = report.cleared_count,
            remote_deleted = report.remote_deleted,
            remote_errors = report.errors.len(),
            "upload session cleaned up"
        );
        Ok(report)
    }

    /// Reconcile every session whose newest staged chunk is older than `max_age`.
    pub async fn sweep_older_than(&self, max_age: Duration) -> StorageResult<SweepReport> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let stale = self.metadata.stale_upload_ids(cutoff).await?;

        let mut report = SweepReport::default();
        for upload_id in stale {
            match self.reconcile(&upload_id).await {
                Ok(session) => {
                    report.sessions += 1;
                    report.cleared_count += session.cleared_count;
                    report.errors.extend(
                        session
                            .errors
                            .into_iter()
                            .map(|e| format!("{upload_id}: {e}")),
                    );
                }
                Err(err) => {
                    warn!(%upload_id, error = %err, "failed to reclaim stale upload session");
                    report.errors.push(format!("{upload_id}: {err}"));
                }
            }
        }

        if report.sessions > 0 {
            info!(
                sessions = report.sessions,
                cleared = report.cleared_count,
                "swept stale upload sessions"
            );
        }
        Ok(report)
    }
}

/// Run [`CleanupReconciler::sweep_older_than`] every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after start.
pub fn spawn_periodic_sweep(
    reconciler: CleanupReconciler,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = reconciler.sweep_older_than(max_age).await {
                        warn!(error = %err, "stale upload sweep failed");
                    }
                }
            }
        }
        info!("stale upload sweeper stopped");
    })
}
