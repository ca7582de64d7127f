//! Batch orchestrator implementation.
//!
//! Drives a batch from `Open` to a delivered archive or a reported failure:
//! - Take the batch out of the registry (atomic, exclusive)
//! - Pre-flight quota check on reported sizes
//! - Retrieval pool and archive builder run overlapped over a bounded channel
//! - Delivery, then removal of the staging area on every exit path

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{assign_entry_names, ArchiveBuilder, ArchiveSummary};
use crate::messenger::Messenger;
use crate::metrics;
use crate::registry::{Batch, ItemRef, RecordOutcome, TaskRegistry, UserId};
use crate::retrieval::{ByteBudget, PlannedItem, RetrievalPool, StagedPayload};
use crate::staging::StagingArea;

use super::config::BatchConfig;
use super::messages;
use super::types::{
    CancelOutcome, FailureCause, FinalizeError, FinalizeReport, OrchestratorStatus,
};

type InFlightMap = Mutex<HashMap<UserId, CancellationToken>>;

fn lock_in_flight(map: &InFlightMap) -> MutexGuard<'_, HashMap<UserId, CancellationToken>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the finalizing batch from the registry when dropped.
struct FinalizeLease<'a> {
    registry: &'a dyn TaskRegistry,
    user: UserId,
    batch_id: Uuid,
}

impl Drop for FinalizeLease<'_> {
    fn drop(&mut self) {
        self.registry.finish_finalize(self.user, self.batch_id);
    }
}

/// Keeps the cancellation token of a running finalize reachable by `cancel`.
struct InFlightRegistration<'a> {
    map: &'a InFlightMap,
    user: UserId,
}

impl<'a> InFlightRegistration<'a> {
    fn register(map: &'a InFlightMap, user: UserId, token: CancellationToken) -> Self {
        lock_in_flight(map).insert(user, token);
        Self { map, user }
    }
}

impl Drop for InFlightRegistration<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.map).remove(&self.user);
    }
}

/// The batch orchestrator: owns the per-user batch lifecycle.
pub struct BatchOrchestrator {
    config: BatchConfig,
    registry: Arc<dyn TaskRegistry>,
    pool: RetrievalPool,
    messenger: Arc<dyn Messenger>,
    in_flight: InFlightMap,
}

impl BatchOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: BatchConfig,
        registry: Arc<dyn TaskRegistry>,
        pool: RetrievalPool,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config,
            registry,
            pool,
            messenger,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Starts a fresh batch, discarding any unfinalized open one.
    pub fn start_batch(&self, user: UserId) -> Batch {
        let batch = self.registry.start_batch(user);
        metrics::BATCHES_STARTED.inc();
        info!(user = %user, batch_id = %batch.id, "Batch started");
        batch
    }

    /// Records an attachment into the user's open batch. Never fails.
    pub fn record_item(&self, user: UserId, item: ItemRef) -> RecordOutcome {
        let message_id = item.message_id;
        let outcome = self.registry.record_item(user, item);
        let label = match outcome {
            RecordOutcome::Recorded { .. } => "recorded",
            RecordOutcome::Duplicate => "duplicate",
            RecordOutcome::NoOpenBatch => "no_open_batch",
        };
        metrics::ITEMS_RECORDED.with_label_values(&[label]).inc();
        debug!(user = %user, message_id, result = label, "Item submitted");
        outcome
    }

    /// Drops the user's open batch.
    ///
    /// With `cancel_during_finalize` enabled, a finalize in flight for the
    /// user is also told to stop.
    pub fn cancel(&self, user: UserId) -> CancelOutcome {
        let removed_open_batch = self.registry.cancel_batch(user);
        let signalled_finalize = self.config.cancel_during_finalize
            && match lock_in_flight(&self.in_flight).get(&user) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            };

        let outcome = CancelOutcome {
            removed_open_batch,
            signalled_finalize,
        };
        metrics::BATCHES_CANCELLED
            .with_label_values(&[outcome.metric_label()])
            .inc();
        info!(
            user = %user,
            removed_open_batch,
            signalled_finalize,
            "Cancel requested"
        );
        outcome
    }

    /// Snapshot of the user's current batch.
    pub fn batch(&self, user: UserId) -> Option<Batch> {
        self.registry.get(user)
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            registry: self.registry.stats(),
            retrieval: self.pool.status(),
            finalizes_in_flight: lock_in_flight(&self.in_flight).len(),
            quota_bytes: self.config.quota_bytes,
        }
    }

    /// Builds and delivers the user's archive.
    ///
    /// Exactly one status message is sent to the user, whatever the outcome.
    pub async fn finalize(&self, user: UserId) -> Result<FinalizeReport, FinalizeError> {
        let started = Instant::now();
        let result = self.run_finalize(user, started).await;

        let label = match &result {
            Ok(_) => "delivered",
            Err(e) => e.metric_label(),
        };
        metrics::FINALIZE_TOTAL.with_label_values(&[label]).inc();
        metrics::FINALIZE_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        let text = match &result {
            Ok(report) => {
                info!(
                    user = %user,
                    batch_id = %report.batch_id,
                    entries = report.entries,
                    bytes = report.total_bytes,
                    duration_ms = report.duration_ms,
                    "Archive delivered"
                );
                messages::done(report.entries)
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Finalize failed");
                e.user_message()
            }
        };

        if let Err(e) = self.messenger.notify(user, &text).await {
            warn!(user = %user, error = %e, "Failed to send status message");
        }

        result
    }

    async fn run_finalize(
        &self,
        user: UserId,
        started: Instant,
    ) -> Result<FinalizeReport, FinalizeError> {
        let batch = self
            .registry
            .take_for_finalize(user)
            .map_err(|e| FinalizeError::EmptyOrMissingBatch { reason: e.into() })?;

        // Declared before the registration so the registry slot is released last.
        let _lease = FinalizeLease {
            registry: self.registry.as_ref(),
            user,
            batch_id: batch.id,
        };
        let cancel = CancellationToken::new();
        let _registration = InFlightRegistration::register(&self.in_flight, user, cancel.clone());

        info!(
            user = %user,
            batch_id = %batch.id,
            items = batch.len(),
            "Finalizing batch"
        );

        // Outlives the pipeline so it is released asynchronously on every path.
        let mut staging = None;
        let pipeline = self.build_and_deliver(&batch, &mut staging, cancel.clone());
        let result = match self.config.finalize_timeout() {
            Some(limit) => tokio::time::timeout(limit, pipeline)
                .await
                .unwrap_or_else(|_| {
                    cancel.cancel();
                    Err(FinalizeError::pipeline(
                        FailureCause::Timeout,
                        format!("finalize exceeded {}s", limit.as_secs()),
                    ))
                }),
            None => pipeline.await,
        };
        if let Some(area) = staging.take() {
            area.release().await;
        }
        let summary = result?;

        Ok(FinalizeReport {
            batch_id: batch.id,
            user,
            entries: summary.entries,
            total_bytes: summary.payload_bytes,
            archive_name: self.config.archive_name.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn build_and_deliver(
        &self,
        batch: &Batch,
        staging: &mut Option<StagingArea>,
        cancel: CancellationToken,
    ) -> Result<ArchiveSummary, FinalizeError> {
        let user = batch.user;
        let metadata = self.pool.resolve_metadata(&batch.items).await?;

        let total_bytes = metadata
            .iter()
            .fold(0u64, |sum, m| sum.saturating_add(m.size_bytes));
        if total_bytes > self.config.quota_bytes {
            return Err(FinalizeError::QuotaExceeded {
                total_bytes,
                limit_bytes: self.config.quota_bytes,
            });
        }

        let names = assign_entry_names(batch.items.iter().zip(&metadata).map(|(item, meta)| {
            let name = meta.file_name.as_deref().or(item.file_name.as_deref());
            (item.message_id, name)
        }));
        let planned: Vec<PlannedItem> = batch
            .items
            .iter()
            .zip(&metadata)
            .zip(names)
            .map(|((item, meta), entry_name)| PlannedItem {
                item: item.clone(),
                size_bytes: meta.size_bytes,
                entry_name,
            })
            .collect();

        let area = StagingArea::acquire(&self.config.staging_root, user)
            .await
            .map_err(|e| FinalizeError::pipeline(FailureCause::Io, format!("staging: {}", e)))?;
        let area = staging.insert(area);

        self.assemble_and_deliver(user, planned, area, cancel).await
    }

    async fn assemble_and_deliver(
        &self,
        user: UserId,
        planned: Vec<PlannedItem>,
        staging: &StagingArea,
        cancel: CancellationToken,
    ) -> Result<ArchiveSummary, FinalizeError> {
        let expected = planned.len();
        let summary = self.assemble(planned, staging, cancel).await?;

        if summary.entries != expected {
            return Err(FinalizeError::pipeline(
                FailureCause::Io,
                format!("archive has {} entries, expected {}", summary.entries, expected),
            ));
        }
        metrics::ARCHIVE_ENTRIES.observe(summary.entries as f64);

        self.messenger
            .deliver_file(user, &summary.path, &self.config.archive_name)
            .await
            .map_err(|e| FinalizeError::pipeline(FailureCause::Delivery, e.to_string()))?;

        Ok(summary)
    }

    /// Runs retrieval and archive writing side by side.
    ///
    /// Payloads are appended as soon as they are staged and removed right
    /// after. The first error from either side ends both.
    async fn assemble(
        &self,
        planned: Vec<PlannedItem>,
        staging: &StagingArea,
        cancel: CancellationToken,
    ) -> Result<ArchiveSummary, FinalizeError> {
        let mut builder = ArchiveBuilder::create(
            staging.archive_path(&self.config.archive_name),
            self.config.compression,
        )
        .await?;

        let items_dir = staging.items_dir();
        let budget = Arc::new(ByteBudget::new(self.config.quota_bytes));
        let (tx, mut rx) = mpsc::channel::<StagedPayload>(self.pool.max_concurrency());

        let pool = &self.pool;
        let items_dir = &items_dir;
        let fetch_side = async move {
            let mut staged = std::pin::pin!(pool.fetch_all(planned, items_dir, cancel.clone(), budget));
            while let Some(result) = staged.next().await {
                let payload = match result {
                    Ok(payload) => payload,
                    Err(e) => {
                        cancel.cancel();
                        return Err(FinalizeError::from(e));
                    }
                };
                if tx.send(payload).await.is_err() {
                    // Archive side stopped; its error is reported instead.
                    break;
                }
            }
            Ok::<_, FinalizeError>(())
        };

        let archive_side = async {
            while let Some(payload) = rx.recv().await {
                builder.append(&payload.entry_name, &payload.path).await?;
                if let Err(e) = tokio::fs::remove_file(&payload.path).await {
                    debug!(path = %payload.path.display(), error = %e, "Failed to remove staged payload");
                }
            }
            Ok::<_, FinalizeError>(())
        };

        tokio::try_join!(fetch_side, archive_side)?;
        Ok(builder.finish().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::retrieval::RetrievalConfig;
    use crate::testing::{MockMessenger, MockOrigin};
    use tempfile::TempDir;

    struct Harness {
        orchestrator: BatchOrchestrator,
        origin: Arc<MockOrigin>,
        messenger: Arc<MockMessenger>,
        staging: TempDir,
    }

    fn harness(config: BatchConfig) -> Harness {
        let staging = TempDir::new().unwrap();
        let origin = Arc::new(MockOrigin::new());
        let messenger = Arc::new(MockMessenger::new());
        let pool = RetrievalPool::new(RetrievalConfig::default(), origin.clone());
        let orchestrator = BatchOrchestrator::new(
            config.with_staging_root(staging.path().to_path_buf()),
            Arc::new(InMemoryRegistry::new()),
            pool,
            messenger.clone(),
        );
        Harness {
            orchestrator,
            origin,
            messenger,
            staging,
        }
    }

    #[tokio::test]
    async fn test_finalize_delivers_archive() {
        let h = harness(BatchConfig::default());
        let user = UserId(1);
        h.origin.add_item(10, Some("a.txt"), b"alpha".to_vec()).await;
        h.origin.add_item(11, Some("b.txt"), b"beta".to_vec()).await;

        h.orchestrator.start_batch(user);
        h.orchestrator.record_item(user, ItemRef::new(10));
        h.orchestrator.record_item(user, ItemRef::new(11));

        let report = h.orchestrator.finalize(user).await.unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.total_bytes, 9);
        assert_eq!(report.archive_name, "files.zip");

        let deliveries = h.messenger.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].entry_names, vec!["a.txt", "b.txt"]);

        assert_eq!(h.messenger.notifications_for(user).await, vec!["Done! 2 files archived."]);
        assert!(h.orchestrator.batch(user).is_none());
        assert!(!h.staging.path().join("user-1").exists());
    }

    #[tokio::test]
    async fn test_finalize_without_batch() {
        let h = harness(BatchConfig::default());
        let result = h.orchestrator.finalize(UserId(5)).await;

        assert!(matches!(
            result,
            Err(FinalizeError::EmptyOrMissingBatch {
                reason: crate::orchestrator::MissingBatchReason::NotStarted
            })
        ));
        assert_eq!(
            h.messenger.notifications_for(UserId(5)).await,
            vec![messages::START_FIRST]
        );
    }

    #[tokio::test]
    async fn test_record_outcomes() {
        let h = harness(BatchConfig::default());
        let user = UserId(2);

        assert_eq!(
            h.orchestrator.record_item(user, ItemRef::new(1)),
            RecordOutcome::NoOpenBatch
        );
        h.orchestrator.start_batch(user);
        assert_eq!(
            h.orchestrator.record_item(user, ItemRef::new(1)),
            RecordOutcome::Recorded { position: 1 }
        );
        assert_eq!(
            h.orchestrator.record_item(user, ItemRef::new(1)),
            RecordOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_cancel_open_batch() {
        let h = harness(BatchConfig::default());
        let user = UserId(3);
        h.orchestrator.start_batch(user);

        let outcome = h.orchestrator.cancel(user);
        assert!(outcome.removed_open_batch);
        assert!(!outcome.signalled_finalize);
        assert!(h.orchestrator.cancel(user).is_noop());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_pipeline_failure() {
        let h = harness(BatchConfig::default());
        let user = UserId(4);
        h.origin.add_sized_item(1, 100).await;
        h.messenger.fail_deliveries(true).await;

        h.orchestrator.start_batch(user);
        h.orchestrator.record_item(user, ItemRef::new(1));

        let result = h.orchestrator.finalize(user).await;
        assert!(matches!(
            result,
            Err(FinalizeError::PipelineFailure {
                cause: FailureCause::Delivery,
                ..
            })
        ));
        assert_eq!(h.messenger.notifications_for(user).await, vec![messages::FAILED]);
        assert!(!h.staging.path().join("user-4").exists());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let h = harness(BatchConfig::default().with_quota_bytes(1234));
        h.orchestrator.start_batch(UserId(1));
        h.orchestrator.record_item(UserId(1), ItemRef::new(1));

        let status = h.orchestrator.status();
        assert_eq!(status.registry.open_batches, 1);
        assert_eq!(status.registry.open_items, 1);
        assert_eq!(status.finalizes_in_flight, 0);
        assert_eq!(status.quota_bytes, 1234);
        assert_eq!(status.retrieval.max_concurrent, 3);
    }
}
