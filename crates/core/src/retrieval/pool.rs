//! Bounded-concurrency retrieval of item payloads.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, Stream, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics;
use crate::origin::{ItemMetadata, Origin};
use crate::registry::ItemRef;

use super::config::RetrievalConfig;
use super::types::{ByteBudget, PlannedItem, PoolStatus, RetrievalError, StagedPayload};

/// Tracks statistics for the pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    peak: AtomicU64,
    total_fetched: AtomicU64,
    total_failed: AtomicU64,
    bytes_fetched: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: "retrieval".to_string(),
            active_fetches: self.active.load(Ordering::Relaxed) as usize,
            peak_fetches: self.peak.load(Ordering::Relaxed) as usize,
            max_concurrent,
            total_fetched: self.total_fetched.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }
}

/// Counts one fetch as in flight until dropped.
struct InFlight<'a> {
    stats: &'a PoolStats,
}

impl<'a> InFlight<'a> {
    fn enter(stats: &'a PoolStats) -> Self {
        let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(now, Ordering::SeqCst);
        metrics::FETCHES_IN_FLIGHT.inc();
        Self { stats }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        metrics::FETCHES_IN_FLIGHT.dec();
    }
}

/// Fetches item payloads from the origin with a hard cap on in-flight requests.
///
/// The pool never retries. Callers stop polling the stream returned by
/// [`RetrievalPool::fetch_all`] on the first error, which drops every fetch
/// still in flight.
pub struct RetrievalPool {
    config: RetrievalConfig,
    origin: Arc<dyn Origin>,
    stats: PoolStats,
}

impl RetrievalPool {
    pub fn new(config: RetrievalConfig, origin: Arc<dyn Origin>) -> Self {
        Self {
            config,
            origin,
            stats: PoolStats::default(),
        }
    }

    /// Effective concurrency cap (never below one).
    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrent_fetches.max(1)
    }

    pub fn status(&self) -> PoolStatus {
        self.stats.to_status(self.max_concurrency())
    }

    /// Looks up metadata for every item, in submission order.
    ///
    /// Lookups share the fetch concurrency cap; the first failure wins.
    pub async fn resolve_metadata(
        &self,
        items: &[ItemRef],
    ) -> Result<Vec<ItemMetadata>, RetrievalError> {
        stream::iter(items.iter().cloned())
            .map(|item| async move {
                self.origin
                    .metadata(&item)
                    .await
                    .map_err(|source| RetrievalError::Metadata {
                        message_id: item.message_id,
                        source,
                    })
            })
            .buffered(self.max_concurrency())
            .try_collect()
            .await
    }

    /// Downloads every planned item into `dir`.
    ///
    /// Yields one result per item in completion order. At most
    /// [`max_concurrency`](Self::max_concurrency) fetches run at once and the
    /// next pending item starts as soon as a slot frees. Once `cancel` fires no
    /// new fetch reaches the origin.
    pub fn fetch_all<'a>(
        &'a self,
        items: Vec<PlannedItem>,
        dir: &'a Path,
        cancel: CancellationToken,
        budget: Arc<ByteBudget>,
    ) -> impl Stream<Item = Result<StagedPayload, RetrievalError>> + Send + 'a {
        stream::iter(items)
            .map(move |planned| self.fetch_one(planned, dir, cancel.clone(), Arc::clone(&budget)))
            .buffer_unordered(self.max_concurrency())
    }

    async fn fetch_one(
        &self,
        planned: PlannedItem,
        dir: &Path,
        cancel: CancellationToken,
        budget: Arc<ByteBudget>,
    ) -> Result<StagedPayload, RetrievalError> {
        if cancel.is_cancelled() {
            metrics::FETCHES_TOTAL.with_label_values(&["cancelled"]).inc();
            return Err(RetrievalError::Cancelled);
        }

        let _in_flight = InFlight::enter(&self.stats);
        let message_id = planned.item.message_id;
        let secs = self.config.fetch_timeout_secs;
        let path = dir.join(format!("{}.part", message_id));

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
            outcome = tokio::time::timeout(
                Duration::from_secs(secs),
                self.download(&planned, &path, &budget),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::Timeout { message_id, secs }),
            },
        };

        match &result {
            Ok(staged) => {
                self.stats.total_fetched.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_fetched
                    .fetch_add(staged.size_bytes, Ordering::Relaxed);
                metrics::FETCHES_TOTAL.with_label_values(&["success"]).inc();
                metrics::BYTES_FETCHED.inc_by(staged.size_bytes);
            }
            Err(e) => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                metrics::FETCHES_TOTAL
                    .with_label_values(&[e.metric_label()])
                    .inc();
                debug!(message_id, error = %e, "Fetch failed");
            }
        }

        result
    }

    async fn download(
        &self,
        planned: &PlannedItem,
        path: &Path,
        budget: &ByteBudget,
    ) -> Result<StagedPayload, RetrievalError> {
        let message_id = planned.item.message_id;
        let write_error = |source| RetrievalError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut body = self
            .origin
            .fetch(&planned.item)
            .await
            .map_err(|source| RetrievalError::Fetch { message_id, source })?;

        let file = File::create(path).await.map_err(write_error)?;
        let mut writer = BufWriter::with_capacity(self.config.write_buffer_size, file);
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| RetrievalError::Fetch { message_id, source })?;
            budget.charge(chunk.len() as u64)?;
            writer.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(write_error)?;

        debug!(
            message_id,
            bytes = written,
            entry = %planned.entry_name,
            "Payload staged"
        );

        Ok(StagedPayload {
            item: planned.item.clone(),
            entry_name: planned.entry_name.clone(),
            path: path.to_path_buf(),
            size_bytes: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockOrigin;
    use tempfile::TempDir;

    fn planned(message_id: i64, size_bytes: u64) -> PlannedItem {
        PlannedItem {
            item: ItemRef::new(message_id),
            size_bytes,
            entry_name: format!("item_{}", message_id),
        }
    }

    async fn collect(
        pool: &RetrievalPool,
        items: Vec<PlannedItem>,
        dir: &Path,
        cancel: CancellationToken,
        budget: u64,
    ) -> Vec<Result<StagedPayload, RetrievalError>> {
        pool.fetch_all(items, dir, cancel, Arc::new(ByteBudget::new(budget)))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_fetch_all_stages_every_item() {
        let origin = Arc::new(MockOrigin::new());
        for id in 1..=5 {
            origin.add_item(id, None, vec![id as u8; 100 * id as usize]).await;
        }
        let pool = RetrievalPool::new(RetrievalConfig::default(), origin.clone());
        let dir = TempDir::new().unwrap();

        let items = (1..=5).map(|id| planned(id, 100 * id as u64)).collect();
        let results = collect(&pool, items, dir.path(), CancellationToken::new(), u64::MAX).await;

        assert_eq!(results.len(), 5);
        for result in results {
            let staged = result.unwrap();
            let bytes = std::fs::read(&staged.path).unwrap();
            assert_eq!(bytes.len() as u64, staged.size_bytes);
            assert_eq!(bytes.len(), 100 * staged.item.message_id as usize);
        }
        assert_eq!(origin.fetch_count().await, 5);

        let status = pool.status();
        assert_eq!(status.total_fetched, 5);
        assert_eq!(status.active_fetches, 0);
        assert_eq!(status.bytes_fetched, 1500);
    }

    #[tokio::test]
    async fn test_never_exceeds_concurrency_cap() {
        let origin = Arc::new(MockOrigin::new());
        for id in 1..=10 {
            origin.add_sized_item(id, 256).await;
        }
        origin.set_fetch_delay(Duration::from_millis(20)).await;

        let config = RetrievalConfig::default().with_max_concurrent_fetches(3);
        let pool = RetrievalPool::new(config, origin.clone());
        let dir = TempDir::new().unwrap();

        let items = (1..=10).map(|id| planned(id, 256)).collect();
        let results = collect(&pool, items, dir.path(), CancellationToken::new(), u64::MAX).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(origin.fetch_count().await, 10);
        assert!(origin.peak_concurrency() <= 3);
        assert!(pool.status().peak_fetches <= 3);
    }

    #[tokio::test]
    async fn test_cap_of_one_serializes_fetches() {
        let origin = Arc::new(MockOrigin::new());
        for id in 1..=4 {
            origin.add_sized_item(id, 10).await;
        }
        origin.set_fetch_delay(Duration::from_millis(5)).await;

        let config = RetrievalConfig::default().with_max_concurrent_fetches(1);
        let pool = RetrievalPool::new(config, origin.clone());
        let dir = TempDir::new().unwrap();

        let items = (1..=4).map(|id| planned(id, 10)).collect();
        collect(&pool, items, dir.path(), CancellationToken::new(), u64::MAX).await;

        assert_eq!(origin.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 10).await;
        origin.add_sized_item(2, 10).await;
        origin.fail_fetch(2).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin.clone());
        let dir = TempDir::new().unwrap();

        let results = collect(
            &pool,
            vec![planned(1, 10), planned(2, 10)],
            dir.path(),
            CancellationToken::new(),
            u64::MAX,
        )
        .await;

        let failed: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0],
            RetrievalError::Fetch { message_id: 2, .. }
        ));
        assert_eq!(pool.status().total_failed, 1);
    }

    #[tokio::test]
    async fn test_interrupted_stream_is_a_fetch_failure() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 20_000).await;
        origin.fail_mid_stream(1).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin);
        let dir = TempDir::new().unwrap();

        let results = collect(
            &pool,
            vec![planned(1, 20_000)],
            dir.path(),
            CancellationToken::new(),
            u64::MAX,
        )
        .await;

        assert!(matches!(
            results[0],
            Err(RetrievalError::Fetch { message_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 10).await;
        origin.set_item_delay(1, Duration::from_secs(10)).await;

        let config = RetrievalConfig::default().with_fetch_timeout_secs(1);
        let pool = RetrievalPool::new(config, origin);
        let dir = TempDir::new().unwrap();

        let results = collect(
            &pool,
            vec![planned(1, 10)],
            dir.path(),
            CancellationToken::new(),
            u64::MAX,
        )
        .await;

        assert!(matches!(
            results[0],
            Err(RetrievalError::Timeout {
                message_id: 1,
                secs: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_prevents_fetches() {
        let origin = Arc::new(MockOrigin::new());
        for id in 1..=3 {
            origin.add_sized_item(id, 10).await;
        }
        let pool = RetrievalPool::new(RetrievalConfig::default(), origin.clone());
        let dir = TempDir::new().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let items = (1..=3).map(|id| planned(id, 10)).collect();
        let results = collect(&pool, items, dir.path(), cancel, u64::MAX).await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(RetrievalError::Cancelled))));
        assert_eq!(origin.fetch_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_fetch() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 10).await;
        origin.set_item_delay(1, Duration::from_secs(30)).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin);
        let dir = TempDir::new().unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let results = collect(&pool, vec![planned(1, 10)], dir.path(), cancel, u64::MAX).await;
        assert!(matches!(results[0], Err(RetrievalError::Cancelled)));
        assert_eq!(pool.status().active_fetches, 0);
    }

    #[tokio::test]
    async fn test_streamed_bytes_count_against_budget() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 1000).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin);
        let dir = TempDir::new().unwrap();

        let results = collect(
            &pool,
            vec![planned(1, 10)],
            dir.path(),
            CancellationToken::new(),
            500,
        )
        .await;

        assert!(matches!(
            results[0],
            Err(RetrievalError::QuotaExceeded {
                limit_bytes: 500,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_resolve_metadata_keeps_submission_order() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_item(3, Some("c.jpg"), vec![0u8; 30]).await;
        origin.add_item(1, Some("a.jpg"), vec![0u8; 10]).await;
        origin.add_item(2, None, vec![0u8; 20]).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin.clone());
        let items = vec![ItemRef::new(3), ItemRef::new(1), ItemRef::new(2)];
        let metadata = pool.resolve_metadata(&items).await.unwrap();

        let sizes: Vec<u64> = metadata.iter().map(|m| m.size_bytes).collect();
        assert_eq!(sizes, vec![30, 10, 20]);
        assert_eq!(metadata[0].file_name.as_deref(), Some("c.jpg"));
        assert_eq!(origin.metadata_count().await, 3);
        assert_eq!(origin.fetch_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_metadata_on_spawned_task() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 10).await;
        origin.add_sized_item(2, 20).await;
        let pool = Arc::new(RetrievalPool::new(RetrievalConfig::default(), origin));

        let items = vec![ItemRef::new(1), ItemRef::new(2)];
        let task = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.resolve_metadata(&items).await })
        };

        let metadata = task.await.unwrap().unwrap();
        assert_eq!(metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_metadata_failure() {
        let origin = Arc::new(MockOrigin::new());
        origin.add_sized_item(1, 10).await;

        let pool = RetrievalPool::new(RetrievalConfig::default(), origin);
        let result = pool
            .resolve_metadata(&[ItemRef::new(1), ItemRef::new(99)])
            .await;

        assert!(matches!(
            result,
            Err(RetrievalError::Metadata { message_id: 99, .. })
        ));
    }
}
