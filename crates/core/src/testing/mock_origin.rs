//! Mock origin for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::origin::{ItemMetadata, Origin, OriginError, PayloadStream};
use crate::registry::ItemRef;

const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
struct MockItem {
    payload: Bytes,
    reported_size: u64,
    file_name: Option<String>,
}

/// How an item should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Metadata,
    Fetch,
    MidStream,
}

/// Holds one slot of the concurrency counter while a fetch is active.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of the Origin trait.
///
/// Provides controllable behavior for testing:
/// - Per-item payloads, reported sizes and file names
/// - Injected metadata, fetch and mid-stream failures
/// - Global and per-item fetch delays
/// - Call counters and peak concurrency tracking
///
/// A fetch counts as active from the call until its payload stream is
/// dropped, so peak concurrency reflects the whole download.
///
/// # Example
///
/// ```rust,ignore
/// use bundlebot_core::testing::MockOrigin;
///
/// let origin = MockOrigin::new();
/// origin.add_item(1, Some("photo.jpg"), vec![0u8; 1024]).await;
/// origin.fail_fetch(2).await;
///
/// // Run a finalize...
///
/// assert!(origin.peak_concurrency() <= 3);
/// ```
#[derive(Debug, Default)]
pub struct MockOrigin {
    items: Arc<RwLock<HashMap<i64, MockItem>>>,
    failures: Arc<RwLock<HashMap<i64, Failure>>>,
    fetch_delay_ms: Arc<RwLock<u64>>,
    item_delays_ms: Arc<RwLock<HashMap<i64, u64>>>,
    fetch_calls: Arc<RwLock<Vec<i64>>>,
    metadata_calls: Arc<RwLock<Vec<i64>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockOrigin {
    /// Create a new mock origin with no items.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item with the given payload.
    pub async fn add_item(&self, message_id: i64, file_name: Option<&str>, payload: impl Into<Bytes>) {
        let payload = payload.into();
        self.items.write().await.insert(
            message_id,
            MockItem {
                reported_size: payload.len() as u64,
                payload,
                file_name: file_name.map(str::to_string),
            },
        );
    }

    /// Register an unnamed item of `size` bytes.
    pub async fn add_sized_item(&self, message_id: i64, size: usize) {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        self.add_item(message_id, None, payload).await;
    }

    /// Override the size reported by metadata without changing the payload.
    pub async fn set_reported_size(&self, message_id: i64, size: u64) {
        if let Some(item) = self.items.write().await.get_mut(&message_id) {
            item.reported_size = size;
        }
    }

    /// Make metadata lookups for the item fail.
    pub async fn fail_metadata(&self, message_id: i64) {
        self.failures.write().await.insert(message_id, Failure::Metadata);
    }

    /// Make payload fetches for the item fail before any byte is sent.
    pub async fn fail_fetch(&self, message_id: i64) {
        self.failures.write().await.insert(message_id, Failure::Fetch);
    }

    /// Make the payload stream break after its first chunk.
    pub async fn fail_mid_stream(&self, message_id: i64) {
        self.failures.write().await.insert(message_id, Failure::MidStream);
    }

    /// Delay applied to every fetch before the stream is returned.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Delay applied to fetches of one item, replacing the global delay.
    pub async fn set_item_delay(&self, message_id: i64, delay: Duration) {
        self.item_delays_ms
            .write()
            .await
            .insert(message_id, delay.as_millis() as u64);
    }

    /// Number of fetch calls made.
    pub async fn fetch_count(&self) -> usize {
        self.fetch_calls.read().await.len()
    }

    /// Message ids fetched, in call order.
    pub async fn fetched_ids(&self) -> Vec<i64> {
        self.fetch_calls.read().await.clone()
    }

    /// Number of metadata calls made.
    pub async fn metadata_count(&self) -> usize {
        self.metadata_calls.read().await.len()
    }

    /// Fetches currently active.
    pub fn active_fetches(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active fetches seen.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn failure(&self, message_id: i64) -> Option<Failure> {
        self.failures.read().await.get(&message_id).copied()
    }
}

#[async_trait]
impl Origin for MockOrigin {
    fn name(&self) -> &str {
        "mock"
    }

    async fn metadata(&self, item: &ItemRef) -> Result<ItemMetadata, OriginError> {
        self.metadata_calls.write().await.push(item.message_id);

        if self.failure(item.message_id).await == Some(Failure::Metadata) {
            return Err(OriginError::ApiError(format!(
                "injected metadata failure for message {}",
                item.message_id
            )));
        }

        let items = self.items.read().await;
        let stored = items
            .get(&item.message_id)
            .ok_or(OriginError::NotFound(item.message_id))?;
        Ok(ItemMetadata {
            size_bytes: stored.reported_size,
            file_name: stored.file_name.clone(),
            mime_type: None,
        })
    }

    async fn fetch(&self, item: &ItemRef) -> Result<PayloadStream, OriginError> {
        self.fetch_calls.write().await.push(item.message_id);
        let guard = ActiveGuard::enter(&self.active, &self.peak);

        let delay = match self.item_delays_ms.read().await.get(&item.message_id) {
            Some(ms) => *ms,
            None => *self.fetch_delay_ms.read().await,
        };
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let failure = self.failure(item.message_id).await;
        if failure == Some(Failure::Fetch) {
            return Err(OriginError::ApiError(format!(
                "injected fetch failure for message {}",
                item.message_id
            )));
        }

        let payload = self
            .items
            .read()
            .await
            .get(&item.message_id)
            .map(|stored| stored.payload.clone())
            .ok_or(OriginError::NotFound(item.message_id))?;

        let mut chunks: Vec<Result<Bytes, OriginError>> = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + CHUNK_SIZE).min(payload.len());
            chunks.push(Ok(payload.slice(offset..end)));
            offset = end;
        }
        if failure == Some(Failure::MidStream) {
            chunks.truncate(1);
            chunks.push(Err(OriginError::StreamInterrupted(
                "injected stream interruption".to_string(),
            )));
        }

        let stream = stream::iter(chunks).map(move |chunk| {
            let _held = &guard;
            chunk
        });
        Ok(Box::pin(stream))
    }
}
