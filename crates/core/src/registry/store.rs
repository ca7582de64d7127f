//! Task registry trait and error types.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::types::{Batch, ItemRef, RegistryStats, UserId};

/// Reasons a batch cannot be taken for finalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The user never started a batch, or it was already consumed.
    #[error("no open batch for user {0}")]
    NotStarted(UserId),

    /// A batch is open but nothing was recorded into it.
    #[error("batch for user {0} has no items")]
    Empty(UserId),

    /// A previous batch of this user is still being finalized.
    #[error("a batch for user {0} is already being finalized")]
    FinalizeInProgress(UserId),
}

/// What happened to a submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Appended at the given 1-based position.
    Recorded { position: usize },
    /// Already part of the batch; dropped.
    Duplicate,
    /// The user has no open batch; dropped.
    NoOpenBatch,
}

/// Per-user batch bookkeeping.
///
/// Implementations must serialize all operations for the same user. Item
/// submission never fails: mismatched submissions are dropped and reported
/// through [`RecordOutcome`].
pub trait TaskRegistry: Send + Sync {
    /// Starts a fresh open batch, discarding any previous open one.
    fn start_batch(&self, user: UserId) -> Batch;

    /// Appends an item to the user's open batch.
    fn record_item(&self, user: UserId, item: ItemRef) -> RecordOutcome;

    /// Removes the user's open batch. Returns whether one existed.
    fn cancel_batch(&self, user: UserId) -> bool;

    /// Atomically moves the open batch into `Finalizing` and returns a snapshot.
    fn take_for_finalize(&self, user: UserId) -> Result<Batch, RegistryError>;

    /// Drops the finalizing batch with the given id, returning it as `Closed`.
    ///
    /// A batch started after the finalize began is left untouched.
    fn finish_finalize(&self, user: UserId, batch_id: Uuid) -> Option<Batch>;

    /// Snapshot of the user's open batch, or the finalizing one if none is open.
    fn get(&self, user: UserId) -> Option<Batch>;

    /// Aggregate counters.
    fn stats(&self) -> RegistryStats;
}
