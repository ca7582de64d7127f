//! Core batch data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Chat platform identifier of the user owning a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Reference to a previously received attachment message.
///
/// Two references are the same item when they point at the same origin
/// message, regardless of the file name carried along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRef {
    /// Identifier of the message carrying the attachment.
    pub message_id: i64,
    /// File name announced with the message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ItemRef {
    /// Creates a reference without a file name.
    pub fn new(message_id: i64) -> Self {
        Self {
            message_id,
            file_name: None,
        }
    }

    /// Attaches the file name announced by the platform.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

impl PartialEq for ItemRef {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
    }
}

impl Eq for ItemRef {}

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Accepting new items.
    Open,
    /// Item set frozen, archive being built.
    Finalizing,
    /// Delivered or aborted; no longer tracked by the registry.
    Closed,
}

impl BatchState {
    /// Returns the string representation for API responses and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Open => "open",
            BatchState::Finalizing => "finalizing",
            BatchState::Closed => "closed",
        }
    }
}

/// Per-user aggregate of items heading into one archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique id, distinguishes a restarted batch from its predecessor.
    pub id: Uuid,
    /// Owning user.
    pub user: UserId,
    /// Recorded items in insertion order, without duplicates.
    pub items: Vec<ItemRef>,
    /// Current lifecycle state.
    pub state: BatchState,
    /// When the batch was started.
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Creates an empty open batch for the user.
    pub fn new(user: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            items: Vec::new(),
            state: BatchState::Open,
            created_at: Utc::now(),
        }
    }

    /// Whether the batch already holds this item.
    pub fn contains(&self, item: &ItemRef) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    /// Number of recorded items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Aggregate counters over the whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Users with an open batch.
    pub open_batches: usize,
    /// Users with a finalize in flight.
    pub finalizing_batches: usize,
    /// Items recorded across all open batches.
    pub open_items: usize,
}
