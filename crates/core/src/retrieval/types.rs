//! Types for the retrieval pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::origin::OriginError;
use crate::registry::ItemRef;

/// Errors raised while retrieving payloads.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Metadata lookup failed.
    #[error("Metadata lookup failed for message {message_id}: {source}")]
    Metadata {
        message_id: i64,
        #[source]
        source: OriginError,
    },

    /// Payload download failed.
    #[error("Fetch failed for message {message_id}: {source}")]
    Fetch {
        message_id: i64,
        #[source]
        source: OriginError,
    },

    /// A single fetch ran past its deadline.
    #[error("Fetch of message {message_id} timed out after {secs}s")]
    Timeout { message_id: i64, secs: u64 },

    /// Writing the staged payload failed.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Streamed bytes went past the batch quota.
    #[error("Retrieved {used_bytes} bytes, over the {limit_bytes} byte quota")]
    QuotaExceeded { used_bytes: u64, limit_bytes: u64 },

    /// The batch was cancelled.
    #[error("Retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Label used for the fetch result metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            RetrievalError::Timeout { .. } => "timeout",
            RetrievalError::Cancelled => "cancelled",
            RetrievalError::QuotaExceeded { .. } => "quota_exceeded",
            _ => "failed",
        }
    }
}

/// An item scheduled for retrieval, with its archive entry name decided.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub item: ItemRef,
    /// Size reported by the origin.
    pub size_bytes: u64,
    /// Name the payload will carry inside the archive.
    pub entry_name: String,
}

/// A payload written to the staging area.
#[derive(Debug, Clone)]
pub struct StagedPayload {
    pub item: ItemRef,
    pub entry_name: String,
    pub path: PathBuf,
    /// Bytes actually written.
    pub size_bytes: u64,
}

/// Shared byte allowance for one finalize.
///
/// Charged as chunks arrive, so an origin under-reporting sizes is still
/// stopped at the limit.
#[derive(Debug)]
pub struct ByteBudget {
    limit: u64,
    used: AtomicU64,
}

impl ByteBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Charges `bytes` against the budget.
    pub fn charge(&self, bytes: u64) -> Result<(), RetrievalError> {
        let used = self.used.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if used > self.limit {
            return Err(RetrievalError::QuotaExceeded {
                used_bytes: used,
                limit_bytes: self.limit,
            });
        }
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// Status of the retrieval pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Pool name.
    pub name: String,
    /// Fetches currently in flight.
    pub active_fetches: usize,
    /// Highest number of simultaneous fetches observed.
    pub peak_fetches: usize,
    /// Maximum concurrent fetches.
    pub max_concurrent: usize,
    /// Total fetches completed since startup.
    pub total_fetched: u64,
    /// Total fetches failed since startup.
    pub total_failed: u64,
    /// Total payload bytes staged since startup.
    pub bytes_fetched: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows_up_to_limit() {
        let budget = ByteBudget::new(100);
        assert!(budget.charge(60).is_ok());
        assert!(budget.charge(40).is_ok());
        assert_eq!(budget.used(), 100);
    }

    #[test]
    fn test_budget_rejects_overflow() {
        let budget = ByteBudget::new(100);
        budget.charge(90).unwrap();
        let err = budget.charge(11).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::QuotaExceeded {
                used_bytes: 101,
                limit_bytes: 100
            }
        ));
    }

    #[test]
    fn test_metric_labels() {
        assert_eq!(RetrievalError::Cancelled.metric_label(), "cancelled");
        assert_eq!(
            RetrievalError::Timeout {
                message_id: 1,
                secs: 5
            }
            .metric_label(),
            "timeout"
        );
        assert_eq!(
            RetrievalError::Fetch {
                message_id: 1,
                source: OriginError::NotFound(1)
            }
            .metric_label(),
            "failed"
        );
    }
}
