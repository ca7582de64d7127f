//! Types for the batch orchestrator.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::archive::ArchiveError;
use crate::registry::{RegistryError, RegistryStats, UserId};
use crate::retrieval::{PoolStatus, RetrievalError};

use super::messages;

/// Why there was nothing to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingBatchReason {
    /// No batch was ever started, or it was already consumed.
    NotStarted,
    /// A batch is open but holds no items.
    Empty,
    /// An earlier batch of the same user is still finalizing.
    FinalizeInProgress,
}

impl fmt::Display for MissingBatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MissingBatchReason::NotStarted => "no batch started",
            MissingBatchReason::Empty => "batch is empty",
            MissingBatchReason::FinalizeInProgress => "another finalize is in progress",
        };
        f.write_str(text)
    }
}

impl From<RegistryError> for MissingBatchReason {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotStarted(_) => MissingBatchReason::NotStarted,
            RegistryError::Empty(_) => MissingBatchReason::Empty,
            RegistryError::FinalizeInProgress(_) => MissingBatchReason::FinalizeInProgress,
        }
    }
}

/// Stage responsible for a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Metadata lookup or payload download.
    Fetch,
    /// Staging or archive write.
    Io,
    /// A fetch or the whole finalize ran past its deadline.
    Timeout,
    /// Cancelled by the user.
    Cancelled,
    /// The messenger rejected the archive.
    Delivery,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::Fetch => "fetch",
            FailureCause::Io => "io",
            FailureCause::Timeout => "timeout",
            FailureCause::Cancelled => "cancelled",
            FailureCause::Delivery => "delivery",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a finalize attempt.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("nothing to finalize: {reason}")]
    EmptyOrMissingBatch { reason: MissingBatchReason },

    #[error("batch of {total_bytes} bytes exceeds the {limit_bytes} byte quota")]
    QuotaExceeded { total_bytes: u64, limit_bytes: u64 },

    #[error("finalize failed ({cause}): {message}")]
    PipelineFailure { cause: FailureCause, message: String },
}

impl FinalizeError {
    pub fn pipeline(cause: FailureCause, message: impl Into<String>) -> Self {
        FinalizeError::PipelineFailure {
            cause,
            message: message.into(),
        }
    }

    /// The single status text sent to the user for this outcome.
    pub fn user_message(&self) -> String {
        match self {
            FinalizeError::EmptyOrMissingBatch {
                reason: MissingBatchReason::FinalizeInProgress,
            } => messages::STILL_WORKING.to_string(),
            FinalizeError::EmptyOrMissingBatch { .. } => messages::START_FIRST.to_string(),
            FinalizeError::QuotaExceeded {
                total_bytes,
                limit_bytes,
            } => messages::quota_exceeded(*total_bytes, *limit_bytes),
            FinalizeError::PipelineFailure { cause, .. } => match cause {
                FailureCause::Cancelled => messages::CANCELLED.to_string(),
                FailureCause::Timeout => messages::TOO_SLOW.to_string(),
                _ => messages::FAILED.to_string(),
            },
        }
    }

    /// Label used for the finalize result metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            FinalizeError::EmptyOrMissingBatch { .. } => "empty_or_missing",
            FinalizeError::QuotaExceeded { .. } => "quota_exceeded",
            FinalizeError::PipelineFailure { .. } => "pipeline_failure",
        }
    }
}

impl From<RetrievalError> for FinalizeError {
    fn from(error: RetrievalError) -> Self {
        let cause = match &error {
            RetrievalError::QuotaExceeded {
                used_bytes,
                limit_bytes,
            } => {
                return FinalizeError::QuotaExceeded {
                    total_bytes: *used_bytes,
                    limit_bytes: *limit_bytes,
                }
            }
            RetrievalError::Metadata { .. } | RetrievalError::Fetch { .. } => FailureCause::Fetch,
            RetrievalError::Timeout { .. } => FailureCause::Timeout,
            RetrievalError::Write { .. } => FailureCause::Io,
            RetrievalError::Cancelled => FailureCause::Cancelled,
        };
        FinalizeError::pipeline(cause, error.to_string())
    }
}

impl From<ArchiveError> for FinalizeError {
    fn from(error: ArchiveError) -> Self {
        FinalizeError::pipeline(FailureCause::Io, error.to_string())
    }
}

/// Summary of a delivered archive.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub batch_id: Uuid,
    pub user: UserId,
    /// Entries in the delivered archive.
    pub entries: usize,
    /// Uncompressed payload bytes archived.
    pub total_bytes: u64,
    pub archive_name: String,
    pub duration_ms: u64,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    /// An open batch was removed.
    pub removed_open_batch: bool,
    /// A finalize in flight was told to stop.
    pub signalled_finalize: bool,
}

impl CancelOutcome {
    /// Whether the request had any effect.
    pub fn is_noop(&self) -> bool {
        !self.removed_open_batch && !self.signalled_finalize
    }

    pub fn metric_label(&self) -> &'static str {
        match (self.removed_open_batch, self.signalled_finalize) {
            (_, true) => "signalled_finalize",
            (true, false) => "removed",
            (false, false) => "nothing",
        }
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub registry: RegistryStats,
    pub retrieval: PoolStatus,
    /// Finalize operations currently running.
    pub finalizes_in_flight: usize,
    pub quota_bytes: u64,
}
