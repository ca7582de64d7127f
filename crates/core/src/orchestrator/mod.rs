//! Batch orchestrator: finalize pipeline over registry, retrieval pool and
//! archive builder.
//!
//! Lifecycle per batch: `Open -> Finalizing -> {Delivered | Aborted}`. The
//! registry entry is released in both end states.

mod config;
pub mod messages;
mod runner;
mod types;

pub use config::BatchConfig;
pub use runner::BatchOrchestrator;
pub use types::{
    CancelOutcome, FailureCause, FinalizeError, FinalizeReport, MissingBatchReason,
    OrchestratorStatus,
};
