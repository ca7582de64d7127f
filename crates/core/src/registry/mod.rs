//! Task registry: which items each user has collected for their next archive.
//!
//! A user owns at most one open batch. Finalizing moves it out of the open
//! position atomically, so two concurrent finalize requests can never both
//! obtain the same batch.

mod memory;
mod store;
mod types;

pub use memory::InMemoryRegistry;
pub use store::{RecordOutcome, RegistryError, TaskRegistry};
pub use types::{Batch, BatchState, ItemRef, RegistryStats, UserId};
