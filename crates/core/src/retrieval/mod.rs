//! Retrieval pool: concurrency-capped download of batch payloads to staging.

mod config;
mod pool;
mod types;

pub use config::RetrievalConfig;
pub use pool::RetrievalPool;
pub use types::*;
