//! Configuration for the retrieval pool.

use serde::{Deserialize, Serialize};

/// Configuration for payload retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum payload fetches in flight for one finalize.
    #[serde(default = "default_max_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-item timeout in seconds, covering the whole download.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Buffer size for writing staged payloads to disk.
    #[serde(default = "default_write_buffer")]
    pub write_buffer_size: usize,
}

fn default_max_fetches() -> usize {
    3
}

fn default_fetch_timeout() -> u64 {
    300 // 5 minutes
}

fn default_write_buffer() -> usize {
    64 * 1024
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
            write_buffer_size: default_write_buffer(),
        }
    }
}

impl RetrievalConfig {
    /// Sets the maximum concurrent fetches.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    /// Sets the per-item timeout.
    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }
}
