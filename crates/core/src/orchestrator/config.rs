//! Batch finalize configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveCompression;

/// Configuration for finalizing batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum summed payload size of one batch, in bytes.
    #[serde(default = "default_quota")]
    pub quota_bytes: u64,

    /// Root directory for per-user staging areas.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Upper bound on a whole finalize in seconds (0 = unbounded).
    #[serde(default = "default_finalize_timeout")]
    pub finalize_timeout_secs: u64,

    /// File name of the delivered archive.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Compression of archive entries.
    #[serde(default)]
    pub compression: ArchiveCompression,

    /// Whether a cancel request stops a finalize already in flight.
    /// When disabled, cancel only drops the open batch.
    #[serde(default)]
    pub cancel_during_finalize: bool,
}

fn default_quota() -> u64 {
    2_000_000_000
}

fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join("bundlebot-staging")
}

fn default_finalize_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_archive_name() -> String {
    "files.zip".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota(),
            staging_root: default_staging_root(),
            finalize_timeout_secs: default_finalize_timeout(),
            archive_name: default_archive_name(),
            compression: ArchiveCompression::default(),
            cancel_during_finalize: false,
        }
    }
}

impl BatchConfig {
    /// Overall finalize deadline, if any.
    pub fn finalize_timeout(&self) -> Option<Duration> {
        (self.finalize_timeout_secs > 0).then(|| Duration::from_secs(self.finalize_timeout_secs))
    }

    pub fn with_quota_bytes(mut self, quota: u64) -> Self {
        self.quota_bytes = quota;
        self
    }

    pub fn with_staging_root(mut self, root: PathBuf) -> Self {
        self.staging_root = root;
        self
    }

    pub fn with_finalize_timeout_secs(mut self, secs: u64) -> Self {
        self.finalize_timeout_secs = secs;
        self
    }

    pub fn with_cancel_during_finalize(mut self, enabled: bool) -> Self {
        self.cancel_during_finalize = enabled;
        self
    }
}
