//! Per-user staging directory for one finalize.
//!
//! Layout under the staging root:
//!
//! ```text
//! user-<id>/
//!   items/<message_id>.part
//!   <archive name>
//! ```
//!
//! The directory is removed when the [`StagingArea`] is released or dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::registry::UserId;

/// Directory used by the given user's finalize.
pub fn user_staging_dir(root: &Path, user: UserId) -> PathBuf {
    root.join(format!("user-{}", user))
}

/// Exclusive staging directory, removed on every exit path.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    released: bool,
}

impl StagingArea {
    /// Creates a fresh staging directory, clearing anything left behind by an
    /// earlier crash.
    pub async fn acquire(root: &Path, user: UserId) -> io::Result<Self> {
        let path = user_staging_dir(root, user);

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed stale staging directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(path.join("items")).await?;

        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding staged payloads.
    pub fn items_dir(&self) -> PathBuf {
        self.path.join("items")
    }

    /// Location of the archive file inside the staging area.
    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.path.join(archive_name)
    }

    /// Removes the directory. Failures are logged, never returned.
    ///
    /// Removal is retried once: a write abandoned by a dropped fetch can still
    /// create a file while the tree is being removed.
    pub async fn release(mut self) {
        self.released = true;
        let mut result = tokio::fs::remove_dir_all(&self.path).await;
        if matches!(&result, Err(e) if e.kind() != io::ErrorKind::NotFound) {
            tokio::time::sleep(RELEASE_RETRY_DELAY).await;
            result = tokio::fs::remove_dir_all(&self.path).await;
        }
        remove_logged(&self.path, result);
    }
}

const RELEASE_RETRY_DELAY: Duration = Duration::from_millis(50);

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = std::mem::take(&mut self.path);
        let remove = move || remove_logged(&path, std::fs::remove_dir_all(&path));
        // Stay off the async worker threads when a runtime is available.
        match Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn remove_logged(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Staging directory removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging directory"),
    }
}
