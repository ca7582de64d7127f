//! Mock messenger for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::messenger::{Messenger, MessengerError};
use crate::registry::UserId;

/// A recorded status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotification {
    pub user: UserId,
    pub text: String,
}

/// A recorded archive delivery.
///
/// The archive is inspected when delivered, since the staging area holding
/// it is removed right afterwards.
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub user: UserId,
    pub file_name: String,
    /// Entry names, sorted.
    pub entry_names: Vec<String>,
    /// Archive size on disk.
    pub size_bytes: u64,
}

/// Mock implementation of the Messenger trait.
///
/// Provides controllable behavior for testing:
/// - Record notifications and deliveries for assertions
/// - Simulate delivery and notification failures
/// - Simulate slow deliveries
#[derive(Debug, Default)]
pub struct MockMessenger {
    notifications: Arc<RwLock<Vec<RecordedNotification>>>,
    deliveries: Arc<RwLock<Vec<RecordedDelivery>>>,
    fail_deliveries: Arc<RwLock<bool>>,
    fail_notifications: Arc<RwLock<bool>>,
    delivery_delay_ms: Arc<RwLock<u64>>,
}

impl MockMessenger {
    /// Create a new mock messenger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded notifications.
    pub async fn notifications(&self) -> Vec<RecordedNotification> {
        self.notifications.read().await.clone()
    }

    /// Texts sent to one user, in order.
    pub async fn notifications_for(&self, user: UserId) -> Vec<String> {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user == user)
            .map(|n| n.text.clone())
            .collect()
    }

    /// Get all recorded deliveries.
    pub async fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.read().await.clone()
    }

    /// Make every delivery fail.
    pub async fn fail_deliveries(&self, fail: bool) {
        *self.fail_deliveries.write().await = fail;
    }

    /// Make every notification fail (still recorded).
    pub async fn fail_notifications(&self, fail: bool) {
        *self.fail_notifications.write().await = fail;
    }

    /// Set the simulated delivery duration.
    pub async fn set_delivery_delay(&self, delay: Duration) {
        *self.delivery_delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Waits until at least `count` notifications were recorded.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for_notifications(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.notifications.read().await.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn read_entry_names(path: &Path) -> Result<(Vec<String>, u64), MessengerError> {
    let unreadable = |message: String| MessengerError::FileUnreadable {
        path: path.display().to_string(),
        message,
    };
    let file = std::fs::File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let size = file.metadata().map_err(|e| unreadable(e.to_string()))?.len();
    let archive = zip::ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;
    let names = archive.file_names().map(str::to_string).collect::<Vec<_>>();
    Ok((names, size))
}

#[async_trait]
impl Messenger for MockMessenger {
    fn name(&self) -> &str {
        "mock"
    }

    async fn deliver_file(
        &self,
        user: UserId,
        path: &Path,
        file_name: &str,
    ) -> Result<(), MessengerError> {
        let delay = *self.delivery_delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if *self.fail_deliveries.read().await {
            return Err(MessengerError::ApiError("injected delivery failure".to_string()));
        }

        let (mut entry_names, size_bytes) = read_entry_names(path)?;
        // Archive order follows fetch completion.
        entry_names.sort();
        self.deliveries.write().await.push(RecordedDelivery {
            user,
            file_name: file_name.to_string(),
            entry_names,
            size_bytes,
        });
        Ok(())
    }

    async fn notify(&self, user: UserId, text: &str) -> Result<(), MessengerError> {
        self.notifications.write().await.push(RecordedNotification {
            user,
            text: text.to_string(),
        });

        if *self.fail_notifications.read().await {
            return Err(MessengerError::ApiError("injected notify failure".to_string()));
        }
        Ok(())
    }
}
