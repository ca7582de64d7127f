//! Types for outbound messaging.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::UserId;

/// Errors that can occur while talking to the user.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Failed to read file {path}: {message}")]
    FileUnreadable { path: String, message: String },

    #[error("Request timeout")]
    Timeout,
}

/// Outbound channel to the chat user.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the name of this messenger implementation.
    fn name(&self) -> &str;

    /// Sends a file as a document attachment.
    async fn deliver_file(
        &self,
        user: UserId,
        path: &Path,
        file_name: &str,
    ) -> Result<(), MessengerError>;

    /// Sends a plain text message.
    async fn notify(&self, user: UserId, text: &str) -> Result<(), MessengerError>;
}
