//! Types for origin service access.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ItemRef;

/// Errors returned by the origin service.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Item not found: message {0}")]
    NotFound(i64),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Payload stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timeout")]
    Timeout,
}

impl OriginError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::StreamInterrupted(_) | Self::Timeout
        )
    }
}

/// Metadata the origin reports for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Reported payload size in bytes.
    pub size_bytes: u64,
    /// File name known to the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// MIME type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Chunked payload body of one item.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<Bytes, OriginError>> + Send>>;

/// The service holding the attachment bytes.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Returns the name of this origin implementation.
    fn name(&self) -> &str;

    /// Looks up the size and name of an item without downloading it.
    async fn metadata(&self, item: &ItemRef) -> Result<ItemMetadata, OriginError>;

    /// Opens the payload of an item as a byte stream.
    async fn fetch(&self, item: &ItemRef) -> Result<PayloadStream, OriginError>;
}
