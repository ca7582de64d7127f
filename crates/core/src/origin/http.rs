//! HTTP origin implementation.
//!
//! Talks to a platform adapter exposing attachments as
//! `GET {url}/items/{message_id}` (JSON metadata) and
//! `GET {url}/items/{message_id}/content` (raw bytes).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::config::OriginConfig;
use crate::registry::ItemRef;

use super::{ItemMetadata, Origin, OriginError, PayloadStream};

/// Origin reached over HTTP.
pub struct HttpOrigin {
    client: Client,
    config: OriginConfig,
}

impl HttpOrigin {
    /// Creates a new HTTP origin client.
    pub fn new(config: OriginConfig) -> Result<Self, OriginError> {
        // No overall timeout: payload downloads are bounded by the retrieval pool.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| OriginError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, item: &ItemRef) -> Result<Response, OriginError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(OriginError::NotFound(item.message_id)),
            status => Err(OriginError::ApiError(format!("HTTP {}", status))),
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> OriginError {
    if e.is_timeout() {
        OriginError::Timeout
    } else if e.is_connect() {
        OriginError::ConnectionFailed(e.to_string())
    } else {
        OriginError::ApiError(e.to_string())
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    fn name(&self) -> &str {
        "http"
    }

    async fn metadata(&self, item: &ItemRef) -> Result<ItemMetadata, OriginError> {
        let url = format!("{}/items/{}", self.base_url(), item.message_id);
        let request = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs as u64));

        let response = self.send(request, item).await?;
        let metadata = response
            .json::<ItemMetadata>()
            .await
            .map_err(|e| OriginError::InvalidResponse(e.to_string()))?;

        debug!(
            message_id = item.message_id,
            size_bytes = metadata.size_bytes,
            "Fetched item metadata"
        );
        Ok(metadata)
    }

    async fn fetch(&self, item: &ItemRef) -> Result<PayloadStream, OriginError> {
        let url = format!("{}/items/{}/content", self.base_url(), item.message_id);
        let response = self.send(self.client.get(&url), item).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| OriginError::StreamInterrupted(e.to_string())));
        Ok(Box::pin(stream))
    }
}
