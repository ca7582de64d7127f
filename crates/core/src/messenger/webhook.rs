//! Webhook messenger implementation.
//!
//! Posts text to `{url}/messages` as JSON and documents to `{url}/documents`
//! as multipart, streaming the file from disk.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Body, Client, RequestBuilder};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::MessengerConfig;
use crate::registry::UserId;

use super::{Messenger, MessengerError};

#[derive(Serialize)]
struct TextMessage<'a> {
    user_id: UserId,
    text: &'a str,
}

/// Messenger that forwards to an HTTP platform adapter.
pub struct WebhookMessenger {
    client: Client,
    config: MessengerConfig,
}

impl WebhookMessenger {
    /// Creates a new webhook messenger.
    pub fn new(config: MessengerConfig) -> Result<Self, MessengerError> {
        // No overall timeout: document uploads are bounded by the finalize timeout.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| MessengerError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn send(&self, request: RequestBuilder) -> Result<(), MessengerError> {
        let request = match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MessengerError::Timeout
            } else if e.is_connect() {
                MessengerError::ConnectionFailed(e.to_string())
            } else {
                MessengerError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MessengerError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(100).collect::<String>()
            )))
        }
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver_file(
        &self,
        user: UserId,
        path: &Path,
        file_name: &str,
    ) -> Result<(), MessengerError> {
        let unreadable = |e: std::io::Error| MessengerError::FileUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
        let length = file.metadata().await.map_err(unreadable)?.len();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let document = multipart::Part::stream_with_length(body, length)
            .file_name(file_name.to_string())
            .mime_str("application/zip")
            .map_err(|e| MessengerError::ApiError(e.to_string()))?;
        let form = multipart::Form::new()
            .text("user_id", user.to_string())
            .part("document", document);

        debug!(user = %user, bytes = length, "Delivering document");
        let url = format!("{}/documents", self.base_url());
        self.send(self.client.post(&url).multipart(form)).await
    }

    async fn notify(&self, user: UserId, text: &str) -> Result<(), MessengerError> {
        let url = format!("{}/messages", self.base_url());
        self.send(
            self.client
                .post(&url)
                .timeout(Duration::from_secs(self.config.timeout_secs as u64))
                .json(&TextMessage { user_id: user, text }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn config() -> MessengerConfig {
        MessengerConfig {
            url: "http://127.0.0.1:9/".to_string(),
            api_token: Some("token".to_string()),
            timeout_secs: 1,
        }
    }

    #[derive(Debug)]
    struct ReceivedField {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    }

    #[derive(Default)]
    struct Received {
        messages: Vec<serde_json::Value>,
        fields: Vec<ReceivedField>,
    }

    type Shared = Arc<Mutex<Received>>;

    async fn post_message(
        State(received): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        match body["text"].as_str() {
            Some("slow") => tokio::time::sleep(Duration::from_secs(3)).await,
            Some("fail") => return StatusCode::INTERNAL_SERVER_ERROR,
            _ => {}
        }
        received.lock().await.messages.push(body);
        StatusCode::OK
    }

    async fn post_document(State(received): State<Shared>, mut multipart: Multipart) -> StatusCode {
        // Longer than the configured timeout.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.unwrap().to_vec();
            received.lock().await.fields.push(ReceivedField {
                name,
                file_name,
                content_type,
                data,
            });
        }
        StatusCode::OK
    }

    async fn serve() -> (WebhookMessenger, Shared) {
        let received = Shared::default();
        let router = Router::new()
            .route("/messages", post(post_message))
            .route("/documents", post(post_document))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let messenger = WebhookMessenger::new(MessengerConfig {
            url: format!("http://{}/", addr),
            ..config()
        })
        .unwrap();
        (messenger, received)
    }

    #[tokio::test]
    async fn test_notify_posts_json_message() {
        let (messenger, received) = serve().await;

        messenger.notify(UserId(5), "hello").await.unwrap();

        let received = received.lock().await;
        assert_eq!(
            received.messages,
            vec![serde_json::json!({"user_id": 5, "text": "hello"})]
        );
    }

    #[tokio::test]
    async fn test_slow_text_message_times_out() {
        let (messenger, _) = serve().await;
        let result = messenger.notify(UserId(5), "slow").await;
        assert!(matches!(result, Err(MessengerError::Timeout)));
    }

    #[tokio::test]
    async fn test_error_status_is_an_api_error() {
        let (messenger, _) = serve().await;
        match messenger.notify(UserId(5), "fail").await {
            Err(MessengerError::ApiError(message)) => assert!(message.contains("500")),
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deliver_file_uploads_multipart_document() {
        let (messenger, received) = serve().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        messenger
            .deliver_file(UserId(5), &path, "files.zip")
            .await
            .unwrap();

        let received = received.lock().await;
        assert_eq!(received.fields.len(), 2);

        let user_id = &received.fields[0];
        assert_eq!(user_id.name, "user_id");
        assert_eq!(user_id.data, b"5");

        let document = &received.fields[1];
        assert_eq!(document.name, "document");
        assert_eq!(document.file_name.as_deref(), Some("files.zip"));
        assert_eq!(document.content_type.as_deref(), Some("application/zip"));
        assert_eq!(document.data, payload);
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let messenger = WebhookMessenger::new(config()).unwrap();
        assert_eq!(messenger.base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_deliver_missing_file_fails_before_sending() {
        let messenger = WebhookMessenger::new(config()).unwrap();
        let result = messenger
            .deliver_file(UserId(1), Path::new("/nonexistent/files.zip"), "files.zip")
            .await;
        assert!(matches!(result, Err(MessengerError::FileUnreadable { .. })));
    }

    #[test]
    fn test_text_message_shape() {
        let json = serde_json::to_value(TextMessage {
            user_id: UserId(12),
            text: "hi",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"user_id": 12, "text": "hi"}));
    }
}
