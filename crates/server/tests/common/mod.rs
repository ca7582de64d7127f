//! Common test utilities for HTTP testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock collaborators injected, so the whole add/record/zip flow can be
//! driven over HTTP without a chat platform.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bundlebot_core::{
    registry::InMemoryRegistry,
    retrieval::RetrievalPool,
    testing::{MockMessenger, MockOrigin},
    AuthConfig, AuthMethod, Authenticator, BatchOrchestrator, NoneAuthenticator,
    SharedSecretAuthenticator,
};

/// Re-export fixtures for test convenience
pub use bundlebot_core::testing::fixtures;

pub const SECRET: &str = "s3cret";

/// Test fixture with mock origin and messenger.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start() {
///     let fixture = TestFixture::new();
///     let response = fixture.event(1, 1, json!({"text": "/add"})).await;
///     assert_eq!(response.status, StatusCode::ACCEPTED);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub origin: Arc<MockOrigin>,
    pub messenger: Arc<MockMessenger>,
    pub orchestrator: Arc<BatchOrchestrator>,
    /// Staging root for archives
    pub staging: TempDir,
    /// Header sent with every request, if auth is on
    secret: Option<String>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with auth disabled.
    pub fn new() -> Self {
        Self::build(AuthMethod::None)
    }

    /// Fixture with shared secret auth; requests carry the secret.
    pub fn with_shared_secret() -> Self {
        Self::build(AuthMethod::SharedSecret)
    }

    fn build(method: AuthMethod) -> Self {
        let staging = TempDir::new().expect("Failed to create temp dir");
        let origin = Arc::new(MockOrigin::new());
        let messenger = Arc::new(MockMessenger::new());

        let mut config = fixtures::config();
        config.batch = config
            .batch
            .with_staging_root(staging.path().to_path_buf());
        let (authenticator, secret): (Arc<dyn Authenticator>, _) = match method {
            AuthMethod::None => (Arc::new(NoneAuthenticator::new()), None),
            AuthMethod::SharedSecret => (
                Arc::new(SharedSecretAuthenticator::new(SECRET.to_string())),
                Some(SECRET.to_string()),
            ),
        };
        config.auth = AuthConfig {
            method,
            secret: secret.clone(),
        };

        let orchestrator = Arc::new(BatchOrchestrator::new(
            config.batch.clone(),
            Arc::new(InMemoryRegistry::new()),
            RetrievalPool::new(config.retrieval.clone(), origin.clone()),
            messenger.clone(),
        ));
        let state = Arc::new(bundlebot_server::state::AppState::new(
            config,
            authenticator,
            Arc::clone(&orchestrator),
            messenger.clone(),
        ));

        Self {
            router: bundlebot_server::api::create_router(state),
            origin,
            messenger,
            orchestrator,
            staging,
            secret,
        }
    }

    /// Send a GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, true).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), true).await
    }

    /// Send a POST request without credentials.
    pub async fn post_unauthenticated(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), false).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, true).await
    }

    /// Post an inbound event; `extra` is merged into the event body.
    pub async fn event(&self, user: i64, message_id: i64, extra: Value) -> TestResponse {
        let mut body = json!({"user_id": user, "message_id": message_id});
        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }
        self.post("/api/v1/events", body).await
    }

    /// Wait until the messenger recorded `count` notifications.
    pub async fn wait_for_notifications(&self, count: usize) {
        assert!(
            self.messenger
                .wait_for_notifications(count, Duration::from_secs(5))
                .await,
            "expected {} notifications, got {:?}",
            count,
            self.messenger.notifications().await
        );
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        authenticated: bool,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let (true, Some(secret)) = (authenticated, &self.secret) {
            request_builder = request_builder.header("X-Bundlebot-Secret", secret);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(request_builder.body(body).unwrap())
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
