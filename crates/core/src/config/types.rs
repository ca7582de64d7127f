use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::archive::ArchiveCompression;
use crate::orchestrator::BatchConfig;
use crate::retrieval::RetrievalConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub origin: Option<OriginConfig>,
    #[serde(default)]
    pub messenger: Option<MessengerConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration for the inbound event API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Shared secret (required when method = "shared_secret")
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    SharedSecret,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::SharedSecret => "shared_secret",
        }
    }
}

/// Origin service configuration (where attachment payloads come from).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Base URL of the platform adapter (e.g., "http://localhost:9300")
    pub url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,
    /// Metadata request timeout and connect timeout in seconds (default: 30)
    #[serde(default = "default_origin_timeout")]
    pub timeout_secs: u32,
}

fn default_origin_timeout() -> u32 {
    30
}

/// Messenger configuration (outbound texts and documents).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessengerConfig {
    pub url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Text message timeout and connect timeout in seconds (default: 60).
    /// Document uploads have no per-request limit.
    #[serde(default = "default_messenger_timeout")]
    pub timeout_secs: u32,
}

fn default_messenger_timeout() -> u32 {
    60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub batch: SanitizedBatchConfig,
    pub retrieval: RetrievalConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SanitizedEndpointConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messenger: Option<SanitizedEndpointConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBatchConfig {
    pub quota_bytes: u64,
    pub staging_root: PathBuf,
    pub finalize_timeout_secs: u64,
    pub archive_name: String,
    pub compression: ArchiveCompression,
    pub cancel_during_finalize: bool,
}

/// Collaborator endpoint with its token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEndpointConfig {
    pub url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u32,
}

fn sanitize_endpoint(url: &str, token: &Option<String>, timeout_secs: u32) -> SanitizedEndpointConfig {
    SanitizedEndpointConfig {
        url: url.to_string(),
        api_token_configured: token.as_ref().is_some_and(|t| !t.is_empty()),
        timeout_secs,
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
            },
            server: config.server.clone(),
            batch: SanitizedBatchConfig {
                quota_bytes: config.batch.quota_bytes,
                staging_root: config.batch.staging_root.clone(),
                finalize_timeout_secs: config.batch.finalize_timeout_secs,
                archive_name: config.batch.archive_name.clone(),
                compression: config.batch.compression,
                cancel_during_finalize: config.batch.cancel_during_finalize,
            },
            retrieval: config.retrieval.clone(),
            origin: config
                .origin
                .as_ref()
                .map(|o| sanitize_endpoint(&o.url, &o.api_token, o.timeout_secs)),
            messenger: config
                .messenger
                .as_ref()
                .map(|m| sanitize_endpoint(&m.url, &m.api_token, m.timeout_secs)),
        }
    }
}
