use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde) and shared_secret has a secret
/// - Server port is not 0
/// - Fetch concurrency and quota are positive
/// - Collaborator URLs are http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }

    if config.auth.method == AuthMethod::SharedSecret
        && config.auth.secret.as_deref().map_or(true, str::is_empty)
    {
        return invalid("auth.secret must be set when method = \"shared_secret\"");
    }

    if config.retrieval.max_concurrent_fetches == 0 {
        return invalid("retrieval.max_concurrent_fetches must be at least 1");
    }

    if config.retrieval.fetch_timeout_secs == 0 {
        return invalid("retrieval.fetch_timeout_secs cannot be 0");
    }

    if config.retrieval.write_buffer_size == 0 {
        return invalid("retrieval.write_buffer_size cannot be 0");
    }

    if config.batch.quota_bytes == 0 {
        return invalid("batch.quota_bytes cannot be 0");
    }

    if config.batch.archive_name.trim().is_empty() || config.batch.archive_name.contains('/') {
        return invalid("batch.archive_name must be a plain file name");
    }

    if let Some(origin) = &config.origin {
        check_url("origin.url", &origin.url)?;
    }
    if let Some(messenger) = &config.messenger {
        check_url("messenger.url", &messenger.url)?;
    }

    Ok(())
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        invalid(&format!("{} must start with http:// or https://", field))
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
