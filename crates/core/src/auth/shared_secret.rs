//! Shared secret authentication for the platform adapter.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-bundlebot-secret";

/// Authenticator that checks a secret shared with the platform adapter.
///
/// Accepts the secret in either:
/// - `X-Bundlebot-Secret: <secret>` header
/// - `Authorization: Bearer <secret>` header
pub struct SharedSecretAuthenticator {
    secret: String,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn extract_secret<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(secret) = request.header(SECRET_HEADER) {
            return Some(secret);
        }

        let header = request.header("authorization")?;
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = self
            .extract_secret(request)
            .ok_or(AuthError::NotAuthenticated)?;

        if constant_time_eq(provided.as_bytes(), self.secret.as_bytes()) {
            Ok(Identity::adapter())
        } else {
            Err(AuthError::InvalidCredentials(format!(
                "secret rejected for {}",
                request.source_ip
            )))
        }
    }

    fn method_name(&self) -> &'static str {
        "shared_secret"
    }
}

/// Byte comparison whose duration does not depend on where inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
