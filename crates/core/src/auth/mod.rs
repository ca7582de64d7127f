mod none;
mod shared_secret;
mod traits;
mod types;

pub use none::*;
pub use shared_secret::*;
pub use traits::*;
pub use types::*;

use crate::config::{AuthConfig, AuthMethod};

/// Builds the authenticator selected by config.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::SharedSecret => {
            let secret = config
                .secret
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AuthError::ConfigurationError(
                        "secret must be set when using shared_secret auth method".to_string(),
                    )
                })?;
            Ok(Box::new(SharedSecretAuthenticator::new(secret)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_none() {
        let config = AuthConfig {
            method: AuthMethod::None,
            secret: None,
        };
        assert_eq!(create_authenticator(&config).unwrap().method_name(), "none");
    }

    #[test]
    fn test_create_shared_secret() {
        let config = AuthConfig {
            method: AuthMethod::SharedSecret,
            secret: Some("s3cret".to_string()),
        };
        assert_eq!(
            create_authenticator(&config).unwrap().method_name(),
            "shared_secret"
        );
    }

    #[test]
    fn test_create_shared_secret_without_secret() {
        let config = AuthConfig {
            method: AuthMethod::SharedSecret,
            secret: Some(String::new()),
        };
        assert!(matches!(
            create_authenticator(&config),
            Err(AuthError::ConfigurationError(_))
        ));
    }
}
