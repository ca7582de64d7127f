use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication.
///
/// Header names are lowercase.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Caller accepted by an authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Who sent the request, e.g. the platform adapter.
    pub caller: String,
    pub method: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            caller: "anonymous".to_string(),
            method: "none".to_string(),
        }
    }

    pub fn adapter() -> Self {
        Self {
            caller: "adapter".to_string(),
            method: "shared_secret".to_string(),
        }
    }
}
