//! Origin service abstraction.
//!
//! This module provides the `Origin` trait used to look up attachment sizes
//! and stream their payloads, plus an HTTP implementation.

mod http;
mod types;

pub use http::HttpOrigin;
pub use types::*;
