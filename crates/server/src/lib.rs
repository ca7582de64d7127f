//! HTTP front end for the bundlebot core.

pub mod api;
pub mod metrics;
pub mod state;
