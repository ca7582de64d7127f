//! Outbound messaging abstraction: archive delivery and status texts.

mod types;
mod webhook;

pub use types::{Messenger, MessengerError};
pub use webhook::WebhookMessenger;
