//! Testing utilities and mock implementations.
//!
//! Mocks for the origin and messenger traits, so batches can be finalized
//! end to end without a chat platform.
//!
//! # Example
//!
//! ```rust,ignore
//! use bundlebot_core::testing::{MockMessenger, MockOrigin};
//!
//! let origin = MockOrigin::new();
//! origin.add_item(1, Some("photo.jpg"), vec![0u8; 1024]).await;
//! origin.fail_fetch(2).await;
//!
//! let messenger = MockMessenger::new();
//! // ... finalize, then inspect messenger.deliveries()
//! ```

mod mock_messenger;
mod mock_origin;

pub use mock_messenger::{MockMessenger, RecordedDelivery, RecordedNotification};
pub use mock_origin::MockOrigin;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::{AuthConfig, AuthMethod, Config};
    use crate::dispatch::{Attachment, InboundEvent};
    use crate::registry::{ItemRef, UserId};

    /// Item reference with a file name.
    pub fn item(message_id: i64, file_name: &str) -> ItemRef {
        ItemRef::new(message_id).with_file_name(file_name)
    }

    /// Text message, e.g. a command.
    pub fn text_event(user: i64, message_id: i64, text: &str) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user),
            message_id,
            text: Some(text.to_string()),
            attachment: None,
        }
    }

    /// Message carrying a named file.
    pub fn file_event(user: i64, message_id: i64, file_name: &str) -> InboundEvent {
        InboundEvent {
            user_id: UserId(user),
            message_id,
            text: None,
            attachment: Some(Attachment {
                file_name: Some(file_name.to_string()),
            }),
        }
    }

    /// Minimal valid config without collaborators.
    pub fn config() -> Config {
        Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                secret: None,
            },
            server: Default::default(),
            batch: Default::default(),
            retrieval: Default::default(),
            origin: None,
            messenger: None,
        }
    }
}
