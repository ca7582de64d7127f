//! Inbound event and dispatch outcome types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::UserId;

/// File carried by an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A chat message forwarded by the platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Commands understood by the bot core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/add`: start a new batch.
    StartBatch,
    /// `/zip`: build and deliver the archive.
    Finalize,
    /// `/cancel`: drop the batch.
    Cancel,
}

impl BotCommand {
    /// Parses the leading command of a message text.
    ///
    /// Accepts a `@botname` suffix on the command word. Returns `None` for
    /// plain text and for commands handled elsewhere.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let command = word.split('@').next().unwrap_or(word);
        match command {
            "/add" => Some(BotCommand::StartBatch),
            "/zip" => Some(BotCommand::Finalize),
            "/cancel" => Some(BotCommand::Cancel),
            _ => None,
        }
    }
}

/// Why a submitted attachment was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    Duplicate,
    NoOpenBatch,
}

/// What the dispatcher did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    BatchStarted { batch_id: Uuid },
    ItemRecorded { position: usize },
    ItemIgnored { reason: IgnoredReason },
    /// Finalize runs in the background and reports to the user itself.
    FinalizeScheduled,
    Cancelled {
        removed_open_batch: bool,
        signalled_finalize: bool,
    },
    /// Not for the bot core.
    Unhandled,
}
