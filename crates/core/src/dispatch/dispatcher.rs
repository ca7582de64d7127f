//! Routes inbound chat events to the orchestrator.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messenger::Messenger;
use crate::orchestrator::{messages, BatchOrchestrator};
use crate::registry::{ItemRef, RecordOutcome, UserId};

use super::types::{BotCommand, DispatchOutcome, IgnoredReason, InboundEvent};

/// Inbound event handler.
///
/// Returns without waiting for a finalize: it runs on its own task and sends
/// its status message through the orchestrator.
pub struct Dispatcher {
    orchestrator: Arc<BatchOrchestrator>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            orchestrator,
            messenger,
        }
    }

    pub fn orchestrator(&self) -> &Arc<BatchOrchestrator> {
        &self.orchestrator
    }

    /// Handles one event. Commands take precedence over attachments.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let user = event.user_id;

        if let Some(command) = event.text.as_deref().and_then(BotCommand::parse) {
            debug!(user = %user, ?command, "Command received");
            return match command {
                BotCommand::StartBatch => {
                    let batch = self.orchestrator.start_batch(user);
                    self.reply(user, messages::BATCH_STARTED).await;
                    DispatchOutcome::BatchStarted { batch_id: batch.id }
                }
                BotCommand::Finalize => {
                    self.spawn_finalize(user);
                    DispatchOutcome::FinalizeScheduled
                }
                BotCommand::Cancel => {
                    let outcome = self.orchestrator.cancel(user);
                    let text = if outcome.removed_open_batch {
                        messages::BATCH_CANCELLED
                    } else if outcome.signalled_finalize {
                        messages::FINALIZE_STOPPING
                    } else {
                        messages::NOTHING_TO_CANCEL
                    };
                    self.reply(user, text).await;
                    DispatchOutcome::Cancelled {
                        removed_open_batch: outcome.removed_open_batch,
                        signalled_finalize: outcome.signalled_finalize,
                    }
                }
            };
        }

        if let Some(attachment) = event.attachment {
            let item = match attachment.file_name {
                Some(name) => ItemRef::new(event.message_id).with_file_name(name),
                None => ItemRef::new(event.message_id),
            };
            return match self.orchestrator.record_item(user, item) {
                RecordOutcome::Recorded { position } => DispatchOutcome::ItemRecorded { position },
                RecordOutcome::Duplicate => DispatchOutcome::ItemIgnored {
                    reason: IgnoredReason::Duplicate,
                },
                RecordOutcome::NoOpenBatch => DispatchOutcome::ItemIgnored {
                    reason: IgnoredReason::NoOpenBatch,
                },
            };
        }

        DispatchOutcome::Unhandled
    }

    /// Runs a finalize in the background.
    pub fn spawn_finalize(&self, user: UserId) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            // Outcome is logged and reported to the user by the orchestrator.
            let _ = orchestrator.finalize(user).await;
        })
    }

    async fn reply(&self, user: UserId, text: &str) {
        if let Err(e) = self.messenger.notify(user, text).await {
            warn!(user = %user, error = %e, "Failed to reply to command");
        }
    }
}
