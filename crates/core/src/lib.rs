//! Core of the bundlebot batch archiver.
//!
//! Users open a batch, submit files, and get them back as one zip archive.
//! The chat platform is reached through the [`Origin`] and [`Messenger`]
//! traits.

pub mod archive;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod messenger;
pub mod metrics;
pub mod orchestrator;
pub mod origin;
pub mod registry;
pub mod retrieval;
pub mod staging;
pub mod testing;

pub use archive::{ArchiveBuilder, ArchiveCompression, ArchiveError, ArchiveSummary};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
    SharedSecretAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, MessengerConfig, OriginConfig, SanitizedConfig, ServerConfig,
};
pub use dispatch::{BotCommand, DispatchOutcome, Dispatcher, InboundEvent};
pub use messenger::{Messenger, MessengerError, WebhookMessenger};
pub use orchestrator::{
    BatchConfig, BatchOrchestrator, CancelOutcome, FailureCause, FinalizeError, FinalizeReport,
    MissingBatchReason, OrchestratorStatus,
};
pub use origin::{HttpOrigin, ItemMetadata, Origin, OriginError};
pub use registry::{
    Batch, BatchState, InMemoryRegistry, ItemRef, RecordOutcome, RegistryError, RegistryStats,
    TaskRegistry, UserId,
};
pub use retrieval::{RetrievalConfig, RetrievalError, RetrievalPool};
pub use staging::StagingArea;
