use std::sync::Arc;

use bundlebot_core::{
    Authenticator, BatchOrchestrator, Config, Dispatcher, Messenger, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    orchestrator: Arc<BatchOrchestrator>,
    dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Arc<BatchOrchestrator>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&orchestrator), messenger);
        Self {
            config,
            authenticator,
            orchestrator,
            dispatcher,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
