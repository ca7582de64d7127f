use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bundlebot_core::{
    create_authenticator, load_config, validate_config, Authenticator, BatchOrchestrator,
    HttpOrigin, InMemoryRegistry, Messenger, Origin, RetrievalPool, WebhookMessenger,
};
use bundlebot_server::{api::create_router, state::AppState};

/// Upper bound on waiting for running finalizes at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("BUNDLEBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Auth method: {}", config.auth.method.as_str());
    info!(
        quota_bytes = config.batch.quota_bytes,
        max_concurrent_fetches = config.retrieval.max_concurrent_fetches,
        staging_root = %config.batch.staging_root.display(),
        "Batch limits"
    );

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );

    // Collaborators are required: without them no batch can be finalized.
    let origin_config = config
        .origin
        .clone()
        .context("Missing [origin] section")?;
    info!("Using origin at {}", origin_config.url);
    let origin: Arc<dyn Origin> =
        Arc::new(HttpOrigin::new(origin_config).context("Failed to create origin client")?);

    let messenger_config = config
        .messenger
        .clone()
        .context("Missing [messenger] section")?;
    info!("Using messenger at {}", messenger_config.url);
    let messenger: Arc<dyn Messenger> = Arc::new(
        WebhookMessenger::new(messenger_config).context("Failed to create messenger client")?,
    );

    let orchestrator = Arc::new(BatchOrchestrator::new(
        config.batch.clone(),
        Arc::new(InMemoryRegistry::new()),
        RetrievalPool::new(config.retrieval.clone(), origin),
        Arc::clone(&messenger),
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        authenticator,
        Arc::clone(&orchestrator),
        messenger,
    ));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    drain_finalizes(&orchestrator).await;
    Ok(())
}

/// Give running finalizes a chance to deliver before exiting.
async fn drain_finalizes(orchestrator: &BatchOrchestrator) {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    loop {
        let running = orchestrator.status().finalizes_in_flight;
        if running == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(running, "Exiting with finalizes still running");
            return;
        }
        info!(running, "Waiting for running finalizes");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
