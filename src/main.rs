use anyhow::{Context, Result};
use latency_monitor::handlers::create_app;
use latency_monitor::services::notifier::build_notifiers;
use latency_monitor::utils::logging::init_logging;
use latency_monitor::{AppConfig, MonitorDeps, MonitorService, Scheduler};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialize logging
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting latency monitor v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("Falling back to default configuration: {}", e);
    } else {
        info!("Configuration loaded successfully");
    }

    // Initialize shared state
    let service = MonitorService::new(&config, MonitorDeps::system(&config)).await;
    info!("Monitoring {} host(s)", service.hosts().len());
    let monitor = Arc::new(RwLock::new(service));

    // Start background polling
    let notifiers = build_notifiers(&config.alerts)?;
    let scheduler = Scheduler::start(Arc::clone(&monitor), config.monitoring.poll_interval, notifiers);

    // Create and run the API server
    let app = create_app(monitor, scheduler.handle());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
