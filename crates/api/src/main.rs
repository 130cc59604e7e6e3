//! Calbridge server
//!
//! Wires configuration, the tenant directory, the worker pool, the sweep
//! scheduler and the webhook HTTP endpoint into one process.

use std::sync::Arc;

use calbridge_core::{
    ChannelManager, LeaseRegistry, SyncEngine, SyncPolicy, SyncQueue, WebhookDispatcher,
};
use calbridge_domain::{CalbridgeError, Result};
use calbridge_infra::{
    router, AppState, StaticTenantDirectory, SweepScheduler, SweepSchedulerConfig, TaskQueue,
    WorkerPool,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env file; relying on process environment"),
    }

    let config = calbridge_infra::config::load()?;
    info!(
        bind_addr = %config.server.bind_addr,
        tenants = config.tenants.len(),
        workers = config.sync.workers,
        "starting calbridge"
    );

    let directory = Arc::new(StaticTenantDirectory::new(&config));
    let (queue_handle, task_queue) = TaskQueue::new();
    let queue: Arc<dyn SyncQueue> = Arc::new(queue_handle);

    let channels = Arc::new(ChannelManager::new(
        config.google.webhook_address.clone(),
        config.sync.renewal_lead_hours,
    ));
    let engine = Arc::new(SyncEngine::new(
        LeaseRegistry::default(),
        queue.clone(),
        channels.clone(),
        SyncPolicy::from(&config.sync),
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(queue.clone(), engine.clone()));

    let mut workers = WorkerPool::new(directory.clone(), engine, channels, &config.sync);
    workers.start(task_queue);

    let mut scheduler = SweepScheduler::new(
        directory.clone(),
        queue,
        SweepSchedulerConfig::from(&config.sync),
    );
    scheduler.start().await?;

    let app = router(AppState { directory, dispatcher });
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|err| {
            CalbridgeError::Config(format!("cannot bind {}: {err}", config.server.bind_addr))
        })?;
    info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| CalbridgeError::Internal(format!("server error: {err}")))?;

    info!("shutting down");
    scheduler.stop().await?;
    workers.stop().await;
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for shutdown signal");
    }
}
