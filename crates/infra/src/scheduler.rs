//! Background sweeps over every tenant's cursors
//!
//! Two loops run side by side: a periodic pass for resources without a live
//! push channel (push and pull stay complementary, not alternative), and a
//! renewal sweep that rotates channels before their lease expires.

use std::sync::Arc;
use std::time::Duration;

use calbridge_core::{SyncQueue, SyncTask, TaskKind, TenantDirectory};
use calbridge_domain::{CalbridgeError, Result, SyncSettings};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type TaskHandle = Arc<Mutex<Vec<JoinHandle<()>>>>;

#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    /// How often to enqueue passes for unwatched resources
    pub periodic_interval: Duration,
    /// How often to look for expiring channels
    pub renewal_interval: Duration,
    /// Renew a channel when it expires within this lead time
    pub renewal_lead_hours: i64,
}

impl From<&SyncSettings> for SweepSchedulerConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            periodic_interval: Duration::from_secs(settings.periodic_interval_secs),
            renewal_interval: Duration::from_secs(settings.renewal_interval_secs),
            renewal_lead_hours: settings.renewal_lead_hours,
        }
    }
}

/// Periodic sweep scheduler with start/stop lifecycle.
pub struct SweepScheduler {
    directory: Arc<dyn TenantDirectory>,
    queue: Arc<dyn SyncQueue>,
    config: SweepSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handles: TaskHandle,
}

impl SweepScheduler {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        queue: Arc<dyn SyncQueue>,
        config: SweepSchedulerConfig,
    ) -> Self {
        Self {
            directory,
            queue,
            config,
            cancellation_token: CancellationToken::new(),
            task_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn both sweep loops.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running().await {
            return Err(CalbridgeError::Internal("scheduler already running".to_string()));
        }

        // Fresh token supports restart after a stop.
        self.cancellation_token = CancellationToken::new();

        let mut handles = self.task_handles.lock().await;

        let directory = self.directory.clone();
        let queue = self.queue.clone();
        let interval = self.config.periodic_interval;
        let cancel = self.cancellation_token.clone();
        handles.push(tokio::spawn(async move {
            sweep_loop(interval, cancel, move || {
                periodic_sweep(directory.clone(), queue.clone())
            })
            .await;
        }));

        let directory = self.directory.clone();
        let queue = self.queue.clone();
        let interval = self.config.renewal_interval;
        let lead_hours = self.config.renewal_lead_hours;
        let cancel = self.cancellation_token.clone();
        handles.push(tokio::spawn(async move {
            sweep_loop(interval, cancel, move || {
                renewal_sweep(directory.clone(), queue.clone(), lead_hours)
            })
            .await;
        }));

        info!("sweep scheduler started");
        Ok(())
    }

    /// Cancel both loops and await their completion.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running().await {
            return Err(CalbridgeError::Internal("scheduler not running".to_string()));
        }

        self.cancellation_token.cancel();

        for handle in self.task_handles.lock().await.drain(..) {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "sweep task panicked"),
                Err(_) => warn!("sweep task did not stop within timeout"),
            }
        }

        info!("sweep scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        !self.task_handles.lock().await.is_empty()
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            self.cancellation_token.cancel();
        }
    }
}

async fn sweep_loop<F, Fut>(interval: Duration, cancel: CancellationToken, sweep: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("sweep loop cancelled");
                break;
            }
            () = tokio::time::sleep(interval) => {
                if let Err(err) = sweep().await {
                    warn!(error = %err, "sweep failed");
                }
            }
        }
    }
}

/// Enqueue a pass for every active cursor that has no push channel. Covers
/// resources whose watch registration failed and deployments where the
/// webhook address is not reachable from outside.
async fn periodic_sweep(
    directory: Arc<dyn TenantDirectory>,
    queue: Arc<dyn SyncQueue>,
) -> Result<()> {
    for tenant in directory.tenants().await? {
        let ctx = directory.open(&tenant).await?;
        for cursor in ctx.cursors.list_unwatched().await? {
            debug!(tenant = %tenant, target = %cursor.target, "periodic pass enqueued");
            queue
                .enqueue(SyncTask {
                    tenant: tenant.clone(),
                    kind: TaskKind::Synchronize(cursor.target.clone()),
                })
                .await?;
            // The pass may register a channel afterwards; ask for one too.
            queue
                .enqueue(SyncTask {
                    tenant: tenant.clone(),
                    kind: TaskKind::Renew(cursor.target),
                })
                .await?;
        }
    }
    Ok(())
}

/// Enqueue a renewal for every channel that expires within the lead time.
async fn renewal_sweep(
    directory: Arc<dyn TenantDirectory>,
    queue: Arc<dyn SyncQueue>,
    lead_hours: i64,
) -> Result<()> {
    for tenant in directory.tenants().await? {
        let ctx = directory.open(&tenant).await?;
        for cursor in ctx.cursors.list_expiring(lead_hours, Utc::now()).await? {
            debug!(tenant = %tenant, target = %cursor.target, "channel renewal enqueued");
            queue
                .enqueue(SyncTask {
                    tenant: tenant.clone(),
                    kind: TaskKind::Renew(cursor.target),
                })
                .await?;
        }
    }
    Ok(())
}
