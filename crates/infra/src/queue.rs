//! In-process work queue and worker pool
//!
//! Webhook handlers and schedulers enqueue; a fixed pool of workers resolves
//! the tenant context and drives the engine. Transient failures retry with
//! jittered exponential backoff, everything else is logged and dropped so a
//! poisoned task cannot wedge the pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calbridge_core::{ChannelManager, SyncEngine, SyncQueue, SyncTask, TaskKind, TenantDirectory};
use calbridge_domain::{CalbridgeError, Result, SyncSettings};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sender half, cheap to clone. This is what webhook handlers and the
/// scheduler hold as their `SyncQueue`.
#[derive(Clone)]
pub struct QueueHandle {
    sender: UnboundedSender<SyncTask>,
}

#[async_trait]
impl SyncQueue for QueueHandle {
    async fn enqueue(&self, task: SyncTask) -> Result<()> {
        self.sender
            .send(task)
            .map_err(|_| CalbridgeError::Internal("task queue is closed".to_string()))
    }
}

/// Receiver half, consumed by [`WorkerPool::start`].
pub struct TaskQueue {
    receiver: UnboundedReceiver<SyncTask>,
}

impl TaskQueue {
    pub fn new() -> (QueueHandle, TaskQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (QueueHandle { sender }, TaskQueue { receiver })
    }
}

/// Fixed-size pool sharing one queue. Workers race on the receiver lock; the
/// unbounded channel keeps enqueue non-blocking for webhook handlers.
pub struct WorkerPool {
    directory: Arc<dyn TenantDirectory>,
    engine: Arc<SyncEngine>,
    channels: Arc<ChannelManager>,
    workers: usize,
    max_retry_attempts: u32,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        engine: Arc<SyncEngine>,
        channels: Arc<ChannelManager>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            directory,
            engine,
            channels,
            workers: settings.workers.max(1),
            max_retry_attempts: settings.max_retry_attempts,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self, queue: TaskQueue) {
        let receiver = Arc::new(AsyncMutex::new(queue.receiver));
        for worker_id in 0..self.workers {
            let receiver = receiver.clone();
            let directory = self.directory.clone();
            let engine = self.engine.clone();
            let channels = self.channels.clone();
            let shutdown = self.shutdown.clone();
            let max_attempts = self.max_retry_attempts;
            self.handles.push(tokio::spawn(async move {
                info!(worker_id, "sync worker started");
                loop {
                    let task = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { break };
                    run_task(&directory, &engine, &channels, max_attempts, task).await;
                }
                info!(worker_id, "sync worker stopped");
            }));
        }
    }

    /// Signal shutdown and wait for in-flight tasks to finish.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "sync worker did not shut down cleanly");
            }
        }
    }
}

async fn run_task(
    directory: &Arc<dyn TenantDirectory>,
    engine: &Arc<SyncEngine>,
    channels: &Arc<ChannelManager>,
    max_attempts: u32,
    task: SyncTask,
) {
    let ctx = match directory.open(&task.tenant).await {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(tenant = %task.tenant, error = %err, "cannot open tenant for task");
            return;
        }
    };

    let mut attempt = 0u32;
    loop {
        let result = match &task.kind {
            TaskKind::Synchronize(target) => {
                engine.synchronize(&ctx, target).await.map(|outcome| {
                    debug!(tenant = %task.tenant, target = %target, ?outcome, "pass finished");
                })
            }
            TaskKind::Renew(target) => {
                channels.ensure_watch(&ctx, target).await.map(|outcome| {
                    debug!(tenant = %task.tenant, target = %target, ?outcome, "watch ensured");
                })
            }
            TaskKind::StopChannel(channel) => {
                channels.stop_detached(&ctx, channel).await;
                Ok(())
            }
        };

        match result {
            Ok(()) => return,
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = calculate_backoff(attempt);
                warn!(
                    tenant = %task.tenant,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(tenant = %task.tenant, error = %err, "task abandoned");
                return;
            }
        }
    }
}

/// Exponential backoff with 25% jitter, capped at 32 seconds.
pub fn calculate_backoff(attempt: u32) -> Duration {
    let base_delay = 1000u64;
    let max_delay = 32000u64;

    let delay = base_delay * 2u64.pow(attempt.min(5));
    let capped = delay.min(max_delay);

    use rand::Rng;
    let jitter_range = (capped as f64 * 0.25) as u64;
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(0..=jitter_range * 2) as i64 - jitter_range as i64;

    Duration::from_millis((capped as i64 + jitter).max(0) as u64)
}
