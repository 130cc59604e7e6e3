//! Webhook notification dispatch
//!
//! Resolves inbound notification metadata to a tenant-local cursor and
//! enqueues work. Never performs remote I/O in the request path; the HTTP
//! handler must return within the remote's response-time limit.

use std::sync::Arc;

use calbridge_domain::{Notification, ResourceState, Result};
use tracing::{debug, info, instrument, warn};

use crate::sync::engine::SyncEngine;
use crate::sync::ports::{SyncQueue, SyncTask, TaskKind, TenantContext};

/// What the dispatcher did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Subscription handshake; acknowledged without side effect
    Acknowledged,
    /// An incremental pass was enqueued for the resource
    Enqueued,
    /// The remote resource is gone; mirrors dropped, cursor deactivated
    Deactivated,
    /// The (channel id, resource id) pair matched no cursor; dropped
    Unknown,
}

/// Routes push notifications to queued sync work.
pub struct WebhookDispatcher {
    queue: Arc<dyn SyncQueue>,
    engine: Arc<SyncEngine>,
}

impl WebhookDispatcher {
    pub fn new(queue: Arc<dyn SyncQueue>, engine: Arc<SyncEngine>) -> Self {
        Self { queue, engine }
    }

    /// Handle one notification for an already-resolved tenant.
    ///
    /// An unrecognized pair never creates state: it may be a stale
    /// notification from a just-rotated channel.
    #[instrument(skip(self, ctx, notification), fields(tenant = %ctx.tenant, channel_id = %notification.channel_id, state = ?notification.state))]
    pub async fn dispatch(
        &self,
        ctx: &TenantContext,
        notification: &Notification,
    ) -> Result<DispatchOutcome> {
        if notification.state == ResourceState::Sync {
            debug!("subscription handshake acknowledged");
            return Ok(DispatchOutcome::Acknowledged);
        }

        let Some(cursor) = ctx
            .cursors
            .find_by_channel(&notification.channel_id, &notification.resource_id)
            .await?
        else {
            warn!(
                resource_id = %notification.resource_id,
                "notification matched no cursor; dropping"
            );
            return Ok(DispatchOutcome::Unknown);
        };

        match notification.state {
            ResourceState::Exists => {
                self.queue
                    .enqueue(SyncTask {
                        tenant: ctx.tenant.clone(),
                        kind: TaskKind::Synchronize(cursor.target.clone()),
                    })
                    .await?;
                debug!(target = %cursor.target, "incremental pass enqueued");
                Ok(DispatchOutcome::Enqueued)
            }
            ResourceState::NotExists => {
                info!(target = %cursor.target, "watched resource removed; dropping mirrors");
                // Removal here is local-only. Stops for any orphaned child
                // channels go through the queue, never inline.
                let detached = self.engine.detach_mirrored_children(ctx, &cursor.target).await?;
                ctx.cursors.clear_subscription(&cursor.target).await?;
                ctx.cursors.set_active(&cursor.target, false).await?;
                for channel in detached {
                    self.queue
                        .enqueue(SyncTask {
                            tenant: ctx.tenant.clone(),
                            kind: TaskKind::StopChannel(channel),
                        })
                        .await?;
                }
                Ok(DispatchOutcome::Deactivated)
            }
            ResourceState::Sync => Ok(DispatchOutcome::Acknowledged),
        }
    }
}
