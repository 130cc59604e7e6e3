//! Per-resource mutual exclusion for sync passes
//!
//! Two concurrent passes for the same resource racing on the cursor update
//! can corrupt the delta chain. The registry hands out short-lived in-process
//! leases keyed by (tenant, target); a duplicate invocation that cannot
//! acquire the lease is dropped, since the pass already in flight will
//! observe an equivalent-or-newer state.

use std::collections::HashSet;
use std::sync::Arc;

use calbridge_domain::{SyncTarget, TenantId};
use parking_lot::Mutex;

type LeaseKey = (TenantId, SyncTarget);

/// In-process lease registry.
#[derive(Default, Clone)]
pub struct LeaseRegistry {
    held: Arc<Mutex<HashSet<LeaseKey>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the lease for a resource. Returns `None` when another
    /// pass already holds it. The lease releases on drop, so a pass abandoned
    /// by the execution policy cannot wedge the resource.
    pub fn try_acquire(&self, tenant: &TenantId, target: &SyncTarget) -> Option<LeaseGuard> {
        let key = (tenant.clone(), target.clone());
        let mut held = self.held.lock();
        if !held.insert(key.clone()) {
            return None;
        }
        Some(LeaseGuard { held: Arc::clone(&self.held), key })
    }
}

/// RAII guard for a held lease.
pub struct LeaseGuard {
    held: Arc<Mutex<HashSet<LeaseKey>>>,
    key: LeaseKey,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.key);
    }
}
