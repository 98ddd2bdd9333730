//! The deferred-conflict registry. Spec.md §9 flags the manual resolver
//! as sketched-but-not-wired in the source and calls out the registry as
//! a first-class part of this design, not an afterthought: a suspended
//! conflict is a resume handle a caller invokes later, not an exception
//! the engine raises and forgets.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::ids::{RecordId, TenantId};
use crate::resolver::ConflictInput;

/// A conflict suspended pending manual resolution. `resolve` or `defer`
/// are the only two outcomes: the caller either supplies the record
/// payload to write, or leaves it deferred (sync advances cursors only
/// for unrelated entities while it remains open).
pub struct DeferredConflict {
    pub tenant_id: TenantId,
    pub collection: String,
    pub record_id: RecordId,
    pub input: ConflictInput,
}

/// A handle the caller uses to resume a suspended conflict exactly once.
pub struct ResumeHandle {
    sender: oneshot::Sender<serde_json::Value>,
}

impl ResumeHandle {
    pub fn resolve_with(self, payload: serde_json::Value) {
        let _ = self.sender.send(payload);
    }
}

pub struct DeferredConflictRegistry {
    entries: Mutex<HashMap<(TenantId, String, RecordId), Arc<DeferredConflict>>>,
}

impl Default for DeferredConflictRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredConflictRegistry {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Register a new deferred conflict, returning the awaitable receiver
    /// the Sync Engine holds and the handle the caller uses to resolve it.
    pub fn defer(
        &self,
        tenant_id: TenantId,
        collection: impl Into<String>,
        record_id: RecordId,
        input: ConflictInput,
    ) -> (Arc<DeferredConflict>, oneshot::Receiver<serde_json::Value>, ResumeHandle) {
        let (tx, rx) = oneshot::channel();
        let entry = Arc::new(DeferredConflict {
            tenant_id: tenant_id.clone(),
            collection: collection.into(),
            record_id: record_id.clone(),
            input,
        });
        self.entries.lock().insert((tenant_id, entry.collection.clone(), record_id), entry.clone());
        (entry, rx, ResumeHandle { sender: tx })
    }

    pub fn remove(&self, tenant_id: &TenantId, collection: &str, record_id: &RecordId) {
        self.entries.lock().remove(&(tenant_id.clone(), collection.to_string(), record_id.clone()));
    }

    pub fn pending(&self, tenant_id: &TenantId) -> Vec<Arc<DeferredConflict>> {
        self.entries
            .lock()
            .values()
            .filter(|c| &c.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub fn is_deferred(&self, tenant_id: &TenantId, collection: &str, record_id: &RecordId) -> bool {
        self.entries.lock().contains_key(&(tenant_id.clone(), collection.to_string(), record_id.clone()))
    }
}
