//! Sync Scheduler — decides *when* a pass runs: a periodic timer, an
//! online transition reported by the Connectivity Monitor (C4), an
//! explicit caller request, or a realtime-announced change hook for C7.
//! The manager itself (`SyncManager::sync`) already coalesces concurrent
//! callers per tenant, so the scheduler's only job is firing triggers —
//! it never needs its own debouncing beyond what the timer interval gives
//! it for free.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::ids::TenantId;
use crate::sync::manager::SyncManager;
use crate::sync::transport::SyncTransport;
use crate::sync::types::EngineConfig;
use crate::storage::StorageBackend;

/// A unit of work the scheduler hands to the manager: sync one
/// `(tenant, collection)` pair.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub tenant_id: TenantId,
    pub collection: String,
}

pub struct SyncScheduler {
    trigger_tx: mpsc::Sender<SyncTarget>,
    timer_handle: JoinHandle<()>,
    connectivity_handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Start the periodic timer and an online-transition watcher, both
    /// funneling into the same trigger channel the manager drains. The
    /// returned scheduler owns both background tasks; dropping it (or
    /// calling `shutdown`) aborts them.
    pub fn start<B, T>(
        manager: Arc<SyncManager<B, T>>,
        config: EngineConfig,
        targets: Vec<SyncTarget>,
        mut connectivity: Option<watch::Receiver<bool>>,
    ) -> Self
    where
        B: StorageBackend + 'static,
        T: SyncTransport + 'static,
    {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<SyncTarget>(64);

        let drain_manager = manager.clone();
        tokio::spawn(async move {
            while let Some(target) = trigger_rx.recv().await {
                let _ = drain_manager.sync(target.tenant_id, target.collection).await;
            }
        });

        let timer_tx = trigger_tx.clone();
        let timer_targets = targets.clone();
        let sync_interval = config.sync_interval;
        let timer_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            loop {
                ticker.tick().await;
                for target in &timer_targets {
                    if timer_tx.send(target.clone()).await.is_err() {
                        return;
                    }
                }
            }
        });

        let connectivity_handle = connectivity.take().map(|mut rx| {
            let online_tx = trigger_tx.clone();
            let online_targets = targets;
            tokio::spawn(async move {
                let mut was_online = *rx.borrow();
                while rx.changed().await.is_ok() {
                    let now_online = *rx.borrow();
                    if now_online && !was_online {
                        for target in &online_targets {
                            if online_tx.send(target.clone()).await.is_err() {
                                return;
                            }
                        }
                    }
                    was_online = now_online;
                }
            })
        });

        Self { trigger_tx, timer_handle, connectivity_handle }
    }

    /// Explicit caller-requested sync — the UI's "pull to refresh", or a
    /// mutation that wants its own change pushed promptly rather than
    /// waiting for the next timer tick.
    pub async fn request(&self, target: SyncTarget) {
        let _ = self.trigger_tx.send(target).await;
    }

    /// Hook for the Realtime Channel (C7): an announced remote change can
    /// ask the scheduler to run a pull promptly instead of waiting out the
    /// polling interval, without C7 depending on sync internals beyond
    /// this one channel send.
    pub fn realtime_trigger(&self) -> mpsc::Sender<SyncTarget> {
        self.trigger_tx.clone()
    }

    pub fn shutdown(self) {
        self.timer_handle.abort();
        if let Some(handle) = self.connectivity_handle {
            handle.abort();
        }
    }
}
