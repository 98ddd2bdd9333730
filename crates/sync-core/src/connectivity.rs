//! Connectivity Monitor (C4) — derives a single "effective online" signal
//! from the logical OR of host-advertised reachability and a periodic
//! probe, debounced to avoid flapping-driven sync storms.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

pub struct ConnectivityMonitor {
    host_reachable: bool,
    probe_reachable: bool,
    dwell: Duration,
    last_transition: Option<Instant>,
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(dwell: Duration) -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                host_reachable: false,
                probe_reachable: false,
                dwell,
                last_transition: None,
                sender,
            },
            receiver,
        )
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn effective(&self) -> bool {
        self.host_reachable || self.probe_reachable
    }

    /// Record the OS/platform's advertised reachability signal.
    pub fn report_host_reachability(&mut self, reachable: bool) -> Option<ConnectivityEvent> {
        self.host_reachable = reachable;
        self.recompute()
    }

    /// Record the outcome of the periodic lightweight probe against
    /// `HEAD /ping`.
    pub fn report_probe_result(&mut self, reachable: bool) -> Option<ConnectivityEvent> {
        self.probe_reachable = reachable;
        self.recompute()
    }

    fn recompute(&mut self) -> Option<ConnectivityEvent> {
        let desired = self.effective();
        let current = *self.sender.borrow();
        if desired == current {
            return None;
        }

        let now = Instant::now();
        if let Some(last) = self.last_transition {
            if now.duration_since(last) < self.dwell {
                return None;
            }
        }

        self.last_transition = Some(now);
        let _ = self.sender.send(desired);
        Some(if desired { ConnectivityEvent::Online } else { ConnectivityEvent::Offline })
    }
}
