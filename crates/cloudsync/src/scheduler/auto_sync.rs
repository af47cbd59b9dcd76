//! Periodic auto-sync sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::sync::SyncService;

/// Sweeps for due sync units on an interval or on demand.
pub struct AutoSyncLoop {
    service: SyncService,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl AutoSyncLoop {
    pub fn new(service: SyncService, interval: Duration) -> Self {
        Self {
            service,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A loop sweeping every `sweep_interval_secs` of the service's config.
    pub fn from_config(service: SyncService) -> Self {
        let interval = service.config().sweep_interval();
        Self::new(service, interval)
    }

    /// Starts the loop on the current runtime. Anything sent on
    /// `trigger_rx` runs a sweep right away.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let service = self.service.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        tracing::info!("Manual auto-sync sweep triggered");
                    },
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                if let Err(e) = service.auto_sync_sweep().await {
                    tracing::error!("Auto-sync sweep failed: {}", e);
                }
            }
        })
    }

    /// Signals the loop to stop after its current sweep.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
