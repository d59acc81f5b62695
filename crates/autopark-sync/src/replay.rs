//! # Replay Worker
//!
//! Background task that probes connectivity and drains the offline queue.
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Replay Worker Loop                                  │
//! │                                                                         │
//! │  every replay_poll seconds (or on kick):                               │
//! │                                                                         │
//! │  disconnected? ──► probe the remote (exponential backoff between      │
//! │        │            failed probes, capped at probe_max_backoff)        │
//! │        │                 │                                              │
//! │        │                 └── success → mark connected                  │
//! │        ▼                                                                │
//! │  connected + queue non-empty? ──► store.drain_queue_once()             │
//! │                                    (FIFO, stops on first failure)      │
//! │                                                                         │
//! │  The drain itself lives on ParkingStore so direct writes and replay    │
//! │  share one remote-application path.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};
use crate::store::ParkingStore;

// =============================================================================
// Replay Worker
// =============================================================================

/// Drives queue replay in the background.
pub struct ReplayWorker {
    /// The store whose queue is drained.
    store: Arc<ParkingStore>,

    /// Receiver for explicit drain requests.
    kick_rx: mpsc::Receiver<()>,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the replay worker.
#[derive(Clone)]
pub struct ReplayWorkerHandle {
    kick_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ReplayWorkerHandle {
    /// Requests an immediate probe-and-drain pass.
    pub async fn kick(&self) -> StoreResult<()> {
        self.kick_tx
            .send(())
            .await
            .map_err(|_| StoreError::Internal("Replay worker is gone".into()))
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> StoreResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| StoreError::Internal("Replay worker is gone".into()))
    }
}

impl ReplayWorker {
    /// Creates a new replay worker and returns a handle.
    pub fn new(store: Arc<ParkingStore>) -> (Self, ReplayWorkerHandle) {
        let (kick_tx, kick_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = ReplayWorker {
            store,
            kick_rx,
            shutdown_rx,
        };

        let handle = ReplayWorkerHandle {
            kick_tx,
            shutdown_tx,
        };

        (worker, handle)
    }

    /// Runs the worker loop.
    ///
    /// Spawn this as a background task:
    /// ```rust,ignore
    /// let (worker, handle) = ReplayWorker::new(store.clone());
    /// tokio::spawn(worker.run());
    /// ```
    pub async fn run(mut self) {
        info!("Replay worker starting");

        let tuning = self.store.tuning().clone();
        let mut interval = tokio::time::interval(tuning.replay_poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut probe_backoff = ExponentialBackoff {
            initial_interval: tuning.probe_initial_backoff,
            max_interval: tuning.probe_max_backoff,
            // Probe forever; giving up would strand the queue
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        let mut probe_muted_until: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&mut probe_backoff, &mut probe_muted_until, false).await;
                }

                Some(()) = self.kick_rx.recv() => {
                    debug!("Replay worker kicked");
                    self.tick(&mut probe_backoff, &mut probe_muted_until, true).await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Replay worker shutting down");
                    break;
                }
            }
        }

        info!("Replay worker stopped");
    }

    /// One probe-and-drain pass.
    async fn tick(
        &self,
        probe_backoff: &mut ExponentialBackoff,
        probe_muted_until: &mut Option<Instant>,
        forced: bool,
    ) {
        if !self.store.is_connected() {
            // Back off between failed probes; a kick overrides the mute.
            if !forced {
                if let Some(until) = *probe_muted_until {
                    if Instant::now() < until {
                        return;
                    }
                }
            }

            if self.store.probe_remote().await {
                probe_backoff.reset();
                *probe_muted_until = None;
                info!("Remote reachable again");
            } else {
                let delay = probe_backoff
                    .next_backoff()
                    .unwrap_or(probe_backoff.max_interval);
                *probe_muted_until = Some(Instant::now() + delay);
                debug!(?delay, "Probe failed, backing off");
                return;
            }
        }

        match self.store.queue_pending_count().await {
            Ok(0) => {}
            Ok(pending) => {
                debug!(pending, "Draining offline queue");
                match self.store.drain_queue_once().await {
                    Ok(report) => {
                        if report.applied > 0 || report.failed > 0 {
                            info!(
                                applied = report.applied,
                                failed = report.failed,
                                skipped = report.skipped,
                                remaining = report.remaining,
                                "Queue drain pass finished"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Queue drain failed"),
                }
            }
            Err(e) => error!(error = %e, "Failed to read queue length"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
