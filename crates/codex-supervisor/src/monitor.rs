//! Periodic liveness checks while the backend runs.

use crate::{BackendApi, Liveness, ServerCommand, SupervisorError};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns the liveness loop for one backend process.
pub struct LivenessMonitor {
    api: Arc<dyn BackendApi>,
    port: u16,
    interval: Duration,
    probe_timeout: Duration,
    failure_threshold: u32,
    generation: u64,
}

/// Running monitor. Dropping the handle also stops it.
pub struct MonitorHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LivenessMonitor {
    pub fn new(
        api: Arc<dyn BackendApi>,
        port: u16,
        interval: Duration,
        probe_timeout: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            api,
            port,
            interval,
            probe_timeout,
            failure_threshold: failure_threshold.max(1),
            generation: 0,
        }
    }

    /// Tag restart requests with the launch generation they belong to.
    pub fn for_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Start ticking. On death the monitor sends one
    /// [`ServerCommand::Restart`] and exits; a successful restart arms a
    /// new monitor. `on_alive` runs after every healthy tick.
    pub fn arm<F>(self, command_tx: mpsc::Sender<ServerCommand>, on_alive: F) -> MonitorHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            info!(
                "Liveness monitor armed for port {} every {:?}",
                self.port, self.interval
            );

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = cancel_rx.changed() => break,
                }
                if *cancel_rx.borrow() {
                    break;
                }

                let result = self.api.health(self.port, self.probe_timeout).await;

                // A deliberate stop may have begun while the probe was in flight
                if *cancel_rx.borrow() {
                    break;
                }

                match result.liveness() {
                    Liveness::Alive => {
                        if consecutive_failures > 0 {
                            info!("Backend on port {} recovered ({result})", self.port);
                        }
                        consecutive_failures = 0;
                        on_alive();
                    }
                    Liveness::Dead => {
                        consecutive_failures += 1;
                        let error = SupervisorError::health_check(format!(
                            "port {}: {result} ({consecutive_failures}/{})",
                            self.port, self.failure_threshold
                        ));
                        warn!("{error}");

                        if consecutive_failures >= self.failure_threshold {
                            warn!("Backend on port {} is dead, requesting restart", self.port);
                            let command = ServerCommand::Restart {
                                reason: result.to_string(),
                                generation: self.generation,
                            };
                            if command_tx.send(command).await.is_err() {
                                debug!("Command handler gone, restart request dropped");
                            }
                            break;
                        }
                    }
                }
            }

            debug!("Liveness monitor for port {} exited", self.port);
        });

        MonitorHandle { cancel_tx, task }
    }
}

impl MonitorHandle {
    /// Stop the monitor at its next await point.
    ///
    /// A restart request already queued before cancellation stays queued;
    /// the command handler discards it as stale.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
