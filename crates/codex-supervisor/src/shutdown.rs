//! Graceful shutdown with escalation to OS-level termination.

use crate::{BackendApi, ProcessController, ResilienceSettings};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

const FORCE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How the backend process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Process was already gone when shutdown began
    AlreadyExited,
    /// Exited on its own after `POST /shutdown`
    Graceful,
    /// Exited after the OS termination signal
    Terminated,
    /// Exited after the tree kill
    Killed,
    /// Kill-by-name was needed
    KilledByName,
}

impl ShutdownOutcome {
    pub fn was_forced(&self) -> bool {
        matches!(self, Self::Terminated | Self::Killed | Self::KilledByName)
    }
}

/// Drives one backend process to exit.
///
/// The HTTP phase lets the backend flush its state; the OS phase
/// guarantees the process is gone even when the backend is wedged.
pub struct ShutdownCoordinator {
    api: Arc<dyn BackendApi>,
    controller: Arc<dyn ProcessController>,
    request_timeout: Duration,
    default_timeout: Duration,
    poll_interval: Duration,
    terminate_grace: Duration,
    kill_wait: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        api: Arc<dyn BackendApi>,
        controller: Arc<dyn ProcessController>,
        settings: &ResilienceSettings,
    ) -> Self {
        Self {
            api,
            controller,
            request_timeout: settings.shutdown_request_timeout(),
            default_timeout: settings.default_shutdown_timeout(),
            poll_interval: settings.shutdown_poll_interval(),
            terminate_grace: settings.terminate_grace(),
            kill_wait: settings.kill_wait(),
        }
    }

    /// Full sequence: HTTP request, wait, then escalate if needed.
    pub async fn shutdown(
        &self,
        pid: u32,
        port: u16,
        executable_name: Option<&str>,
    ) -> ShutdownOutcome {
        match self.request_graceful(pid, port).await {
            Some(outcome) => outcome,
            None => self.escalate(pid, executable_name).await,
        }
    }

    /// Ask the backend to exit and wait for its declared deadline.
    ///
    /// Returns `None` when the process is still alive and escalation is needed.
    pub async fn request_graceful(&self, pid: u32, port: u16) -> Option<ShutdownOutcome> {
        if !self.controller.is_alive(pid) {
            info!("Backend PID {pid} already exited");
            return Some(ShutdownOutcome::AlreadyExited);
        }

        match self.api.request_shutdown(port, self.request_timeout).await {
            Ok(declared) => {
                let deadline = declared.or_default(self.default_timeout);
                info!("Backend accepted shutdown, waiting up to {deadline:?} for PID {pid}");

                if self.wait_for_exit(pid, deadline).await {
                    info!("Backend PID {pid} exited gracefully");
                    Some(ShutdownOutcome::Graceful)
                } else {
                    warn!("Backend PID {pid} still running after {deadline:?}");
                    None
                }
            }
            Err(e) => {
                warn!("{e}; escalating to forced termination");
                None
            }
        }
    }

    /// OS termination, then tree kill, then kill by name.
    pub async fn escalate(&self, pid: u32, executable_name: Option<&str>) -> ShutdownOutcome {
        if let Err(e) = self.controller.terminate(pid) {
            warn!("Termination signal failed: {e}");
        }
        if self.wait_for_exit(pid, self.terminate_grace).await {
            info!("Backend PID {pid} exited after termination signal");
            return ShutdownOutcome::Terminated;
        }

        if let Err(e) = self.controller.kill_tree(pid) {
            warn!("Tree kill failed: {e}");
        }
        if self.wait_for_exit(pid, self.kill_wait).await {
            info!("Backend PID {pid} killed");
            return ShutdownOutcome::Killed;
        }

        self.kill_by_name(pid, executable_name);
        ShutdownOutcome::KilledByName
    }

    /// Emergency path: no HTTP, no awaiting.
    ///
    /// Blocks the calling thread for at most the configured kill wait.
    pub fn force_now(&self, pid: u32, executable_name: Option<&str>) -> ShutdownOutcome {
        if !self.controller.is_alive(pid) {
            return ShutdownOutcome::AlreadyExited;
        }

        if let Err(e) = self.controller.kill_tree(pid) {
            warn!("Tree kill failed: {e}");
        }

        let start = Instant::now();
        while start.elapsed() < self.kill_wait {
            if !self.controller.is_alive(pid) {
                info!("Backend PID {pid} force stopped");
                return ShutdownOutcome::Killed;
            }
            std::thread::sleep(FORCE_POLL_INTERVAL);
        }
        if !self.controller.is_alive(pid) {
            return ShutdownOutcome::Killed;
        }

        self.kill_by_name(pid, executable_name);
        ShutdownOutcome::KilledByName
    }

    fn kill_by_name(&self, pid: u32, executable_name: Option<&str>) {
        match executable_name {
            Some(name) => {
                warn!("Backend PID {pid} survived tree kill, killing all {name} processes");
                if let Err(e) = self.controller.kill_by_name(name) {
                    error!("Kill by name failed: {e}");
                }
            }
            None => error!("Backend PID {pid} survived tree kill and has no executable name"),
        }
    }

    /// Poll the process table until `pid` is gone or `deadline` elapses.
    async fn wait_for_exit(&self, pid: u32, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();

        loop {
            if !self.controller.is_alive(pid) {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - elapsed)).await;
        }
    }
}
