use crate::config::supervisor_config::{
    default_default_shutdown_timeout, default_failure_threshold, default_health_interval,
    default_kill_wait, default_max_restarts, default_probe_timeout, default_readiness_attempts,
    default_readiness_interval, default_restart_delay, default_shutdown_poll_interval,
    default_shutdown_request_timeout, default_terminate_grace,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Health checks attempted after launch before giving up
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,

    /// Pause between readiness checks (seconds)
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval_secs: u64,

    /// Timeout of a single health probe (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Liveness check interval (seconds)
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    /// Consecutive dead ticks before a restart is requested
    #[serde(default = "default_failure_threshold")]
    pub liveness_failure_threshold: u32,

    /// Consecutive restarts before giving up (0 = restart forever)
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Delay between stopping an old process and launching a new one (milliseconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,

    /// Timeout of the POST /shutdown request (seconds)
    #[serde(default = "default_shutdown_request_timeout")]
    pub shutdown_request_timeout_secs: u64,

    /// Exit deadline when the backend does not declare one (seconds)
    #[serde(default = "default_default_shutdown_timeout")]
    pub default_shutdown_timeout_secs: u64,

    /// Process-table polling interval while waiting for exit (milliseconds)
    #[serde(default = "default_shutdown_poll_interval")]
    pub shutdown_poll_interval_ms: u64,

    /// Wait after the OS termination signal before killing the tree (milliseconds)
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_ms: u64,

    /// Wait after the tree kill before killing by name (milliseconds)
    #[serde(default = "default_kill_wait")]
    pub kill_wait_ms: u64,
}

impl ResilienceSettings {
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn shutdown_request_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_request_timeout_secs)
    }

    pub fn default_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.default_shutdown_timeout_secs)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_secs: default_readiness_interval(),
            probe_timeout_secs: default_probe_timeout(),
            health_check_interval_secs: default_health_interval(),
            liveness_failure_threshold: default_failure_threshold(),
            max_restarts: default_max_restarts(),
            restart_delay_ms: default_restart_delay(),
            shutdown_request_timeout_secs: default_shutdown_request_timeout(),
            default_shutdown_timeout_secs: default_default_shutdown_timeout(),
            shutdown_poll_interval_ms: default_shutdown_poll_interval(),
            terminate_grace_ms: default_terminate_grace(),
            kill_wait_ms: default_kill_wait(),
        }
    }
}
