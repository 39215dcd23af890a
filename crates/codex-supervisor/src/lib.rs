//! Lifecycle manager for the bundled Codex backend.
//!
//! [`ServerManager`] launches the backend executable, waits for its health
//! endpoint, keeps it alive, and tears it down gracefully (or forcibly) when
//! the desktop client exits.

mod allowed_origins;
mod backend_api;
mod config;
mod error;
mod health;
mod lifecycle;
mod log_file;
mod monitor;
mod port;
mod process_handle;
mod readiness;
mod server_command;
mod server_state;
mod server_status;
mod shutdown;

pub mod logging;
pub mod process;

#[cfg(test)]
mod tests;

pub use allowed_origins::AllowedOrigins;
pub use backend_api::{BackendApi, HttpBackendApi, ShutdownTimeout};
pub use config::{
    CONFIG_FILENAME, CONFIG_VERSION, LoggingSettings, ResilienceSettings, ServerSettings,
    SupervisorConfig,
};
pub use error::{Result as SupervisorResult, SupervisorError};
pub use health::{HealthCheckResult, Liveness};
pub use lifecycle::ServerManager;
pub use log_file::{LogFile, OutputStream, rotate_log};
pub use monitor::{LivenessMonitor, MonitorHandle};
pub use port::PortManager;
pub use process::{LaunchRequest, ProcessController, SpawnedProcess};
pub use process_handle::ServerProcessHandle;
pub use readiness::ReadinessProber;
pub use server_command::ServerCommand;
pub use server_state::ServerState;
pub use server_status::ServerStatus;
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome};

/// Route polled for readiness and liveness.
pub const HEALTH_PATH: &str = "/health";
/// Route that asks the backend to exit on its own.
pub const SHUTDOWN_PATH: &str = "/shutdown";

/// Environment variables the backend reads at startup.
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_LOG_DIR: &str = "LOG_DIR";
pub const ENV_PORT: &str = "PORT";
pub const ENV_HOST: &str = "HOST";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
