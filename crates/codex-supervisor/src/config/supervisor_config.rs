//! Supervisor configuration with validation and versioning.

use crate::config::{LoggingSettings, ResilienceSettings, ServerSettings};
use crate::{SupervisorError, SupervisorResult};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration version for migration support.
/// Increment when adding new fields or changing structure.
pub const CONFIG_VERSION: u32 = 1;

pub const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FALLBACK_PORTS: [u16; 3] = [8081, 8082, 8083];
const DEFAULT_EXECUTABLE: &str = "codex-server";
const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["tauri://localhost", "http://tauri.localhost"];
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_CLIENT_LOG: &str = "client.log";
const DEFAULT_SERVER_LOG: &str = "server.log";
const DEFAULT_READINESS_ATTEMPTS: u32 = 10;
const DEFAULT_READINESS_INTERVAL_SECS: u64 = 3;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 5;
const DEFAULT_FAILURE_THRESHOLD: u32 = 1;
const DEFAULT_MAX_RESTARTS: u32 = 0; // unlimited
const DEFAULT_RESTART_DELAY_MS: u64 = 1000;
const DEFAULT_SHUTDOWN_REQUEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_TERMINATE_GRACE_MS: u64 = 2000;
const DEFAULT_KILL_WAIT_MS: u64 = 1000;

const MIN_PORT: u16 = 1024;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Config file format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Backend process settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Resilience settings
    #[serde(default)]
    pub resilience: ResilienceSettings,
}

// === Default Value Functions ===

fn default_version() -> u32 {
    CONFIG_VERSION
}
pub(crate) fn default_host() -> String {
    DEFAULT_HOST.into()
}
pub(crate) fn default_port() -> u16 {
    DEFAULT_PORT
}
pub(crate) fn default_fallback_ports() -> Vec<u16> {
    DEFAULT_FALLBACK_PORTS.to_vec()
}
pub(crate) fn default_executable() -> String {
    DEFAULT_EXECUTABLE.into()
}
pub(crate) fn default_allowed_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect()
}
pub(crate) fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.into()
}
pub(crate) fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.into()
}
pub(crate) fn default_client_log() -> String {
    DEFAULT_CLIENT_LOG.into()
}
pub(crate) fn default_server_log() -> String {
    DEFAULT_SERVER_LOG.into()
}
pub(crate) fn default_readiness_attempts() -> u32 {
    DEFAULT_READINESS_ATTEMPTS
}
pub(crate) fn default_readiness_interval() -> u64 {
    DEFAULT_READINESS_INTERVAL_SECS
}
pub(crate) fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}
pub(crate) fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}
pub(crate) fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}
pub(crate) fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}
pub(crate) fn default_restart_delay() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}
pub(crate) fn default_shutdown_request_timeout() -> u64 {
    DEFAULT_SHUTDOWN_REQUEST_TIMEOUT_SECS
}
pub(crate) fn default_default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}
pub(crate) fn default_shutdown_poll_interval() -> u64 {
    DEFAULT_SHUTDOWN_POLL_INTERVAL_MS
}
pub(crate) fn default_terminate_grace() -> u64 {
    DEFAULT_TERMINATE_GRACE_MS
}
pub(crate) fn default_kill_wait() -> u64 {
    DEFAULT_KILL_WAIT_MS
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
            resilience: ResilienceSettings::default(),
        }
    }
}

// === Configuration Operations ===

impl SupervisorConfig {
    /// Load config from `config_dir`, creating a default file if none exists.
    ///
    /// Loading order:
    /// 1. config.toml (migrated and rewritten if it is an older version)
    /// 2. CODEX_* environment variable overrides
    /// 3. validation
    pub fn load_or_create(config_dir: &Path) -> SupervisorResult<Self> {
        let config_path = config_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut config: Self = toml::from_str(&content)
                .map_err(|e| SupervisorError::config(format!("{}: {e}", config_path.display())))?;

            if config.version < CONFIG_VERSION {
                config = Self::migrate(config)?;
                config.save(config_dir)?;
            }

            config
        } else {
            std::fs::create_dir_all(config_dir).map_err(|e| {
                SupervisorError::DataDirCreation {
                    path: config_dir.to_path_buf(),
                    source: e,
                    location: ErrorLocation::from(Location::caller()),
                }
            })?;
            let config = Self::default();
            config.save(config_dir)?;
            info!("Wrote default configuration to {}", config_path.display());
            config
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Save config to file atomically.
    ///
    /// Uses write-to-temp-then-rename pattern to prevent
    /// partial writes if the process is interrupted.
    pub fn save(&self, config_dir: &Path) -> SupervisorResult<()> {
        let config_path = config_dir.join(CONFIG_FILENAME);
        let content =
            toml::to_string_pretty(self).map_err(|e| SupervisorError::config(e.to_string()))?;

        let temp_path = config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &config_path)?;

        Ok(())
    }

    /// Migrate config from older version.
    fn migrate(mut config: Self) -> SupervisorResult<Self> {
        // Version 0 -> 1: fallback ports introduced
        if config.version == 0 {
            if config.server.fallback_ports.is_empty() {
                config.server.fallback_ports = default_fallback_ports();
            }
            config.version = 1;
        }

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.server.host != DEFAULT_HOST && self.server.host != "localhost" {
            return Err(SupervisorError::config(format!(
                "server.host must be {DEFAULT_HOST} or localhost, got {}",
                self.server.host
            )));
        }

        for port in self.server.candidate_ports() {
            if port < MIN_PORT {
                return Err(SupervisorError::config(format!(
                    "server ports must be >= {MIN_PORT} (unprivileged), got {port}"
                )));
            }
        }

        if self.server.executable.trim().is_empty() {
            return Err(SupervisorError::config("server.executable must not be empty"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(SupervisorError::config(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got {}",
                self.logging.level
            )));
        }

        let resilience = &self.resilience;
        if resilience.readiness_attempts == 0 {
            return Err(SupervisorError::config(
                "resilience.readiness_attempts must be > 0",
            ));
        }
        if resilience.probe_timeout_secs == 0 || resilience.shutdown_request_timeout_secs == 0 {
            return Err(SupervisorError::config("request timeouts must be > 0"));
        }
        if resilience.health_check_interval_secs == 0 {
            return Err(SupervisorError::config(
                "resilience.health_check_interval_secs must be > 0",
            ));
        }
        if resilience.liveness_failure_threshold == 0 {
            return Err(SupervisorError::config(
                "resilience.liveness_failure_threshold must be > 0",
            ));
        }
        if resilience.shutdown_poll_interval_ms == 0 {
            return Err(SupervisorError::config(
                "resilience.shutdown_poll_interval_ms must be > 0",
            ));
        }

        Ok(())
    }

    /// Absolute path of the backend executable under `install_dir`.
    pub fn executable_path(&self, install_dir: &Path) -> PathBuf {
        let path = install_dir.join(&self.server.executable);
        if std::env::consts::EXE_SUFFIX.is_empty() || path.extension().is_some() {
            path
        } else {
            path.with_extension(std::env::consts::EXE_EXTENSION)
        }
    }

    /// Directory holding client.log and server.log.
    pub fn logs_dir(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.logging.directory)
    }

    /// Log configuration summary.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!(
            "  server: {}:{} (fallback {:?}), executable {}",
            self.server.host, self.server.port, self.server.fallback_ports, self.server.executable
        );
        info!("  allowed origins: {}", self.server.allowed_origins.join(","));
        info!(
            "  logging: {} in {}/",
            self.logging.level, self.logging.directory
        );
        info!(
            "  readiness: {} attempts every {}s (probe timeout {}s)",
            self.resilience.readiness_attempts,
            self.resilience.readiness_interval_secs,
            self.resilience.probe_timeout_secs
        );
        info!(
            "  liveness: every {}s, threshold {}, max restarts {}",
            self.resilience.health_check_interval_secs,
            self.resilience.liveness_failure_threshold,
            match self.resilience.max_restarts {
                0 => "unlimited".to_string(),
                n => n.to_string(),
            }
        );
        info!(
            "  shutdown: request {}s, default deadline {}s",
            self.resilience.shutdown_request_timeout_secs,
            self.resilience.default_shutdown_timeout_secs
        );
    }

    fn apply_env_overrides(&mut self) {
        // Server
        Self::apply_env_string("CODEX_SERVER_HOST", &mut self.server.host);
        Self::apply_env_parse("CODEX_SERVER_PORT", &mut self.server.port);
        Self::apply_env_string("CODEX_SERVER_EXECUTABLE", &mut self.server.executable);
        if let Ok(val) = std::env::var("CODEX_ALLOWED_ORIGINS") {
            for origin in val.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !self.server.allowed_origins.iter().any(|o| o == origin) {
                    self.server.allowed_origins.push(origin.to_string());
                }
            }
        }

        // Logging
        Self::apply_env_string("CODEX_LOG_LEVEL", &mut self.logging.level);
        Self::apply_env_string("CODEX_LOG_DIR", &mut self.logging.directory);

        // Resilience
        Self::apply_env_parse("CODEX_MAX_RESTARTS", &mut self.resilience.max_restarts);
        Self::apply_env_parse(
            "CODEX_HEALTH_INTERVAL_SECS",
            &mut self.resilience.health_check_interval_secs,
        );
    }

    /// Helper: Apply environment variable override for String values
    fn apply_env_string(var_name: &str, target: &mut String) {
        if let Ok(val) = std::env::var(var_name) {
            *target = val;
        }
    }

    /// Helper: Apply environment variable override for parseable values
    fn apply_env_parse<T: FromStr>(var_name: &str, target: &mut T) {
        if let Ok(val) = std::env::var(var_name)
            && let Ok(parsed) = val.parse()
        {
            *target = parsed;
        }
    }
}
