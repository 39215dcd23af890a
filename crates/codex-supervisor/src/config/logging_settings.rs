use crate::config::supervisor_config::{
    default_client_log, default_log_dir, default_log_level, default_server_log,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (relative to the install directory)
    #[serde(default = "default_log_dir")]
    pub directory: String,

    /// Supervisor's own log file
    #[serde(default = "default_client_log")]
    pub client_file: String,

    /// Captured backend stdout/stderr
    #[serde(default = "default_server_log")]
    pub server_file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
            client_file: default_client_log(),
            server_file: default_server_log(),
        }
    }
}
