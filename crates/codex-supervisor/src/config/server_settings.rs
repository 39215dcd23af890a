use crate::config::supervisor_config::{
    default_allowed_origins, default_executable, default_fallback_ports, default_host,
    default_port,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host the backend binds to (loopback only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Preferred port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ports tried in order when the preferred one is taken
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<u16>,

    /// Backend executable, relative to the install directory
    #[serde(default = "default_executable")]
    pub executable: String,

    /// CORS origins passed to the backend at launch
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Extra environment variables for the backend process
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ServerSettings {
    /// Preferred port followed by the fallbacks, without duplicates.
    pub fn candidate_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.port];
        for port in &self.fallback_ports {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        ports
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            fallback_ports: default_fallback_ports(),
            executable: default_executable(),
            allowed_origins: default_allowed_origins(),
            environment: BTreeMap::new(),
        }
    }
}
