use chrono::{DateTime, Utc};

/// The one backend process owned by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProcessHandle {
    pub pid: u32,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    /// Set once readiness is confirmed, cleared when shutdown begins.
    pub running: bool,
}

impl ServerProcessHandle {
    pub fn new(pid: u32, port: u16) -> Self {
        Self {
            pid,
            port,
            started_at: Utc::now(),
            running: false,
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}
