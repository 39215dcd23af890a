use crate::{ServerProcessHandle, ServerState, SupervisorError};

use serde::Serialize;

/// Point-in-time view of the manager for the host application.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub state: String,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub started_at: Option<String>,
    pub restart_count: u32,
    pub base_url: Option<String>,
    pub error: Option<String>,
    pub recovery_hint: Option<String>,
    pub is_running: bool,
}

impl ServerStatus {
    pub fn build(
        state: &ServerState,
        handle: Option<&ServerProcessHandle>,
        host: &str,
        restart_count: u32,
    ) -> Self {
        let (error, recovery_hint) = match state {
            ServerState::Failed { error } => (
                Some(error.clone()),
                Some("Please check server.log or restart the application.".to_string()),
            ),
            _ => (None, None),
        };

        Self {
            state: state.label(),
            port: handle.map(|h| h.port),
            pid: handle.map(|h| h.pid),
            started_at: handle.map(|h| h.started_at.to_rfc3339()),
            restart_count,
            base_url: handle
                .filter(|h| h.running)
                .map(|h| format!("http://{host}:{}", h.port)),
            error,
            recovery_hint,
            is_running: state.is_running() && handle.is_some_and(|h| h.running),
        }
    }

    /// Status after a failed start, with the error's own hint.
    pub fn from_error(error: &SupervisorError) -> Self {
        Self {
            state: ServerState::Failed {
                error: error.to_string(),
            }
            .label(),
            port: None,
            pid: None,
            started_at: None,
            restart_count: 0,
            base_url: None,
            error: Some(error.to_string()),
            recovery_hint: Some(error.recovery_hint().to_string()),
            is_running: false,
        }
    }
}
