/// Current state of the backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    /// No process is managed
    Stopped,
    /// Resolving the executable and spawning the process
    Launching,
    /// Process spawned, waiting for the health endpoint
    ProbingReadiness { pid: u32, port: u16 },
    /// Process is ready and monitored
    Running { pid: u32, port: u16 },
    /// Liveness monitor detected a dead backend and is relaunching it
    Restarting { attempt: u32 },
    /// Shutdown requested over HTTP, waiting for the process to exit
    ShuttingDownGraceful,
    /// Escalated to OS-level termination
    ShuttingDownForced,
    /// Process is confirmed gone
    Terminated,
    /// Startup failed or restarts were exhausted
    Failed { error: String },
}

impl ServerState {
    pub fn label(&self) -> String {
        match self {
            Self::Stopped => "stopped".into(),
            Self::Launching => "launching".into(),
            Self::ProbingReadiness { .. } => "probing_readiness".into(),
            Self::Running { .. } => "running".into(),
            Self::Restarting { attempt } => format!("restarting (attempt {attempt})"),
            Self::ShuttingDownGraceful => "shutting_down".into(),
            Self::ShuttingDownForced => "shutting_down_forced".into(),
            Self::Terminated => "terminated".into(),
            Self::Failed { .. } => "failed".into(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}
