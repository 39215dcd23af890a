//! OS process control behind a small trait so the lifecycle logic stays
//! platform-agnostic and testable.

mod child_table;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixProcessController;
#[cfg(all(unix, test))]
pub(crate) use unix::pkill_args;
#[cfg(windows)]
pub use windows::WindowsProcessController;

use crate::SupervisorResult;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::{ChildStderr, ChildStdout};

/// Everything needed to spawn the backend.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    /// Pipe stdout/stderr back to the caller instead of discarding them
    pub capture_output: bool,
}

impl LaunchRequest {
    /// File name used for the last-resort kill by name.
    pub fn executable_name(&self) -> Option<String> {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// A freshly spawned process and its captured output streams.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: u32,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Spawn, inspect and terminate OS processes.
///
/// Signal-style methods are fire-and-forget: an `Err` is logged by the
/// caller, never retried.
pub trait ProcessController: Send + Sync {
    fn spawn(&self, request: &LaunchRequest) -> SupervisorResult<SpawnedProcess>;

    /// Whether `pid` is still in the process table (exited children count as gone).
    fn is_alive(&self, pid: u32) -> bool;

    /// Polite OS-level termination of the process and its children.
    fn terminate(&self, pid: u32) -> SupervisorResult<()>;

    /// Forceful kill of the process and its children.
    fn kill_tree(&self, pid: u32) -> SupervisorResult<()>;

    /// Kill every process on the system running `executable_name`.
    fn kill_by_name(&self, executable_name: &str) -> SupervisorResult<()>;
}

/// Controller for the platform this binary was built for.
pub fn native() -> Arc<dyn ProcessController> {
    #[cfg(unix)]
    {
        Arc::new(UnixProcessController::new())
    }

    #[cfg(windows)]
    {
        Arc::new(WindowsProcessController::new())
    }
}
