use crate::process::child_table::ChildTable;
use crate::process::{LaunchRequest, ProcessController, SpawnedProcess};
use crate::{SupervisorError, SupervisorResult};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// Linux truncates a process's `comm` name to this many bytes.
const COMM_MAX_LEN: usize = 15;

/// POSIX signals; the backend leads its own session so its pid is also
/// its process-group id.
#[derive(Default)]
pub struct UnixProcessController {
    children: ChildTable,
}

impl UnixProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    fn pid(pid: u32) -> SupervisorResult<Pid> {
        i32::try_from(pid)
            .map(Pid::from_raw)
            .map_err(|_| SupervisorError::shutdown(format!("PID {pid} out of range")))
    }

    /// Signal the whole group, falling back to the single process.
    fn signal_tree(pid: u32, signal: Signal) -> SupervisorResult<()> {
        let target = Self::pid(pid)?;

        match killpg(target, signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => match kill(target, signal) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(SupervisorError::shutdown(format!("{signal} to {pid}: {e}"))),
            },
            Err(e) => Err(SupervisorError::shutdown(format!(
                "{signal} to group {pid}: {e}"
            ))),
        }
    }
}

impl ProcessController for UnixProcessController {
    fn spawn(&self, request: &LaunchRequest) -> SupervisorResult<SpawnedProcess> {
        let mut cmd = ChildTable::command(request);

        // Own session so the tree can be signalled as one group
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        self.children.spawn(cmd, request)
    }

    fn is_alive(&self, pid: u32) -> bool {
        if let Some(alive) = self.children.is_alive(pid) {
            return alive;
        }

        let Ok(target) = Self::pid(pid) else {
            return false;
        };
        // Signal 0 only checks existence; EPERM means it exists under another user
        matches!(kill(target, None), Ok(()) | Err(Errno::EPERM))
    }

    fn terminate(&self, pid: u32) -> SupervisorResult<()> {
        info!("Sending SIGTERM to process group {pid}");
        Self::signal_tree(pid, Signal::SIGTERM)
    }

    fn kill_tree(&self, pid: u32) -> SupervisorResult<()> {
        info!("Sending SIGKILL to process group {pid}");
        Self::signal_tree(pid, Signal::SIGKILL)
    }

    fn kill_by_name(&self, executable_name: &str) -> SupervisorResult<()> {
        info!("Killing every process named {executable_name}");

        let output = std::process::Command::new("pkill")
            .args(pkill_args(executable_name))
            .output()
            .map_err(|e| SupervisorError::shutdown(format!("failed to run pkill: {e}")))?;

        // pkill exits 1 when nothing matched
        match output.status.code() {
            Some(0) => Ok(()),
            Some(1) => {
                debug!("No process named {executable_name} was running");
                Ok(())
            }
            _ => Err(SupervisorError::shutdown(format!(
                "pkill {executable_name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// `pkill` arguments killing every process started from `executable_name`.
///
/// `-x` matches the truncated `comm` name, so longer names are matched
/// against the start of the full command line instead.
pub(crate) fn pkill_args(executable_name: &str) -> Vec<String> {
    if executable_name.len() <= COMM_MAX_LEN {
        return vec!["-KILL".into(), "-x".into(), executable_name.into()];
    }

    warn!("{executable_name} exceeds {COMM_MAX_LEN} bytes, matching on the command line");
    vec![
        "-KILL".into(),
        "-f".into(),
        format!("^([^ ]*/)?{}( |$)", ere_escape(executable_name)),
    ]
}

/// Escape POSIX extended-regex metacharacters, the dialect `pkill` uses.
fn ere_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if r".[]()*+?{}|^$\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
