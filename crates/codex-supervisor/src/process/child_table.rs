use crate::process::{LaunchRequest, SpawnedProcess};
use crate::{SupervisorError, SupervisorResult};

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Children spawned by a controller, kept so exits can be reaped.
///
/// Without reaping, an exited child lingers as a zombie and still
/// answers a signal-0 probe.
#[derive(Default)]
pub(crate) struct ChildTable {
    children: Mutex<HashMap<u32, Child>>,
}

impl ChildTable {
    /// Base command shared by every platform.
    pub(crate) fn command(request: &LaunchRequest) -> Command {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .kill_on_drop(false);

        if let Some(dir) = &request.current_dir {
            cmd.current_dir(dir);
        }

        if request.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        cmd
    }

    pub(crate) fn spawn(
        &self,
        mut cmd: Command,
        request: &LaunchRequest,
    ) -> SupervisorResult<SpawnedProcess> {
        let mut child = cmd.spawn().map_err(|e| {
            SupervisorError::launch(
                format!("failed to spawn {}", request.program.display()),
                Some(e),
            )
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::launch("process exited before reporting a pid", None))?;

        info!("Spawned {} with PID {pid}", request.program.display());

        let spawned = SpawnedProcess {
            pid,
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, child);

        Ok(spawned)
    }

    /// `Some(alive)` for a child we own, `None` for anything else.
    pub(crate) fn is_alive(&self, pid: u32) -> Option<bool> {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        let child = children.get_mut(&pid)?;

        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                debug!("PID {pid} exited with {status}");
                children.remove(&pid);
                Some(false)
            }
            // Unknown; let the caller fall back to the process table
            Err(_) => None,
        }
    }
}
