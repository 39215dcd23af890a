use crate::process::child_table::ChildTable;
use crate::process::{LaunchRequest, ProcessController, SpawnedProcess};
use crate::{SupervisorError, SupervisorResult};

use std::os::windows::process::CommandExt;

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
use windows_sys::Win32::System::Threading::{
    CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, GetExitCodeProcess, OpenProcess,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

/// taskkill exits with 128 when the target no longer exists.
const TASKKILL_NOT_FOUND: i32 = 128;

/// `taskkill` based control; `/T` covers the child tree.
#[derive(Default)]
pub struct WindowsProcessController {
    children: ChildTable,
}

impl WindowsProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    fn taskkill(args: &[&str]) -> SupervisorResult<()> {
        let output = std::process::Command::new("taskkill")
            .args(args)
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| SupervisorError::shutdown(format!("failed to run taskkill: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(()),
            Some(TASKKILL_NOT_FOUND) => {
                debug!("taskkill {args:?}: target already gone");
                Ok(())
            }
            _ => Err(SupervisorError::shutdown(format!(
                "taskkill {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

impl ProcessController for WindowsProcessController {
    fn spawn(&self, request: &LaunchRequest) -> SupervisorResult<SpawnedProcess> {
        let mut cmd = ChildTable::command(request);
        cmd.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
        self.children.spawn(cmd, request)
    }

    fn is_alive(&self, pid: u32) -> bool {
        if let Some(alive) = self.children.is_alive(pid) {
            return alive;
        }

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }

            let mut exit_code: u32 = 0;
            let result = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);

            result != 0 && exit_code == STILL_ACTIVE as u32
        }
    }

    fn terminate(&self, pid: u32) -> SupervisorResult<()> {
        info!("Requesting termination of process tree {pid}");
        Self::taskkill(&["/T", "/PID", &pid.to_string()])
    }

    fn kill_tree(&self, pid: u32) -> SupervisorResult<()> {
        info!("Force killing process tree {pid}");
        Self::taskkill(&["/F", "/T", "/PID", &pid.to_string()])
    }

    fn kill_by_name(&self, executable_name: &str) -> SupervisorResult<()> {
        info!("Killing every process named {executable_name}");
        Self::taskkill(&["/F", "/IM", executable_name])
    }
}
