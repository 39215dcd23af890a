mod backend_api;
mod log_file;
#[cfg(unix)]
mod process;
mod server_status;

use crate::process::{LaunchRequest, ProcessController, SpawnedProcess};
use crate::{
    BackendApi, HealthCheckResult, ShutdownTimeout, SupervisorConfig, SupervisorError,
    SupervisorResult,
};

use std::collections::{HashSet, VecDeque};
use std::env;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

/// RAII guard for environment variables - automatically restores on drop
pub(crate) struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        unsafe {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self { key, original }
        }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        unsafe {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self { key, original }
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.original {
                Some(val) => env::set_var(self.key, val),
                None => env::remove_var(self.key),
            }
        }
    }
}

/// A port nothing is listening on right now.
pub(crate) fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Install dir containing a placeholder backend executable.
pub(crate) fn install_dir_with_executable(config: &SupervisorConfig) -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(config.executable_path(temp.path()), b"").unwrap();
    temp
}

/// Defaults with a free port and no fallbacks.
pub(crate) fn test_config() -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.server.port = free_port();
    config.server.fallback_ports.clear();
    config
}

// =========================================================================
// Fake process controller
// =========================================================================

/// In-memory process table with call counters.
pub(crate) struct FakeProcessController {
    next_pid: AtomicU32,
    alive: Mutex<HashSet<u32>>,
    launches: Mutex<Vec<LaunchRequest>>,
    pub(crate) fail_spawn: AtomicBool,
    pub(crate) exits_on_terminate: AtomicBool,
    pub(crate) exits_on_kill: AtomicBool,
    pub(crate) terminate_calls: AtomicU32,
    pub(crate) kill_tree_calls: AtomicU32,
    pub(crate) kill_by_name_calls: AtomicU32,
}

impl FakeProcessController {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            alive: Mutex::new(HashSet::new()),
            launches: Mutex::new(Vec::new()),
            fail_spawn: AtomicBool::new(false),
            exits_on_terminate: AtomicBool::new(true),
            exits_on_kill: AtomicBool::new(true),
            terminate_calls: AtomicU32::new(0),
            kill_tree_calls: AtomicU32::new(0),
            kill_by_name_calls: AtomicU32::new(0),
        })
    }

    /// A process that is alive without having been spawned through us.
    pub(crate) fn adopt(&self) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.alive.lock().unwrap().insert(pid);
        pid
    }

    pub(crate) fn exit(&self, pid: u32) {
        self.alive.lock().unwrap().remove(&pid);
    }

    pub(crate) fn exit_all(&self) {
        self.alive.lock().unwrap().clear();
    }

    pub(crate) fn is_alive_pid(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub(crate) fn last_launch(&self) -> Option<LaunchRequest> {
        self.launches.lock().unwrap().last().cloned()
    }

    pub(crate) fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

impl ProcessController for FakeProcessController {
    fn spawn(&self, request: &LaunchRequest) -> SupervisorResult<SpawnedProcess> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(SupervisorError::launch("spawn refused", None));
        }
        self.launches.lock().unwrap().push(request.clone());

        Ok(SpawnedProcess {
            pid: self.adopt(),
            stdout: None,
            stderr: None,
        })
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> SupervisorResult<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if self.exits_on_terminate.load(Ordering::SeqCst) {
            self.exit(pid);
        }
        Ok(())
    }

    fn kill_tree(&self, pid: u32) -> SupervisorResult<()> {
        self.kill_tree_calls.fetch_add(1, Ordering::SeqCst);
        if self.exits_on_kill.load(Ordering::SeqCst) {
            self.exit(pid);
        }
        Ok(())
    }

    fn kill_by_name(&self, _executable_name: &str) -> SupervisorResult<()> {
        self.kill_by_name_calls.fetch_add(1, Ordering::SeqCst);
        self.exit_all();
        Ok(())
    }
}

// =========================================================================
// Fake backend API
// =========================================================================

/// How the fake answers `POST /shutdown`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ShutdownReply {
    /// Acknowledge and exit every process of the paired controller
    AcceptAndExit(ShutdownTimeout),
    /// Acknowledge but keep running
    AcceptAndHang(ShutdownTimeout),
    /// Request fails as if the endpoint were unreachable
    Unreachable,
}

/// Scripted health results with a fallback once the script runs out.
pub(crate) struct FakeBackendApi {
    script: Mutex<VecDeque<HealthCheckResult>>,
    fallback: Mutex<HealthCheckResult>,
    shutdown_reply: Mutex<ShutdownReply>,
    shutdown_delay: Mutex<Duration>,
    controller: Option<Arc<FakeProcessController>>,
    pub(crate) health_calls: AtomicU32,
    pub(crate) shutdown_calls: AtomicU32,
}

impl FakeBackendApi {
    pub(crate) fn new(controller: Option<Arc<FakeProcessController>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(HealthCheckResult::Status(200)),
            shutdown_reply: Mutex::new(ShutdownReply::AcceptAndExit(ShutdownTimeout::Unspecified)),
            shutdown_delay: Mutex::new(Duration::ZERO),
            controller,
            health_calls: AtomicU32::new(0),
            shutdown_calls: AtomicU32::new(0),
        })
    }

    pub(crate) fn script(&self, results: impl IntoIterator<Item = HealthCheckResult>) {
        self.script.lock().unwrap().extend(results);
    }

    pub(crate) fn set_fallback(&self, result: HealthCheckResult) {
        *self.fallback.lock().unwrap() = result;
    }

    pub(crate) fn set_shutdown_reply(&self, reply: ShutdownReply) {
        *self.shutdown_reply.lock().unwrap() = reply;
    }

    pub(crate) fn set_shutdown_delay(&self, delay: Duration) {
        *self.shutdown_delay.lock().unwrap() = delay;
    }

    pub(crate) fn health_count(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_count(&self) -> u32 {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for FakeBackendApi {
    async fn health(&self, _port: u16, _timeout: Duration) -> HealthCheckResult {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    async fn request_shutdown(
        &self,
        _port: u16,
        _timeout: Duration,
    ) -> SupervisorResult<ShutdownTimeout> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shutdown_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = *self.shutdown_reply.lock().unwrap();
        match reply {
            ShutdownReply::AcceptAndExit(timeout) => {
                if let Some(controller) = &self.controller {
                    controller.exit_all();
                }
                Ok(timeout)
            }
            ShutdownReply::AcceptAndHang(timeout) => Ok(timeout),
            ShutdownReply::Unreachable => Err(SupervisorError::shutdown("connection refused")),
        }
    }
}

pub(crate) fn path_of(temp: &TempDir) -> PathBuf {
    temp.path().to_path_buf()
}
