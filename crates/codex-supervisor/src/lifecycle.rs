//! Backend process lifecycle with crash recovery.

use crate::process::{self, LaunchRequest, ProcessController};
use crate::{
    AllowedOrigins, BackendApi, ENV_ALLOWED_ORIGINS, ENV_HOST, ENV_LOG_DIR, ENV_LOG_LEVEL,
    ENV_PORT, HttpBackendApi, LivenessMonitor, LogFile, MonitorHandle, OutputStream, PortManager,
    ReadinessProber, ServerCommand, ServerProcessHandle, ServerState, ServerStatus,
    ShutdownCoordinator, ShutdownOutcome, SupervisorConfig, SupervisorError, SupervisorResult,
};

use std::collections::BTreeMap;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use error_location::ErrorLocation;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Manages the bundled backend process.
///
/// Responsibilities:
/// - Launch the backend and wait for its health endpoint
/// - Monitor liveness and restart a dead backend
/// - Shut down gracefully, escalating to OS-level kills
/// - Capture backend output in `server.log`
///
/// Clones share the same state; construct one per application.
#[derive(Clone)]
pub struct ServerManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    install_dir: PathBuf,
    api: Arc<dyn BackendApi>,
    controller: Arc<dyn ProcessController>,
    allowed_origins: AllowedOrigins,
    extra_env: Mutex<BTreeMap<String, String>>,
    handle: Mutex<Option<ServerProcessHandle>>,
    monitor: Mutex<Option<MonitorHandle>>,
    server_log: Mutex<Option<LogFile>>,
    state_tx: watch::Sender<ServerState>,
    restart_count: Arc<AtomicU32>,
    /// Bumped by every host `start()`/`stop()`/`force_stop()`
    generation: AtomicU64,
    retry: Mutex<Option<JoinHandle<()>>>,
    shutdown_requested: AtomicBool,
    stopping: AtomicBool,
    stop_lock: tokio::sync::Mutex<()>,
    launch_lock: tokio::sync::Mutex<()>,
    launch_cancel: Notify,
    command_tx: mpsc::Sender<ServerCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<ServerCommand>>>,
}

impl ServerManager {
    /// Create a manager with explicit process and HTTP layers.
    pub fn new(
        config: SupervisorConfig,
        install_dir: PathBuf,
        api: Arc<dyn BackendApi>,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let allowed_origins = AllowedOrigins::new(config.server.allowed_origins.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                install_dir,
                api,
                controller,
                allowed_origins,
                extra_env: Mutex::new(BTreeMap::new()),
                handle: Mutex::new(None),
                monitor: Mutex::new(None),
                server_log: Mutex::new(None),
                state_tx,
                restart_count: Arc::new(AtomicU32::new(0)),
                generation: AtomicU64::new(0),
                retry: Mutex::new(None),
                shutdown_requested: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                stop_lock: tokio::sync::Mutex::new(()),
                launch_lock: tokio::sync::Mutex::new(()),
                launch_cancel: Notify::new(),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
            }),
        }
    }

    /// Create a manager using this platform's process controller and HTTP.
    pub fn native(config: SupervisorConfig, install_dir: PathBuf) -> SupervisorResult<Self> {
        let api = Arc::new(HttpBackendApi::new(config.server.host.clone())?);
        Ok(Self::new(config, install_dir, api, process::native()))
    }

    // === Lifecycle ===

    /// Launch the backend and wait until it is ready.
    ///
    /// Any process already managed is stopped first.
    pub async fn start(&self) -> SupervisorResult<()> {
        self.inner.shutdown_requested.store(false, Ordering::SeqCst);
        self.inner.restart_count.store(0, Ordering::SeqCst);
        supersede_restarts(&self.inner);
        self.ensure_command_handler();
        self.launch().await
    }

    /// Stop the backend gracefully.
    ///
    /// Idempotent: a call made while a stop is in flight returns at once.
    /// The sequence runs on its own task, so it completes even if the
    /// caller stops waiting. Escalation outcomes are only logged; the only
    /// error is a shutdown task that panicked.
    pub async fn stop(&self) -> SupervisorResult<()> {
        self.inner.shutdown_requested.store(true, Ordering::SeqCst);
        supersede_restarts(&self.inner);
        self.inner.launch_cancel.notify_waiters();

        let manager = self.clone();
        tokio::spawn(async move { manager.stop_process().await })
            .await
            .map(|_| ())
            .map_err(|e| SupervisorError::shutdown(format!("shutdown task failed: {e}")))
    }

    /// Kill the backend immediately without the HTTP phase.
    ///
    /// For abrupt application exit; blocks for at most the configured kill wait.
    pub fn force_stop(&self) -> Option<ShutdownOutcome> {
        force_stop_inner(&self.inner)
    }

    async fn launch(&self) -> SupervisorResult<()> {
        // One process at a time
        if self.handle().is_some() {
            info!("Stopping existing backend before launch");
            self.stop_process().await;
            drop(self.inner.stop_lock.lock().await);
            tokio::time::sleep(self.inner.config.resilience.restart_delay()).await;
        }

        let _launch = self.inner.launch_lock.lock().await;
        self.set_state(ServerState::Launching);

        let config = &self.inner.config;
        let executable = config.executable_path(&self.inner.install_dir);
        if !executable.is_file() {
            let e = SupervisorError::ExecutableNotFound {
                path: executable,
                location: ErrorLocation::from(Location::caller()),
            };
            return Err(self.fail(e));
        }

        let port = PortManager::find_available(&config.server.candidate_ports())
            .map_err(|e| self.fail(e))?;
        info!("Using port {port}");

        let logs_dir = config.logs_dir(&self.inner.install_dir);
        let server_log =
            LogFile::open(&logs_dir.join(&config.logging.server_file)).map_err(|e| self.fail(e))?;

        let request = self.launch_request(executable, port, &logs_dir);
        let spawned = match self.inner.controller.spawn(&request) {
            Ok(spawned) => spawned,
            Err(e) => {
                close_log(&server_log);
                return Err(self.fail(e));
            }
        };
        let pid = spawned.pid;

        if let Some(stdout) = spawned.stdout {
            server_log.pump(stdout, OutputStream::Stdout);
        }
        if let Some(stderr) = spawned.stderr {
            server_log.pump(stderr, OutputStream::Stderr);
        }
        if let Some(previous) = lock(&self.inner.server_log).replace(server_log) {
            close_log(&previous);
        }
        *lock(&self.inner.handle) = Some(ServerProcessHandle::new(pid, port));
        self.set_state(ServerState::ProbingReadiness { pid, port });

        let prober = ReadinessProber::from_settings(&config.resilience);
        let cancelled = self.inner.launch_cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let ready = if self.inner.shutdown_requested.load(Ordering::SeqCst) {
            Err(startup_cancelled())
        } else {
            tokio::select! {
                result = prober.wait_ready(self.inner.api.as_ref(), port) => result,
                _ = &mut cancelled => Err(startup_cancelled()),
            }
        };

        if let Err(e) = ready {
            if matches!(e, SupervisorError::StartupCancelled { .. }) {
                info!("Launch of PID {pid} cancelled by shutdown");
                // An in-flight stop owns the process; otherwise nobody does
                if !self.inner.stopping.load(Ordering::SeqCst) {
                    self.abandon_launch(pid, request.executable_name().as_deref())
                        .await;
                }
            } else {
                error!("Backend PID {pid} failed to become ready: {e}");
                self.abandon_launch(pid, request.executable_name().as_deref())
                    .await;
            }
            return Err(self.fail(e));
        }

        self.claim_ready(pid, request.executable_name().as_deref()).await?;

        self.set_state(ServerState::Running { pid, port });
        info!("Backend started on port {port} (PID {pid})");

        self.arm_monitor(port);

        Ok(())
    }

    /// Mark a process that passed readiness as running.
    ///
    /// A stop may have claimed it while it was probing, or it may no longer
    /// be the tracked process at all; the latter is killed here since
    /// nothing else owns it.
    pub(crate) async fn claim_ready(
        &self,
        pid: u32,
        executable_name: Option<&str>,
    ) -> SupervisorResult<()> {
        let tracked = {
            let mut handle = lock(&self.inner.handle);
            match handle.as_mut() {
                Some(h) if h.pid == pid => {
                    if !self.inner.stopping.load(Ordering::SeqCst) {
                        h.running = true;
                    }
                    Some(h.running)
                }
                _ => None,
            }
        };

        match tracked {
            Some(true) => Ok(()),
            // The in-flight stop owns it
            Some(false) => Err(startup_cancelled()),
            None => {
                if self.inner.controller.is_alive(pid) {
                    warn!("Backend PID {pid} is no longer tracked, killing it");
                    let outcome = self.coordinator().escalate(pid, executable_name).await;
                    debug!("Untracked PID {pid}: {outcome:?}");
                }
                Err(startup_cancelled())
            }
        }
    }

    /// Environment and paths for one launch.
    ///
    /// Supervisor-computed variables override caller-supplied ones.
    fn launch_request(&self, executable: PathBuf, port: u16, logs_dir: &Path) -> LaunchRequest {
        let config = &self.inner.config;

        let mut env = config.server.environment.clone();
        env.extend(lock(&self.inner.extra_env).clone());
        env.insert(
            ENV_ALLOWED_ORIGINS.into(),
            self.inner.allowed_origins.to_env_value(),
        );
        env.insert(ENV_LOG_DIR.into(), logs_dir.display().to_string());
        env.insert(ENV_PORT.into(), port.to_string());
        env.insert(ENV_HOST.into(), config.server.host.clone());
        env.insert(ENV_LOG_LEVEL.into(), config.logging.level.clone());

        LaunchRequest {
            current_dir: executable.parent().map(Path::to_path_buf),
            program: executable,
            args: Vec::new(),
            env,
            capture_output: true,
        }
    }

    /// Kill a process that never became ready and forget it.
    async fn abandon_launch(&self, pid: u32, executable_name: Option<&str>) {
        let owned = {
            let mut handle = lock(&self.inner.handle);
            if handle.as_ref().is_some_and(|h| h.pid == pid) {
                handle.take();
                true
            } else {
                false
            }
        };

        if owned {
            let outcome = self.coordinator().escalate(pid, executable_name).await;
            debug!("Abandoned PID {pid}: {outcome:?}");
        }
        if let Some(log) = lock(&self.inner.server_log).take() {
            close_log(&log);
        }
    }

    /// Shutdown sequence shared by `stop()` and the restart path.
    async fn stop_process(&self) -> Option<ShutdownOutcome> {
        if self
            .inner
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already in progress");
            return None;
        }
        let _stopping = StoppingGuard(&self.inner.stopping);
        let _stop = self.inner.stop_lock.lock().await;

        self.cancel_monitor();

        let target = {
            let mut handle = lock(&self.inner.handle);
            handle.as_mut().map(|h| {
                h.running = false;
                h.clone()
            })
        };

        let outcome = match target {
            Some(target) => {
                let executable_name = self.executable_name();
                let coordinator = self.coordinator();

                self.set_state(ServerState::ShuttingDownGraceful);
                let outcome = match coordinator.request_graceful(target.pid, target.port).await {
                    Some(outcome) => outcome,
                    None => {
                        self.set_state(ServerState::ShuttingDownForced);
                        coordinator
                            .escalate(target.pid, executable_name.as_deref())
                            .await
                    }
                };

                info!(
                    "Backend PID {} stopped ({outcome:?}) after {}s",
                    target.pid,
                    target.uptime().num_seconds()
                );
                self.set_state(ServerState::Terminated);

                let mut handle = lock(&self.inner.handle);
                if handle.as_ref().is_some_and(|h| h.pid == target.pid) {
                    handle.take();
                }
                Some(outcome)
            }
            None => None,
        };

        if let Some(log) = lock(&self.inner.server_log).take() {
            close_log(&log);
        }

        self.set_state(ServerState::Stopped);

        outcome
    }

    // === Liveness & restarts ===

    fn arm_monitor(&self, port: u16) {
        let resilience = &self.inner.config.resilience;
        let monitor = LivenessMonitor::new(
            self.inner.api.clone(),
            port,
            resilience.health_check_interval(),
            resilience.probe_timeout(),
            resilience.liveness_failure_threshold,
        );

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let restart_count = self.inner.restart_count.clone();
        let handle = monitor.for_generation(generation).arm(self.inner.command_tx.clone(), move || {
            restart_count.store(0, Ordering::SeqCst);
        });

        if let Some(previous) = lock(&self.inner.monitor).replace(handle) {
            previous.cancel();
        }
    }

    fn cancel_monitor(&self) {
        if let Some(monitor) = lock(&self.inner.monitor).take() {
            monitor.cancel();
        }
    }

    /// Spawn the task that turns monitor commands into restarts.
    ///
    /// Holds only a weak reference so dropping the last manager ends it.
    fn ensure_command_handler(&self) {
        let Some(mut command_rx) = lock(&self.inner.command_rx).take() else {
            return;
        };
        let inner = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let Some(manager) = upgrade(&inner) else {
                    break;
                };
                match command {
                    ServerCommand::Restart { reason, generation } => {
                        manager.restart(&reason, generation).await
                    }
                }
            }
            debug!("Command handler exited");
        });
    }

    /// Stop-then-start after the monitor declared the backend dead.
    async fn restart(&self, reason: &str, generation: u64) {
        if self.inner.shutdown_requested.load(Ordering::SeqCst) {
            debug!("Ignoring restart request ({reason}): shutdown requested");
            return;
        }
        if generation != self.inner.generation.load(Ordering::SeqCst) {
            debug!("Ignoring stale restart request ({reason})");
            return;
        }

        let attempt = self.inner.restart_count.fetch_add(1, Ordering::SeqCst) + 1;
        let max_restarts = self.inner.config.resilience.max_restarts;
        if max_restarts > 0 && attempt > max_restarts {
            error!("Backend died {attempt} times in a row, giving up");
            self.stop_process().await;
            self.set_state(ServerState::Failed {
                error: format!("Backend crashed {} times", attempt - 1),
            });
            return;
        }

        warn!("Backend unresponsive ({reason}), restarting (attempt {attempt})");
        self.set_state(ServerState::Restarting { attempt });

        self.stop_process().await;
        if self.inner.shutdown_requested.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(self.inner.config.resilience.restart_delay()).await;
        if self.inner.shutdown_requested.load(Ordering::SeqCst) {
            return;
        }

        match self.launch().await {
            Ok(()) => info!("Backend restarted (attempt {attempt})"),
            Err(SupervisorError::StartupCancelled { .. }) => {}
            Err(e) => {
                error!("Restart attempt {attempt} failed: {e}");
                self.schedule_retry(generation);
            }
        }
    }

    /// Queue another restart one liveness interval from now.
    ///
    /// Aborted by the next `start()`, `stop()` or `force_stop()`.
    fn schedule_retry(&self, generation: u64) {
        let command_tx = self.inner.command_tx.clone();
        let delay = self.inner.config.resilience.health_check_interval();

        let retry = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let command = ServerCommand::Restart {
                reason: "previous restart failed".into(),
                generation,
            };
            if command_tx.send(command).await.is_err() {
                debug!("Command handler gone, retry dropped");
            }
        });

        if let Some(previous) = lock(&self.inner.retry).replace(retry) {
            previous.abort();
        }
    }

    // === Accessors ===

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> ServerState {
        self.inner.state_tx.borrow().clone()
    }

    /// Snapshot of the managed process, if any.
    pub fn handle(&self) -> Option<ServerProcessHandle> {
        lock(&self.inner.handle).clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle().map(|h| h.pid)
    }

    /// Port of the running backend.
    pub fn port(&self) -> Option<u16> {
        self.handle().filter(|h| h.running).map(|h| h.port)
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_some_and(|h| h.running)
    }

    /// Base URL for API calls from the client.
    pub fn base_url(&self) -> Option<String> {
        self.port()
            .map(|p| format!("http://{}:{p}", self.inner.config.server.host))
    }

    pub fn restart_count(&self) -> u32 {
        self.inner.restart_count.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus::build(
            &self.state(),
            self.handle().as_ref(),
            &self.inner.config.server.host,
            self.restart_count(),
        )
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn install_dir(&self) -> &Path {
        &self.inner.install_dir
    }

    /// Origins passed to the backend; additions apply from the next launch.
    pub fn allowed_origins(&self) -> &AllowedOrigins {
        &self.inner.allowed_origins
    }

    pub fn add_allowed_origin(&self, origin: &str) -> bool {
        let added = self.inner.allowed_origins.insert(origin);
        if added {
            info!("Allowed origin added: {origin}");
        }
        added
    }

    /// Extra environment variable for subsequent launches.
    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.inner.extra_env).insert(key.into(), value.into());
    }

    pub fn server_log_path(&self) -> PathBuf {
        let config = &self.inner.config;
        config
            .logs_dir(&self.inner.install_dir)
            .join(&config.logging.server_file)
    }

    // === Helpers ===

    fn coordinator(&self) -> ShutdownCoordinator {
        coordinator_for(&self.inner)
    }

    fn executable_name(&self) -> Option<String> {
        executable_name_for(&self.inner)
    }

    fn set_state(&self, state: ServerState) {
        debug!("Server state -> {state:?}");
        self.inner.state_tx.send_replace(state);
    }

    /// Record a startup failure and hand the error back.
    fn fail(&self, error: SupervisorError) -> SupervisorError {
        if !matches!(error, SupervisorError::StartupCancelled { .. }) {
            self.set_state(ServerState::Failed {
                error: error.to_string(),
            });
        }
        error
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if lock(&self.handle).is_some() {
            warn!("Server manager dropped with a live backend, force stopping");
            force_stop_inner(self);
        }
    }
}

fn force_stop_inner(inner: &Inner) -> Option<ShutdownOutcome> {
    inner.shutdown_requested.store(true, Ordering::SeqCst);
    supersede_restarts(inner);
    inner.launch_cancel.notify_waiters();

    if let Some(monitor) = lock(&inner.monitor).take() {
        monitor.cancel();
    }

    let target = lock(&inner.handle).take();
    let outcome = target.map(|target| {
        inner
            .state_tx
            .send_replace(ServerState::ShuttingDownForced);
        let outcome =
            coordinator_for(inner).force_now(target.pid, executable_name_for(inner).as_deref());
        info!("Backend PID {} force stopped ({outcome:?})", target.pid);
        inner.state_tx.send_replace(ServerState::Terminated);
        outcome
    });

    if let Some(log) = lock(&inner.server_log).take() {
        close_log(&log);
    }
    inner.state_tx.send_replace(ServerState::Stopped);

    outcome
}

/// Invalidate queued restart requests and abort a pending retry.
fn supersede_restarts(inner: &Inner) {
    inner.generation.fetch_add(1, Ordering::SeqCst);
    if let Some(retry) = lock(&inner.retry).take() {
        retry.abort();
    }
}

/// Clears the `stopping` flag however the shutdown sequence ends.
struct StoppingGuard<'a>(&'a AtomicBool);

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn coordinator_for(inner: &Inner) -> ShutdownCoordinator {
    ShutdownCoordinator::new(
        inner.api.clone(),
        inner.controller.clone(),
        &inner.config.resilience,
    )
}

fn executable_name_for(inner: &Inner) -> Option<String> {
    inner
        .config
        .executable_path(&inner.install_dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn upgrade(inner: &Weak<Inner>) -> Option<ServerManager> {
    inner.upgrade().map(|inner| ServerManager { inner })
}

fn close_log(log: &LogFile) {
    if let Err(e) = log.close() {
        warn!("Failed to close {}: {e}", log.path().display());
    }
}

#[track_caller]
fn startup_cancelled() -> SupervisorError {
    SupervisorError::StartupCancelled {
        location: ErrorLocation::from(Location::caller()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
