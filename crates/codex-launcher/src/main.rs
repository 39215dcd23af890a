//! codex-launcher - runs the bundled Codex backend for the desktop client
//!
//! Loads `config.toml`, starts the backend through [`ServerManager`], and
//! shuts it down when the process receives SIGINT/SIGTERM (Ctrl-C on
//! Windows). A second signal during shutdown kills the backend outright.
//!
//! ```bash
//! codex-launcher --install-dir /opt/codex --allow-origin http://localhost:5173
//! ```

mod cli;
mod signals;


use crate::cli::Cli;
use crate::signals::shutdown_signals;

use codex_supervisor::{ServerManager, ServerStatus, SupervisorConfig, logging::setup_logging};

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let install_dir = cli.resolve_install_dir();
    let config_dir = cli.config_dir.clone().unwrap_or_else(|| install_dir.clone());

    let config = match SupervisorConfig::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            eprintln!("{}", e.recovery_hint());
            return ExitCode::FAILURE;
        }
    };

    let logs_dir = config.logs_dir(&install_dir);
    match setup_logging(&logs_dir, &config.logging.client_file, &config.logging.level) {
        Ok(path) => info!("Logging to {}", path.display()),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    }
    config.log_summary();

    let manager = match ServerManager::native(config, install_dir) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to create server manager: {e}");
            return ExitCode::FAILURE;
        }
    };
    for origin in &cli.allowed_origins {
        manager.add_allowed_origin(origin);
    }

    let mut signals = shutdown_signals();

    // A signal during startup aborts the launch
    let started = tokio::select! {
        result = manager.start() => result,
        Some(source) = signals.recv() => {
            info!("Shutdown requested by {source} during startup");
            if let Err(e) = manager.stop().await {
                error!("Failed to stop server: {e}");
                return ExitCode::FAILURE;
            }
            return ExitCode::SUCCESS;
        }
    };

    if let Err(e) = started {
        let status = ServerStatus::from_error(&e);
        error!("Backend failed to start: {e}");
        if let Some(hint) = status.recovery_hint {
            error!("{hint}");
        }
        return ExitCode::FAILURE;
    }

    if let Some(url) = manager.base_url() {
        info!("Backend available at {url}");
    }

    match signals.recv().await {
        Some(source) => info!("Shutdown requested by {source}"),
        None => {
            warn!("Signal handler unavailable, waiting for Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    tokio::select! {
        result = manager.stop() => {
            if let Err(e) = result {
                error!("Failed to stop server: {e}");
                return ExitCode::FAILURE;
            }
            info!("Backend stopped");
        }
        Some(source) = signals.recv() => {
            warn!("Second shutdown request ({source}), force stopping backend");
            if let Some(outcome) = manager.force_stop() {
                info!("Backend force stopped: {outcome:?}");
            }
        }
    }

    ExitCode::SUCCESS
}
